//! ═══════════════════════════════════════════════════════════════════════════════
//! GROUNDING — Categorical Inputs → Physical Parameters
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Three human answers become five canonical scalars:
//!
//! | input          | drives                         |
//! |----------------|--------------------------------|
//! | volatility     | external entropy I             |
//! | rigidity       | initial capacity K0, liquidity |
//! | buffer months  | stock = clamp(months/24)       |
//!
//! Capital is fixed at 1.0. The mapping is a pure lookup: identical inputs
//! always produce a bit-identical `PhysicalState`.
//!
//! Unknown labels are rejected at parse time (`UnrecognizedCategory`). Once a
//! label has become a `Volatility`/`Rigidity` there is nothing left to fail.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IsoError;
use crate::physics::threshold_for;

/// Months of runway that map to a full stock ratio of 1.0
pub const FULL_BUFFER_MONTHS: f64 = 24.0;
/// Lowest stock ratio a system can be grounded with
pub const MIN_STOCK: f64 = 0.05;
/// Capital ratio assumed for every audited system
pub const DEFAULT_CAPITAL: f64 = 1.0;

// ═══════════════════════════════════════════════════════════════════════════════
// CATEGORIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Environmental volatility tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Volatility {
    /// Stable market
    Low,
    /// Seasonal swings
    Medium,
    /// Chaotic environment
    High,
}

impl Volatility {
    pub const ALL: [Volatility; 3] = [Volatility::Low, Volatility::Medium, Volatility::High];

    /// External entropy I in bits
    pub fn entropy(self) -> f64 {
        match self {
            Volatility::Low => 0.6,
            Volatility::Medium => 1.5,
            Volatility::High => 5.0,
        }
    }

    /// Physical minimum for I in this tier
    pub fn entropy_floor(self) -> f64 {
        match self {
            Volatility::Low => 0.5,
            Volatility::Medium => 1.0,
            Volatility::High => 4.5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Volatility::Low => "Low (Stable)",
            Volatility::Medium => "Medium (Seasonal)",
            Volatility::High => "High (Chaotic)",
        }
    }
}

impl fmt::Display for Volatility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Volatility {
    type Err = IsoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match leading_token(s).as_str() {
            "low" | "baja" | "stable" | "estable" => Ok(Volatility::Low),
            "medium" | "media" | "seasonal" | "estacional" => Ok(Volatility::Medium),
            "high" | "alta" | "chaotic" | "caótica" | "caotica" => Ok(Volatility::High),
            _ => Err(IsoError::UnrecognizedCategory {
                kind: "volatility",
                value: s.to_string(),
            }),
        }
    }
}

/// Operational rigidity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rigidity {
    /// Automated operations
    Low,
    /// Standard processes
    Medium,
    /// Manual / bureaucratic
    High,
}

impl Rigidity {
    pub const ALL: [Rigidity; 3] = [Rigidity::Low, Rigidity::Medium, Rigidity::High];

    /// Initial response capacity K0 in bits
    pub fn capacity(self) -> f64 {
        match self {
            Rigidity::Low => 3.0,
            Rigidity::Medium => 1.5,
            Rigidity::High => 0.8,
        }
    }

    /// Operational liquidity; rigid organisations move money slowly
    pub fn liquidity(self) -> f64 {
        match self {
            Rigidity::Low => 0.9,
            Rigidity::Medium => 0.6,
            Rigidity::High => 0.3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rigidity::Low => "Low (Automated)",
            Rigidity::Medium => "Medium (Standard)",
            Rigidity::High => "High (Manual/Bureaucratic)",
        }
    }
}

impl fmt::Display for Rigidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Rigidity {
    type Err = IsoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match leading_token(s).as_str() {
            "low" | "baja" | "automated" | "automatizada" => Ok(Rigidity::Low),
            "medium" | "media" | "standard" | "estándar" | "estandar" => Ok(Rigidity::Medium),
            "high" | "alta" | "manual" | "bureaucratic" | "burocrática" | "burocratica" => {
                Ok(Rigidity::High)
            }
            _ => Err(IsoError::UnrecognizedCategory {
                kind: "rigidity",
                value: s.to_string(),
            }),
        }
    }
}

/// First alphabetic word of a label, lowercased ("High (Chaotic)" → "high")
fn leading_token(s: &str) -> String {
    s.trim()
        .split(|c: char| !c.is_alphabetic())
        .find(|t| !t.is_empty())
        .unwrap_or("")
        .to_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PHYSICAL STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonical physical description of one audited system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    /// External entropy I (bits)
    pub entropy: f64,
    /// Initial response capacity K0 (bits)
    pub capacity: f64,
    /// Buffer stock ratio in [0.05, 1.0]
    pub stock: f64,
    /// Liquidity in [0, 1]
    pub liquidity: f64,
    /// Capital ratio
    pub capital: f64,
    /// Collapse threshold θmax (bits)
    pub theta_max: f64,
}

impl PhysicalState {
    /// Instantaneous insolvency ratio I/K0
    pub fn insolvency_ratio(&self) -> f64 {
        if self.capacity > 0.0 {
            self.entropy / self.capacity
        } else {
            f64::INFINITY
        }
    }

    /// Recompute θmax after stock/capital/liquidity changed
    pub(crate) fn refresh_threshold(&mut self) {
        self.theta_max = threshold_for(self.stock, self.capital, self.liquidity);
    }
}

/// Normalise buffer months to the stock ratio
pub fn stock_from_months(buffer_months: u32) -> f64 {
    (buffer_months as f64 / FULL_BUFFER_MONTHS).clamp(MIN_STOCK, 1.0)
}

/// Deterministic physical grounding
pub fn ground_inputs(volatility: Volatility, rigidity: Rigidity, buffer_months: u32) -> PhysicalState {
    let mut state = PhysicalState {
        entropy: volatility.entropy(),
        capacity: rigidity.capacity(),
        stock: stock_from_months(buffer_months),
        liquidity: rigidity.liquidity(),
        capital: DEFAULT_CAPITAL,
        theta_max: 0.0,
    };
    state.refresh_threshold();
    state
}

/// Ground directly from UI labels; unknown labels are rejected
pub fn ground_labels(volatility: &str, rigidity: &str, buffer_months: u32) -> Result<PhysicalState, IsoError> {
    Ok(ground_inputs(volatility.parse()?, rigidity.parse()?, buffer_months))
}
