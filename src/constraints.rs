//! ═══════════════════════════════════════════════════════════════════════════════
//! CONSTRAINTS — Hard Physical Invariants Before Any Stochastic Step
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Rules, in order:
//!   1. I never drops below its volatility tier floor
//!   2. K is capped at 3.0 bits for High rigidity
//!   3. liquidity < 0.5 is annotated as a penalty (K untouched)
//!   4. I > 2K → critical warning, I > 1.5K → marginal (warn, never reject)
//!   5. I, K ∈ [0.1, 10], liquidity ∈ [0, 1]
//!
//! Critical systems pass through so the orchestrator can diagnose them.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

use crate::error::{IsoError, IsoResult};
use crate::grounding::{PhysicalState, Rigidity, Volatility};

/// Lower clamp for I and K
pub const MIN_BITS: f64 = 0.1;
/// Upper clamp for I and K
pub const MAX_BITS: f64 = 10.0;
/// Capacity ceiling for manual/bureaucratic organisations
pub const HIGH_RIGIDITY_K_CAP: f64 = 3.0;
/// Liquidity below which a penalty is annotated
pub const LOW_LIQUIDITY: f64 = 0.5;
/// I/K ratio that flags a marginal situation
pub const MARGINAL_RATIO: f64 = 1.5;
/// I/K ratio that flags a critical structure
pub const CRITICAL_RATIO: f64 = 2.0;

/// Annotations raised by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFlag {
    LowLiquidityPenalty,
    CriticalStructuralWarning,
    MarginalSituation,
}

impl ConstraintFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintFlag::LowLiquidityPenalty => "low_liquidity_penalty",
            ConstraintFlag::CriticalStructuralWarning => "critical_structural_warning",
            ConstraintFlag::MarginalSituation => "marginal_situation",
        }
    }
}

impl std::fmt::Display for ConstraintFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gated state plus what the gate did to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub state: PhysicalState,
    /// Human-readable adjustments and warnings, for reporting only
    pub adjustments: Vec<String>,
    pub flags: Vec<ConstraintFlag>,
}

impl ConstraintReport {
    pub fn has_flag(&self, flag: ConstraintFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_critical(&self) -> bool {
        self.has_flag(ConstraintFlag::CriticalStructuralWarning)
    }
}

/// Apply the hard rules to a grounded state
pub fn apply_hard_rules(
    volatility: Volatility,
    rigidity: Rigidity,
    state: PhysicalState,
) -> IsoResult<ConstraintReport> {
    for (field, value) in [
        ("entropy", state.entropy),
        ("capacity", state.capacity),
        ("liquidity", state.liquidity),
        ("stock", state.stock),
        ("capital", state.capital),
    ] {
        if !value.is_finite() {
            return Err(IsoError::invalid_input(field, format!("must be finite, got {}", value)));
        }
    }

    let mut state = state;
    let mut adjustments = Vec::new();
    let mut flags = Vec::new();

    let floor = volatility.entropy_floor();
    if state.entropy < floor {
        adjustments.push(format!(
            "I raised from {:.2} to the {} tier floor {:.2}",
            state.entropy,
            volatility.label(),
            floor
        ));
        state.entropy = floor;
    }

    if rigidity == Rigidity::High && state.capacity > HIGH_RIGIDITY_K_CAP {
        adjustments.push(format!(
            "K capped from {:.2} to {:.2} (high rigidity)",
            state.capacity, HIGH_RIGIDITY_K_CAP
        ));
        state.capacity = HIGH_RIGIDITY_K_CAP;
    }

    if state.liquidity < LOW_LIQUIDITY {
        flags.push(ConstraintFlag::LowLiquidityPenalty);
        adjustments.push(format!(
            "Low liquidity penalty: {:.2} < {:.2}",
            state.liquidity, LOW_LIQUIDITY
        ));
    }

    if state.entropy > CRITICAL_RATIO * state.capacity {
        flags.push(ConstraintFlag::CriticalStructuralWarning);
        adjustments.push(format!(
            "Critical structural warning: I={:.2} > {:.1}·K={:.2}",
            state.entropy,
            CRITICAL_RATIO,
            CRITICAL_RATIO * state.capacity
        ));
    } else if state.entropy > MARGINAL_RATIO * state.capacity {
        flags.push(ConstraintFlag::MarginalSituation);
        adjustments.push(format!(
            "Marginal situation: I={:.2} > {:.1}·K={:.2}",
            state.entropy,
            MARGINAL_RATIO,
            MARGINAL_RATIO * state.capacity
        ));
    }

    state.entropy = state.entropy.clamp(MIN_BITS, MAX_BITS);
    state.capacity = if state.capacity == 0.0 {
        MIN_BITS
    } else {
        state.capacity.clamp(MIN_BITS, MAX_BITS)
    };
    state.liquidity = state.liquidity.clamp(0.0, 1.0);
    state.refresh_threshold();

    Ok(ConstraintReport {
        state,
        adjustments,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::ground_inputs;

    #[test]
    fn test_chaotic_bureaucratic_is_flagged_not_rejected() {
        let grounded = ground_inputs(Volatility::High, Rigidity::High, 3);
        let report = apply_hard_rules(Volatility::High, Rigidity::High, grounded).unwrap();

        assert!(report.is_critical());
        assert!(report.has_flag(ConstraintFlag::LowLiquidityPenalty));
        assert_eq!(report.state.entropy, 5.0);
        assert!((report.state.capacity - 0.8).abs() < 1e-12);
        assert_eq!(report.state.stock, 0.125);
    }

    #[test]
    fn test_marginal_situation() {
        let mut s = ground_inputs(Volatility::Medium, Rigidity::Medium, 12);
        s.capacity = 0.9; // 1.5 / 0.9 ≈ 1.67
        let report = apply_hard_rules(Volatility::Medium, Rigidity::Medium, s).unwrap();
        assert!(report.has_flag(ConstraintFlag::MarginalSituation));
        assert!(!report.is_critical());
    }

    #[test]
    fn test_tier_floor() {
        let mut s = ground_inputs(Volatility::High, Rigidity::Low, 12);
        s.entropy = 1.0;
        let report = apply_hard_rules(Volatility::High, Rigidity::Low, s).unwrap();
        assert_eq!(report.state.entropy, 4.5);
        assert!(!report.adjustments.is_empty());
    }

    #[test]
    fn test_high_rigidity_cap() {
        let mut s = ground_inputs(Volatility::Low, Rigidity::High, 12);
        s.capacity = 5.0;
        let report = apply_hard_rules(Volatility::Low, Rigidity::High, s).unwrap();
        assert_eq!(report.state.capacity, HIGH_RIGIDITY_K_CAP);

        // the cap belongs to rigidity, not to K
        let mut s = ground_inputs(Volatility::Low, Rigidity::Low, 12);
        s.capacity = 5.0;
        let report = apply_hard_rules(Volatility::Low, Rigidity::Low, s).unwrap();
        assert_eq!(report.state.capacity, 5.0);
    }

    #[test]
    fn test_healthy_system_is_untouched() {
        let s = ground_inputs(Volatility::Low, Rigidity::Low, 12);
        let report = apply_hard_rules(Volatility::Low, Rigidity::Low, s).unwrap();
        assert!(report.flags.is_empty());
        assert!(report.adjustments.is_empty());
        assert_eq!(report.state, s);
    }

    #[test]
    fn test_final_clamps() {
        let mut s = ground_inputs(Volatility::Low, Rigidity::Low, 12);
        s.capacity = 0.0;
        s.liquidity = 1.7;
        let report = apply_hard_rules(Volatility::Low, Rigidity::Low, s).unwrap();
        assert_eq!(report.state.capacity, MIN_BITS);
        assert_eq!(report.state.liquidity, 1.0);

        let mut s = ground_inputs(Volatility::High, Rigidity::Low, 12);
        s.entropy = 40.0;
        let report = apply_hard_rules(Volatility::High, Rigidity::Low, s).unwrap();
        assert_eq!(report.state.entropy, MAX_BITS);
    }

    #[test]
    fn test_threshold_follows_clamped_liquidity() {
        let mut s = ground_inputs(Volatility::Low, Rigidity::Low, 24);
        s.liquidity = 3.0;
        let report = apply_hard_rules(Volatility::Low, Rigidity::Low, s).unwrap();
        assert!((report.state.theta_max - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_nan() {
        let mut s = ground_inputs(Volatility::Low, Rigidity::Low, 12);
        s.capacity = f64::NAN;
        assert!(matches!(
            apply_hard_rules(Volatility::Low, Rigidity::Low, s),
            Err(IsoError::InvalidInput { .. })
        ));
    }
}
