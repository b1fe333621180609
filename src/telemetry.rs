//! ═══════════════════════════════════════════════════════════════════════════════
//! TELEMETRY — Running Statistics Handed to the Decision Oracle
//! ═══════════════════════════════════════════════════════════════════════════════
//! The oracle never sees the raw log. It gets a pruned signal: collapse-rate
//! statistics, tested-K range, trend and stability count. A compacted log
//! yields the same signal from its summary.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

use crate::experiment::ExperimentLog;
use crate::stats::StabilityBand;

/// Dead band for the overall trend
pub const TREND_DEAD_BAND: f64 = 0.01;

/// Direction of the collapse rate over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Not enough data
    Unknown,
    /// Collapse rate going down
    Improving,
    /// Collapse rate going up
    Worsening,
    Steady,
}

impl Trend {
    /// First-half mean vs second-half mean, ±0.01 dead band
    pub fn overall(rates: &[f64]) -> Trend {
        if rates.len() < 2 {
            return Trend::Unknown;
        }
        let (first, second) = rates.split_at(rates.len() / 2);
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        Trend::between(mean(first), mean(second))
    }

    /// Older level vs newer level, ±0.01 dead band
    pub fn between(older: f64, newer: f64) -> Trend {
        let delta = older - newer;
        if delta > TREND_DEAD_BAND {
            Trend::Improving
        } else if delta < -TREND_DEAD_BAND {
            Trend::Worsening
        } else {
            Trend::Steady
        }
    }

    /// Last step only, no dead band
    pub fn short(previous: Option<f64>, last: f64) -> Trend {
        match previous {
            None => Trend::Unknown,
            Some(p) if last < p => Trend::Improving,
            Some(p) if last > p => Trend::Worsening,
            Some(_) => Trend::Steady,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Unknown => "unknown",
            Trend::Improving => "improving",
            Trend::Worsening => "worsening",
            Trend::Steady => "steady",
        };
        f.write_str(s)
    }
}

/// Pruned view of the experiment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSignal {
    pub experiments: u32,
    /// Derived from a compaction summary rather than live records
    pub compressed: bool,
    pub min_collapse_rate: f64,
    pub max_collapse_rate: f64,
    pub mean_collapse_rate: f64,
    pub last_collapse_rate: Option<f64>,
    pub last_k: Option<f64>,
    pub k_range: Option<(f64, f64)>,
    pub theta_range: Option<(f64, f64)>,
    pub last_theta: Option<f64>,
    pub entropy_debt: f64,
    pub system_uncertainty: f64,
    pub last_band: Option<StabilityBand>,
    pub last_stable: Option<bool>,
    pub short_trend: Trend,
    pub overall_trend: Trend,
    pub stable_count: u32,
    pub stability_ratio: f64,
}

impl OracleSignal {
    /// Signal for an empty history
    pub fn empty() -> Self {
        Self {
            experiments: 0,
            compressed: false,
            min_collapse_rate: 0.0,
            max_collapse_rate: 0.0,
            mean_collapse_rate: 0.0,
            last_collapse_rate: None,
            last_k: None,
            k_range: None,
            theta_range: None,
            last_theta: None,
            entropy_debt: 0.0,
            system_uncertainty: 0.0,
            last_band: None,
            last_stable: None,
            short_trend: Trend::Unknown,
            overall_trend: Trend::Unknown,
            stable_count: 0,
            stability_ratio: 0.0,
        }
    }

    pub fn from_log(log: &ExperimentLog) -> Self {
        let Some(s) = log.overall_summary() else {
            return Self::empty();
        };

        Self {
            experiments: s.experiments,
            compressed: log.is_compressed(),
            min_collapse_rate: s.min_collapse_rate,
            max_collapse_rate: s.max_collapse_rate,
            mean_collapse_rate: s.mean_collapse_rate,
            last_collapse_rate: Some(s.last_collapse_rate),
            last_k: Some(s.last_k),
            k_range: Some((s.k_min, s.k_max)),
            theta_range: Some((s.theta_min, s.theta_max)),
            last_theta: Some(s.last_theta),
            entropy_debt: s.entropy_debt,
            system_uncertainty: s.system_uncertainty,
            last_band: Some(s.last_band),
            last_stable: Some(s.last_stable),
            short_trend: Trend::short(s.previous_collapse_rate, s.last_collapse_rate),
            overall_trend: s.overall_trend,
            stable_count: s.stable_count,
            stability_ratio: if s.experiments > 0 {
                s.stable_count as f64 / s.experiments as f64
            } else {
                0.0
            },
        }
    }
}
