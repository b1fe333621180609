//! ═══════════════════════════════════════════════════════════════════════════════
//! STATS — Statistical Validation of Monte Carlo Collapse Proportions
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The raw collapse rate from a few hundred trials is noisy. Stability is
//! decided on the Wilson score upper bound (UB95): a system is statistically
//! stable only when BOTH the empirical rate and UB95 sit below the stable
//! threshold.
//!
//! Thresholds live here and nowhere else.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

/// z for a one-sided 95% bound (two-sided 1.96 convention)
pub const Z_95: f64 = 1.96;
/// Collapse rate below which a system counts as stable
pub const STABLE_THRESHOLD: f64 = 0.05;
/// Collapse rate below which a system counts as marginal
pub const MARGINAL_THRESHOLD: f64 = 0.15;

// ═══════════════════════════════════════════════════════════════════════════════
// WILSON BOUND
// ═══════════════════════════════════════════════════════════════════════════════

/// Wilson score interval upper bound on a collapse proportion
///
/// (p̂ + z²/2n + z·√(p̂(1−p̂)/n + z²/4n²)) / (1 + z²/n), clamped to 1.
/// With no trials nothing is known, so the bound is 1.
pub fn wilson_upper_bound(collapses: u32, runs: u32, z: f64) -> f64 {
    if runs == 0 {
        return 1.0;
    }
    let n = runs as f64;
    let p = (collapses as f64 / n).clamp(0.0, 1.0);
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let radius = z * ((p * (1.0 - p) / n + z2 / (4.0 * n * n)).max(0.0)).sqrt();
    ((center + radius) / denom).min(1.0)
}

/// Shannon entropy of a Bernoulli(p) outcome, in bits
pub fn bernoulli_entropy(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    if p == 0.0 || p == 1.0 {
        return 0.0;
    }
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY CRITERIA
// ═══════════════════════════════════════════════════════════════════════════════

/// Coarse reporting band of a collapse rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StabilityBand {
    Stable,
    Marginal,
    Collapse,
}

impl std::fmt::Display for StabilityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StabilityBand::Stable => write!(f, "STABLE"),
            StabilityBand::Marginal => write!(f, "MARGINAL"),
            StabilityBand::Collapse => write!(f, "COLLAPSE"),
        }
    }
}

/// Centralised stable/marginal thresholds and confidence level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityCriteria {
    pub stable_threshold: f64,
    pub marginal_threshold: f64,
    pub z: f64,
}

impl Default for StabilityCriteria {
    fn default() -> Self {
        Self {
            stable_threshold: STABLE_THRESHOLD,
            marginal_threshold: MARGINAL_THRESHOLD,
            z: Z_95,
        }
    }
}

impl StabilityCriteria {
    pub fn upper_bound(&self, collapses: u32, runs: u32) -> f64 {
        wilson_upper_bound(collapses, runs, self.z)
    }

    /// Rate AND its upper bound below the stable threshold
    pub fn is_statistically_stable(&self, collapse_rate: f64, upper_ci95: f64) -> bool {
        collapse_rate < self.stable_threshold && upper_ci95 < self.stable_threshold
    }

    pub fn band(&self, collapse_rate: f64) -> StabilityBand {
        if collapse_rate < self.stable_threshold {
            StabilityBand::Stable
        } else if collapse_rate < self.marginal_threshold {
            StabilityBand::Marginal
        } else {
            StabilityBand::Collapse
        }
    }

    /// Rate in [stable, marginal): worth a larger-sample replica
    pub fn is_marginal(&self, collapse_rate: f64) -> bool {
        self.band(collapse_rate) == StabilityBand::Marginal
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wilson_no_runs() {
        assert_eq!(wilson_upper_bound(0, 0, Z_95), 1.0);
    }

    #[test]
    fn test_wilson_zero_collapses() {
        // z²/(n + z²) for p̂ = 0
        let ub = wilson_upper_bound(0, 500, Z_95);
        let expected = (Z_95 * Z_95) / (500.0 + Z_95 * Z_95);
        assert!((ub - expected).abs() < 1e-12);
        assert!(ub < STABLE_THRESHOLD);
    }

    #[test]
    fn test_wilson_all_collapses() {
        assert!((wilson_upper_bound(500, 500, Z_95) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wilson_known_value() {
        // 10/100: upper ≈ 0.1744
        let ub = wilson_upper_bound(10, 100, Z_95);
        assert!((ub - 0.1744).abs() < 1e-3, "ub was {}", ub);
    }

    #[test]
    fn test_small_sample_is_not_stable() {
        let criteria = StabilityCriteria::default();
        // 0/20 looks perfect but UB95 ≈ 0.16
        let ub = criteria.upper_bound(0, 20);
        assert!(!criteria.is_statistically_stable(0.0, ub));
        // 0/500 is convincing
        let ub = criteria.upper_bound(0, 500);
        assert!(criteria.is_statistically_stable(0.0, ub));
    }

    #[test]
    fn test_bands() {
        let criteria = StabilityCriteria::default();
        assert_eq!(criteria.band(0.0), StabilityBand::Stable);
        assert_eq!(criteria.band(0.049), StabilityBand::Stable);
        assert_eq!(criteria.band(0.05), StabilityBand::Marginal);
        assert_eq!(criteria.band(0.149), StabilityBand::Marginal);
        assert_eq!(criteria.band(0.15), StabilityBand::Collapse);
        assert!(criteria.is_marginal(0.1));
        assert!(!criteria.is_marginal(0.5));
    }

    #[test]
    fn test_bernoulli_entropy() {
        assert_eq!(bernoulli_entropy(0.0), 0.0);
        assert_eq!(bernoulli_entropy(1.0), 0.0);
        assert!((bernoulli_entropy(0.5) - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_wilson_dominates_rate(runs in 1u32..5000, frac in 0.0f64..=1.0) {
            let collapses = ((runs as f64) * frac).floor() as u32;
            let ub = wilson_upper_bound(collapses, runs, Z_95);
            prop_assert!(ub >= collapses as f64 / runs as f64 - 1e-12);
            prop_assert!(ub <= 1.0);
        }
    }
}
