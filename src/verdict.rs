//! ═══════════════════════════════════════════════════════════════════════════════
//! VERDICT — Structural Classification After the Audit Loop
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! ROBUST   stable K_min found, phase past ORIENT, enough confirmed replicas,
//!          K_min structurally accessible from K0, margin K_min − I large enough
//! FRAGILE  evidence bar met (≥1 initial + all forced probes), nothing ever
//!          stable
//! MARGINAL everything else
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::phase::AuditPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Robust,
    Marginal,
    Fragile,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Robust => write!(f, "ROBUST"),
            Verdict::Marginal => write!(f, "MARGINAL"),
            Verdict::Fragile => write!(f, "FRAGILE"),
        }
    }
}

/// Thresholds the verdict is judged against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerdictPolicy {
    pub required_replicas: u32,
    pub required_forced: u32,
    pub max_factor: f64,
    pub max_delta: f64,
    pub min_margin: f64,
}

impl From<&AuditConfig> for VerdictPolicy {
    fn from(config: &AuditConfig) -> Self {
        Self {
            required_replicas: config.required_replicas,
            required_forced: config.forced_attempts,
            max_factor: config.max_forced_factor,
            max_delta: config.max_forced_delta,
            min_margin: config.min_margin,
        }
    }
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self::from(&AuditConfig::default())
    }
}

/// Evidence gathered by one audit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditEvidence {
    pub entropy: f64,
    pub k_initial: f64,
    /// Smallest statistically-stable accepted K
    pub k_min_viable: Option<f64>,
    pub phase: AuditPhase,
    pub replicas_confirmed: u32,
    pub initial_attempts: u32,
    pub forced_attempts: u32,
    /// Statistically-stable experiments of any kind
    pub stable_observed: u32,
}

/// Verdict plus the reasons that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

/// K reachable from K0 within the multiplicative or the absolute budget
pub fn is_structurally_accessible(k_min: f64, k_initial: f64, max_factor: f64, max_delta: f64) -> bool {
    k_min <= k_initial * max_factor || k_min - k_initial <= max_delta
}

pub fn assess(evidence: &AuditEvidence, policy: &VerdictPolicy) -> Assessment {
    let mut reasons = Vec::new();

    if let Some(k_min) = evidence.k_min_viable {
        let margin = k_min - evidence.entropy;
        let accessible =
            is_structurally_accessible(k_min, evidence.k_initial, policy.max_factor, policy.max_delta);

        if evidence.phase == AuditPhase::Orient {
            reasons.push("audit never left ORIENT".to_string());
        }
        if evidence.replicas_confirmed < policy.required_replicas {
            reasons.push(format!(
                "{} of {} replicas confirmed",
                evidence.replicas_confirmed, policy.required_replicas
            ));
        }
        if !accessible {
            reasons.push(format!(
                "K_min {:.2} is not reachable from K0 {:.2} (×{:.1} or +{:.2})",
                k_min, evidence.k_initial, policy.max_factor, policy.max_delta
            ));
        }
        if margin <= policy.min_margin {
            reasons.push(format!(
                "margin {:.2} does not exceed {:.2}",
                margin, policy.min_margin
            ));
        }

        if reasons.is_empty() {
            reasons.push(format!("stable at K={:.2} with margin {:.2}", k_min, margin));
            return Assessment {
                verdict: Verdict::Robust,
                reasons,
            };
        }
        return Assessment {
            verdict: Verdict::Marginal,
            reasons,
        };
    }

    let evidence_met =
        evidence.initial_attempts >= 1 && evidence.forced_attempts >= policy.required_forced;
    if evidence_met && evidence.stable_observed == 0 {
        reasons.push(format!(
            "{} initial and {} forced attempts, none statistically stable",
            evidence.initial_attempts, evidence.forced_attempts
        ));
        return Assessment {
            verdict: Verdict::Fragile,
            reasons,
        };
    }

    reasons.push(if evidence.stable_observed > 0 {
        "stable observations were never confirmed as viable".to_string()
    } else {
        "insufficient evidence".to_string()
    });
    Assessment {
        verdict: Verdict::Marginal,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robust_evidence() -> AuditEvidence {
        AuditEvidence {
            entropy: 0.6,
            k_initial: 3.0,
            k_min_viable: Some(2.75),
            phase: AuditPhase::Conclude,
            replicas_confirmed: 2,
            initial_attempts: 3,
            forced_attempts: 0,
            stable_observed: 5,
        }
    }

    #[test]
    fn test_accessibility() {
        assert!(is_structurally_accessible(1.2, 0.8, 1.5, 0.5));
        assert!(is_structurally_accessible(1.3, 0.8, 1.5, 0.5));
        assert!(!is_structurally_accessible(1.4, 0.8, 1.5, 0.5));
        // large K0: the factor dominates
        assert!(is_structurally_accessible(4.4, 3.0, 1.5, 0.5));
    }

    #[test]
    fn test_robust() {
        let a = assess(&robust_evidence(), &VerdictPolicy::default());
        assert_eq!(a.verdict, Verdict::Robust);
    }

    #[test]
    fn test_each_robust_condition_is_required() {
        let policy = VerdictPolicy::default();

        let mut e = robust_evidence();
        e.phase = AuditPhase::Orient;
        assert_eq!(assess(&e, &policy).verdict, Verdict::Marginal);

        let mut e = robust_evidence();
        e.replicas_confirmed = 1;
        assert_eq!(assess(&e, &policy).verdict, Verdict::Marginal);

        let mut e = robust_evidence();
        e.k_initial = 0.8;
        e.k_min_viable = Some(2.0);
        assert_eq!(assess(&e, &policy).verdict, Verdict::Marginal);

        let mut e = robust_evidence();
        e.entropy = 2.6;
        let a = assess(&e, &policy);
        assert_eq!(a.verdict, Verdict::Marginal);
        assert!(a.reasons.iter().any(|r| r.contains("margin")));
    }

    #[test]
    fn test_fragile() {
        let e = AuditEvidence {
            entropy: 5.0,
            k_initial: 0.8,
            k_min_viable: None,
            phase: AuditPhase::Conclude,
            replicas_confirmed: 0,
            initial_attempts: 1,
            forced_attempts: 2,
            stable_observed: 0,
        };
        assert_eq!(assess(&e, &VerdictPolicy::default()).verdict, Verdict::Fragile);
    }

    #[test]
    fn test_insufficient_evidence_is_marginal() {
        let e = AuditEvidence {
            entropy: 1.5,
            k_initial: 1.5,
            k_min_viable: None,
            phase: AuditPhase::Orient,
            replicas_confirmed: 0,
            initial_attempts: 1,
            forced_attempts: 0,
            stable_observed: 0,
        };
        assert_eq!(assess(&e, &VerdictPolicy::default()).verdict, Verdict::Marginal);

        let e = AuditEvidence {
            initial_attempts: 0,
            ..e
        };
        assert_eq!(assess(&e, &VerdictPolicy::default()).verdict, Verdict::Marginal);
    }

    #[test]
    fn test_rejected_stability_is_not_fragile() {
        let e = AuditEvidence {
            entropy: 1.5,
            k_initial: 1.5,
            k_min_viable: None,
            phase: AuditPhase::Orient,
            replicas_confirmed: 0,
            initial_attempts: 2,
            forced_attempts: 2,
            stable_observed: 1,
        };
        assert_eq!(assess(&e, &VerdictPolicy::default()).verdict, Verdict::Marginal);
    }
}
