//! ═══════════════════════════════════════════════════════════════════════════════
//! MOCK ORACLE — Deterministic Phase Stubs
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! ORIENT   → last K + 0.5 after an unstable result, last K − 0.25 after a
//!            stable one, base K with no data
//! VALIDATE → repeat last K
//! STRESS   → last K − 0.25
//! CONCLUDE → REPORT
//! ═══════════════════════════════════════════════════════════════════════════════

use super::{Decision, DecisionOracle, OracleError, OracleRequest};
use crate::phase::AuditPhase;

/// Step up after an unstable ORIENT probe
pub const MOCK_STEP_UP: f64 = 0.5;
/// Step down to test a tighter capacity
pub const MOCK_STEP_DOWN: f64 = 0.25;

#[derive(Debug, Default, Clone, Copy)]
pub struct MockOracle;

impl MockOracle {
    pub fn new() -> Self {
        Self
    }
}

impl DecisionOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_mock(&self) -> bool {
        true
    }

    fn decide(&mut self, request: &OracleRequest) -> Result<Decision, OracleError> {
        let k_base = request.snapshot.k_base;
        let last_k = request.signal.last_k;

        let decision = match (request.phase, last_k) {
            (AuditPhase::Conclude, _) => Decision::Report {
                content: format!(
                    "[mock] {} experiments, {} statistically stable.",
                    request.signal.experiments, request.signal.stable_count
                ),
            },
            (_, None) => Decision::simulate(k_base, "[mock] baseline probe at base capacity"),
            (AuditPhase::Orient, Some(k)) => {
                if request.signal.last_stable == Some(true) {
                    Decision::simulate(k - MOCK_STEP_DOWN, "[mock] stable, trying a leaner capacity")
                } else {
                    Decision::simulate(k + MOCK_STEP_UP, "[mock] unstable, raising capacity")
                }
            }
            (AuditPhase::Validate, Some(k)) => Decision::simulate(k, "[mock] confirming last capacity"),
            (AuditPhase::Stress, Some(k)) => {
                Decision::simulate(k - MOCK_STEP_DOWN, "[mock] stressing below last capacity")
            }
        };

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SystemSnapshot;
    use crate::telemetry::OracleSignal;

    fn request(phase: AuditPhase, last_k: Option<f64>, last_stable: Option<bool>) -> OracleRequest {
        let mut signal = OracleSignal::empty();
        signal.last_k = last_k;
        signal.last_stable = last_stable;
        signal.experiments = u32::from(last_k.is_some());
        OracleRequest {
            phase,
            phase_rationale: phase.rationale().to_string(),
            system_description: String::new(),
            snapshot: SystemSnapshot {
                entropy: 1.5,
                k_base: 1.5,
                k_initial: 1.5,
                stock: 0.5,
                liquidity: 0.6,
                capital: 1.0,
                theta_max: 2.26,
                k_window: (0.75, 2.25),
            },
            signal,
        }
    }

    fn k_of(decision: Decision) -> f64 {
        match decision {
            Decision::Simulate { k, .. } => k,
            other => panic!("expected SIMULATE, got {:?}", other),
        }
    }

    #[test]
    fn test_orient() {
        let mut oracle = MockOracle::new();
        assert_eq!(k_of(oracle.decide(&request(AuditPhase::Orient, None, None)).unwrap()), 1.5);
        assert_eq!(
            k_of(oracle.decide(&request(AuditPhase::Orient, Some(2.0), Some(false))).unwrap()),
            2.5
        );
        assert_eq!(
            k_of(oracle.decide(&request(AuditPhase::Orient, Some(2.0), Some(true))).unwrap()),
            1.75
        );
    }

    #[test]
    fn test_validate_and_stress() {
        let mut oracle = MockOracle::new();
        assert_eq!(
            k_of(oracle.decide(&request(AuditPhase::Validate, Some(2.0), Some(true))).unwrap()),
            2.0
        );
        assert_eq!(
            k_of(oracle.decide(&request(AuditPhase::Stress, Some(2.0), Some(true))).unwrap()),
            1.75
        );
    }

    #[test]
    fn test_conclude_reports() {
        let mut oracle = MockOracle::new();
        let d = oracle.decide(&request(AuditPhase::Conclude, Some(2.0), Some(true))).unwrap();
        assert!(matches!(d, Decision::Report { .. }));
        assert!(oracle.is_mock());
    }
}
