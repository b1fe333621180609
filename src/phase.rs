//! ═══════════════════════════════════════════════════════════════════════════════
//! PHASE — Evidence-Gated Audit State Machine
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//!   ORIENT ──stable──► VALIDATE ──stable×2──► STRESS ──any──► CONCLUDE
//!     ▲                   │
//!     └────unstable───────┘
//!
//! The machine is blind on purpose: it sees only (collapse_rate, UB95), never
//! I, K or the narrative around them. CONCLUDE is terminal.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

use crate::stats::StabilityCriteria;

/// Consecutive stable observations needed to leave VALIDATE
pub const REQUIRED_STABLE_HITS: u32 = 2;

/// Audit phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditPhase {
    Orient,
    Validate,
    Stress,
    Conclude,
}

impl AuditPhase {
    pub fn name(self) -> &'static str {
        match self {
            AuditPhase::Orient => "ORIENT",
            AuditPhase::Validate => "VALIDATE",
            AuditPhase::Stress => "STRESS",
            AuditPhase::Conclude => "CONCLUDE",
        }
    }

    /// Canonical role of the phase, handed to the oracle verbatim
    pub fn rationale(self) -> &'static str {
        match self {
            AuditPhase::Orient => "Diagnose whether the system can enter a stable region.",
            AuditPhase::Validate => "Confirm that the observed stability is not a statistical accident.",
            AuditPhase::Stress => "Detect structural fragility under controlled stress.",
            AuditPhase::Conclude => "Additional information gain is marginal.",
        }
    }
}

impl std::fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// ORIENT → VALIDATE → STRESS → CONCLUDE
#[derive(Debug, Clone)]
pub struct PhaseStateMachine {
    phase: AuditPhase,
    stable_hits: u32,
    criteria: StabilityCriteria,
}

impl Default for PhaseStateMachine {
    fn default() -> Self {
        Self::new(StabilityCriteria::default())
    }
}

impl PhaseStateMachine {
    pub fn new(criteria: StabilityCriteria) -> Self {
        Self {
            phase: AuditPhase::Orient,
            stable_hits: 0,
            criteria,
        }
    }

    /// Feed one observation and advance
    pub fn update(&mut self, collapse_rate: f64, upper_ci95: f64) -> AuditPhase {
        let stable = self.criteria.is_statistically_stable(collapse_rate, upper_ci95);

        match self.phase {
            AuditPhase::Orient => {
                if stable {
                    self.phase = AuditPhase::Validate;
                    self.stable_hits = 1;
                }
            }
            AuditPhase::Validate => {
                if stable {
                    self.stable_hits += 1;
                    if self.stable_hits >= REQUIRED_STABLE_HITS {
                        self.phase = AuditPhase::Stress;
                    }
                } else {
                    self.phase = AuditPhase::Orient;
                    self.stable_hits = 0;
                }
            }
            // single stress pass, no further K search
            AuditPhase::Stress => self.phase = AuditPhase::Conclude,
            AuditPhase::Conclude => {}
        }

        self.phase
    }

    /// Exploration continues until CONCLUDE
    pub fn allow_simulation(&self) -> bool {
        self.phase != AuditPhase::Conclude
    }

    /// Jump to CONCLUDE so a hopeless ORIENT search ends with a verdict
    pub fn force_conclude(&mut self) {
        self.phase = AuditPhase::Conclude;
    }

    pub fn phase(&self) -> AuditPhase {
        self.phase
    }

    pub fn stable_hits(&self) -> u32 {
        self.stable_hits
    }

    pub fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    pub fn phase_rationale(&self) -> &'static str {
        self.phase.rationale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STABLE: (f64, f64) = (0.01, 0.01);
    const UNSTABLE: (f64, f64) = (0.5, 0.5);

    #[test]
    fn test_starts_in_orient() {
        let fsm = PhaseStateMachine::default();
        assert_eq!(fsm.phase(), AuditPhase::Orient);
        assert_eq!(fsm.stable_hits(), 0);
        assert!(fsm.allow_simulation());
    }

    #[test]
    fn test_orient_stays_on_instability() {
        let mut fsm = PhaseStateMachine::default();
        for _ in 0..5 {
            assert_eq!(fsm.update(UNSTABLE.0, UNSTABLE.1), AuditPhase::Orient);
        }
        assert_eq!(fsm.stable_hits(), 0);
    }

    #[test]
    fn test_stable_evidence_walks_to_conclude() {
        let mut fsm = PhaseStateMachine::default();

        assert_eq!(fsm.update(STABLE.0, STABLE.1), AuditPhase::Validate);
        assert_eq!(fsm.stable_hits(), 1);

        assert_eq!(fsm.update(STABLE.0, STABLE.1), AuditPhase::Stress);
        assert_eq!(fsm.stable_hits(), 2);

        // third call is the single stress pass
        assert_eq!(fsm.update(STABLE.0, STABLE.1), AuditPhase::Conclude);
        assert!(!fsm.allow_simulation());
    }

    #[test]
    fn test_validate_resets_on_instability() {
        let mut fsm = PhaseStateMachine::default();
        fsm.update(STABLE.0, STABLE.1);
        assert_eq!(fsm.update(UNSTABLE.0, UNSTABLE.1), AuditPhase::Orient);
        assert_eq!(fsm.stable_hits(), 0);
    }

    #[test]
    fn test_upper_bound_gates_stability() {
        let mut fsm = PhaseStateMachine::default();
        // clean rate but a wide interval is not evidence
        assert_eq!(fsm.update(0.0, 0.16), AuditPhase::Orient);
    }

    #[test]
    fn test_stress_concludes_even_on_collapse() {
        let mut fsm = PhaseStateMachine::default();
        fsm.update(STABLE.0, STABLE.1);
        fsm.update(STABLE.0, STABLE.1);
        assert_eq!(fsm.update(1.0, 1.0), AuditPhase::Conclude);
    }

    #[test]
    fn test_conclude_is_terminal() {
        let mut fsm = PhaseStateMachine::default();
        fsm.force_conclude();
        assert_eq!(fsm.update(STABLE.0, STABLE.1), AuditPhase::Conclude);
        assert_eq!(fsm.update(UNSTABLE.0, UNSTABLE.1), AuditPhase::Conclude);
        assert!(!fsm.allow_simulation());
    }

    #[test]
    fn test_names() {
        assert_eq!(AuditPhase::Orient.to_string(), "ORIENT");
        assert_eq!(PhaseStateMachine::default().phase_name(), "ORIENT");
        assert!(!AuditPhase::Stress.rationale().is_empty());
    }
}
