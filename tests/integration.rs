//! Integration Tests - Does a whole audit hang together?
//!
//! Every audit runs with a fixed seed and either the mock oracle or a
//! scripted one, so nothing touches the network or the wall clock.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use iso_entropy::oracle::{ManualClock, OracleError, OracleProvider};
use iso_entropy::{
    AuditConfig, AuditInputs, AuditPhase, AuditReport, Decision, DecisionOracle, ExperimentKind,
    ExperimentOrchestrator, IsoError, MockOracle, OracleRequest, Rigidity, Termination, Verdict, Volatility,
};

struct ScriptedOracle {
    script: VecDeque<Decision>,
    calls: Rc<Cell<u32>>,
}

impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, _request: &OracleRequest) -> Result<Decision, OracleError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| Decision::terminate("nothing left to try")))
    }
}

fn config() -> AuditConfig {
    AuditConfig {
        runs: 400,
        replica_runs: 800,
        seed: Some(42),
        ..AuditConfig::default()
    }
}

fn mock_audit(config: AuditConfig, inputs: AuditInputs) -> AuditReport {
    let mut orchestrator = ExperimentOrchestrator::with_oracle(config, Box::new(MockOracle::new()));
    orchestrator.audit_system(&inputs).unwrap()
}

fn scripted_audit(script: Vec<Decision>, inputs: AuditInputs) -> (AuditReport, u32) {
    let calls = Rc::new(Cell::new(0));
    let oracle = ScriptedOracle {
        script: script.into(),
        calls: calls.clone(),
    };
    let mut orchestrator =
        ExperimentOrchestrator::with_oracle(config(), Box::new(oracle)).with_clock(Box::new(ManualClock::new()));
    let report = orchestrator.audit_system(&inputs).unwrap();
    (report, calls.get())
}

fn labels(report: &AuditReport) -> Vec<String> {
    report.log.records().map(|r| r.label()).collect()
}

/// I1: comfortable system under the mock walks ORIENT → CONCLUDE
#[test]
fn integration_low_low_is_robust() {
    let report = mock_audit(config(), AuditInputs::new(Volatility::Low, Rigidity::Low, 12));

    assert_eq!(report.verdict, Verdict::Robust, "reasons: {:?}", report.verdict_reasons);
    assert_eq!(report.final_phase, AuditPhase::Conclude);
    assert_eq!(report.termination, Termination::Concluded);
    assert_eq!(report.replicas_confirmed, 2);
    assert_eq!(report.k_min_viable, Some(2.75));
    assert!((report.margin.unwrap() - 2.15).abs() < 1e-9);
    assert_eq!(labels(&report), vec!["initial", "replica", "initial", "replica", "initial"]);
    assert!(report.mock_mode);
    assert_eq!(report.max_collapse_rate, 0.0);
    assert!(report.mean_critical_collapse_time.is_none());
}

/// I2: hopeless system gets its forced attempts and is called FRAGILE
#[test]
fn integration_high_high_is_fragile() {
    let report = mock_audit(config(), AuditInputs::new(Volatility::High, Rigidity::High, 3));

    assert_eq!(report.verdict, Verdict::Fragile);
    assert_eq!(labels(&report), vec!["initial", "forced-1", "forced-2"]);
    assert_eq!(report.agent.forced_attempts_run, 2);
    assert!(report.k_min_viable.is_none());
    assert_eq!(report.final_phase, AuditPhase::Conclude);
    assert!(report.max_collapse_rate >= 0.99);
    assert!(report.mean_critical_collapse_time.unwrap() < 5.0);
}

/// I3: an oracle that only says TERMINATE still yields an observation
#[test]
fn integration_terminate_oracle_still_observes() {
    // I = 0.6 against K = 1.5: the guard's baseline is stable, so nothing
    // forces a conclusion before the oracle's TERMINATE is honoured
    let (report, calls) = scripted_audit(vec![], AuditInputs::new(Volatility::Low, Rigidity::Medium, 6));

    assert_eq!(calls, 2);
    let first = report.log.records().next().unwrap();
    assert_eq!(first.kind, ExperimentKind::Initial);
    assert_eq!(first.capacity(), 1.5);
    assert!(first.stable);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.final_phase, AuditPhase::Validate);
    assert!(matches!(report.termination, Termination::Terminated { .. }));
}

/// I3b: a collapsing baseline under the same oracle ends in forced conclusion
#[test]
fn integration_terminate_oracle_collapsing_baseline() {
    let (report, _) = scripted_audit(vec![], AuditInputs::new(Volatility::Medium, Rigidity::Medium, 6));

    let first = report.log.records().next().unwrap();
    assert_eq!(first.kind, ExperimentKind::Initial);
    assert_eq!(first.capacity(), 1.5);
    assert_eq!(report.termination, Termination::ForcedConclusion);
    assert_eq!(report.verdict, Verdict::Fragile);
}

/// I4: oracle REPORT ends the audit and its text is kept
#[test]
fn integration_oracle_report_is_kept() {
    let (report, _) = scripted_audit(
        vec![
            Decision::simulate(3.0, "baseline"),
            Decision::Report {
                content: "Capacity comfortably exceeds load.".to_string(),
            },
        ],
        AuditInputs::new(Volatility::Low, Rigidity::Low, 12),
    );

    assert_eq!(report.termination, Termination::Reported);
    assert_eq!(report.oracle_report.as_deref(), Some("Capacity comfortably exceeds load."));
    assert_eq!(report.iterations, 2);
}

/// I5: no credentials means mock mode, never a network call
#[test]
fn integration_missing_key_runs_mock() {
    let mut cfg = config();
    cfg.oracle.provider = OracleProvider::Gemini;
    cfg.oracle.api_key = None;

    let mut orchestrator = ExperimentOrchestrator::new(cfg);
    assert_eq!(orchestrator.oracle_name(), "mock");
    let report = orchestrator
        .audit_system(&AuditInputs::new(Volatility::Low, Rigidity::Low, 12))
        .unwrap();
    assert!(report.mock_mode);
    assert_eq!(report.verdict, Verdict::Robust);
}

/// I6: the report survives a JSON round trip
#[test]
fn integration_report_json_round_trip() {
    let report = mock_audit(config(), AuditInputs::new(Volatility::Low, Rigidity::Low, 12));
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"verdict\":\"ROBUST\""));
    assert!(json.contains("\"final_phase\":\"CONCLUDE\""));

    let back: AuditReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.audit_id, report.audit_id);
    assert_eq!(back.total_experiments(), report.total_experiments());
}

/// I7: same seed, same audit
#[test]
fn integration_seeded_audits_repeat() {
    let inputs = AuditInputs::new(Volatility::Medium, Rigidity::High, 6);
    let a = mock_audit(config(), inputs.clone());
    let b = mock_audit(config(), inputs);

    let rates = |r: &AuditReport| r.log.records().map(|e| e.collapse_rate()).collect::<Vec<_>>();
    assert_eq!(rates(&a), rates(&b));
    assert_eq!(a.verdict, b.verdict);
}

/// I8: labels outside the enumerated tiers are rejected
#[test]
fn integration_unknown_label_rejected() {
    let err = AuditInputs::from_labels("Apocalyptic", "Low", 6).unwrap_err();
    assert!(matches!(err, IsoError::UnrecognizedCategory { kind: "volatility", .. }));

    let inputs = AuditInputs::from_labels("Alta (Caótica)", "Low", 6).unwrap();
    assert_eq!(inputs.volatility, Volatility::High);
}
