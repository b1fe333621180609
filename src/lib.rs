//! ═══════════════════════════════════════════════════════════════════════════════
//! ISO-ENTROPY — Structural Fragility Auditor
//! ═══════════════════════════════════════════════════════════════════════════════
//! Three answers in (volatility, rigidity, buffer months), a verdict out.
//! Monte Carlo entropy debt decides; the oracle only proposes.
//! ═══════════════════════════════════════════════════════════════════════════════

#![allow(clippy::too_many_arguments)] // Experiment construction carries the whole hypothesis
#![allow(clippy::new_without_default)] // Some types shouldn't have Default

// ═══════════════════════════════════════════════════════════════════════════════
// FOUNDATION — grounding, physics, statistics
// ═══════════════════════════════════════════════════════════════════════════════

pub mod constraints;
pub mod error;
pub mod grounding;
pub mod physics;
pub mod stats;

pub use error::{ConfigError, IsoError, IsoResult};

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROL — phase machine, memory, oracle, verdict
// ═══════════════════════════════════════════════════════════════════════════════

pub mod config;
pub mod experiment;
pub mod oracle;
pub mod orchestrator;
pub mod phase;
pub mod telemetry;
pub mod verdict;

// ═══════════════════════════════════════════════════════════════════════════════
// SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

pub mod display;

pub use config::{AuditConfig, FallbackPolicy, OracleConfig};
pub use constraints::{apply_hard_rules, ConstraintFlag, ConstraintReport};
pub use experiment::{CompressedSummary, ExperimentKind, ExperimentLog, ExperimentRecord};
pub use grounding::{ground_inputs, PhysicalState, Rigidity, Volatility};
pub use oracle::{Decision, DecisionOracle, MockOracle, OracleProvider, OracleRequest};
pub use orchestrator::{AuditInputs, AuditReport, ExperimentOrchestrator, Termination};
pub use phase::{AuditPhase, PhaseStateMachine};
pub use physics::{calculate_collapse_threshold, run_simulation, SimulationParams, SimulationResult};
pub use stats::{wilson_upper_bound, StabilityCriteria};
pub use telemetry::{OracleSignal, Trend};
pub use verdict::{assess, Assessment, Verdict};
