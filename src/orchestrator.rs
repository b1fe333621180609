//! ═══════════════════════════════════════════════════════════════════════════════
//! ORCHESTRATOR — Adaptive Structural-Fragility Experimentation Loop
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Per iteration:
//!
//!   pre-control gate ──(no short-circuit)──► oracle (cache → rate limit → call)
//!          │                                        │
//!          └──────────────► decision ◄──────────────┘
//!                              │
//!                            guard (no conclusion without data)
//!                              │
//!   SIMULATE: clamp K → simulate → UB95 → log → phase → replicas → K_min
//!             collapse ≥ 99% with nothing viable → forced re-exploration
//!
//! Oracle failures never escape: they degrade to mock decisions or TERMINATE.
//! Only malformed numeric input is fatal.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AuditConfig, FallbackPolicy};
use crate::constraints::{apply_hard_rules, ConstraintReport};
use crate::error::{IsoError, IsoResult};
use crate::experiment::{ExperimentKind, ExperimentLog, ExperimentRecord, Hypothesis};
use crate::grounding::{ground_inputs, PhysicalState, Rigidity, Volatility};
use crate::oracle::{
    self, Clock, Decision, DecisionOracle, MockOracle, OracleRequest, RateLimiter, ResponseCache, SystemClock,
    SystemSnapshot,
};
use crate::phase::{AuditPhase, PhaseStateMachine};
use crate::physics::{run_simulation, SimulationParams};
use crate::telemetry::OracleSignal;
use crate::verdict::{assess, AuditEvidence, Verdict, VerdictPolicy};

/// Collapse rate that triggers forced re-exploration
pub const FORCED_TRIGGER_RATE: f64 = 0.99;
/// I/K_base above which collapse is deterministic and nothing is simulated
pub const GATE_TERMINATE_RATIO: f64 = 1.5;
/// Liquidity below which a rigid system gets an automatic capacity probe
pub const GATE_LOW_LIQUIDITY: f64 = 0.3;
/// K increase proposed by the low-liquidity rule
pub const GATE_LIQUIDITY_STEP: f64 = 0.5;

const WINDOW_EPSILON: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════════════════
// INPUTS / STATE / REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// The three human answers plus free-text context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditInputs {
    pub volatility: Volatility,
    pub rigidity: Rigidity,
    pub buffer_months: u32,
    #[serde(default)]
    pub description: String,
}

impl AuditInputs {
    pub fn new(volatility: Volatility, rigidity: Rigidity, buffer_months: u32) -> Self {
        Self {
            volatility,
            rigidity,
            buffer_months,
            description: String::new(),
        }
    }

    /// Parse UI labels; unknown labels are rejected
    pub fn from_labels(volatility: &str, rigidity: &str, buffer_months: u32) -> IsoResult<Self> {
        Ok(Self::new(volatility.parse()?, rigidity.parse()?, buffer_months))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Search state carried across one audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub k_min_viable: Option<f64>,
    pub margin: Option<f64>,
    pub replicas_confirmed: u32,
    pub k_base_initial: f64,
    /// Base K the next proposal is clamped around
    pub k_base: f64,
    tested_k: Vec<f64>,
    pub initial_attempts: u32,
    pub forced_attempts_run: u32,
    pub replica_runs: u32,
    pub stable_observed: u32,
    pub forced_protocol_done: bool,
}

impl AgentState {
    fn new(k_initial: f64) -> Self {
        Self {
            k_min_viable: None,
            margin: None,
            replicas_confirmed: 0,
            k_base_initial: k_initial,
            k_base: k_initial,
            tested_k: Vec::new(),
            initial_attempts: 0,
            forced_attempts_run: 0,
            replica_runs: 0,
            stable_observed: 0,
            forced_protocol_done: false,
        }
    }

    /// Distinct K values simulated so far, in test order
    pub fn tested_k(&self) -> &[f64] {
        &self.tested_k
    }

    fn note_tested(&mut self, k: f64) {
        if !self.tested_k.iter().any(|t| (t - k).abs() < 1e-9) {
            self.tested_k.push(k);
        }
    }

    /// Keep the smallest viable K
    fn accept(&mut self, k: f64, entropy: f64) -> bool {
        if self.k_min_viable.map_or(true, |current| k < current) {
            self.k_min_viable = Some(k);
            self.margin = Some(k - entropy);
            return true;
        }
        false
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Phase machine reached CONCLUDE
    Concluded,
    /// Forced protocol found nothing and advanced the phase
    ForcedConclusion,
    /// TERMINATE from gate or oracle
    Terminated { reasoning: String },
    /// Oracle sent its report
    Reported,
    /// Oracle sent an action outside the contract
    UnrecognizedAction { action: String },
    MaxIterations,
}

/// Final artifact of one audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub audit_id: Uuid,
    pub inputs: AuditInputs,
    /// State straight out of grounding
    pub grounded: PhysicalState,
    /// Gated state plus adjustments and flags
    pub constraints: ConstraintReport,
    pub verdict: Verdict,
    pub verdict_reasons: Vec<String>,
    pub k_min_viable: Option<f64>,
    pub margin: Option<f64>,
    pub replicas_confirmed: u32,
    pub final_phase: AuditPhase,
    pub termination: Termination,
    pub iterations: u32,
    pub oracle: String,
    pub mock_mode: bool,
    pub oracle_degraded: bool,
    pub oracle_report: Option<String>,
    /// Oracle cache lookups answered / missed during this audit
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub max_collapse_rate: f64,
    /// Mean collapse week over experiments that collapsed at all
    pub mean_critical_collapse_time: Option<f64>,
    pub agent: AgentState,
    pub log: ExperimentLog,
    pub rate_limit_wait_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn theta_max(&self) -> f64 {
        self.constraints.state.theta_max
    }

    pub fn total_experiments(&self) -> u32 {
        self.log.total_experiments()
    }
}

/// Mutable state of one audit in flight
struct AuditRun {
    inputs: AuditInputs,
    state: PhysicalState,
    flags_note: String,
    agent: AgentState,
    fsm: PhaseStateMachine,
    log: ExperimentLog,
    degraded: bool,
    oracle_report: Option<String>,
    simulations: u64,
    wait: Duration,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ExperimentOrchestrator {
    config: AuditConfig,
    oracle: Box<dyn DecisionOracle>,
    fallback: MockOracle,
    limiter: RateLimiter,
    cache: ResponseCache,
}

impl ExperimentOrchestrator {
    /// Oracle chosen by config; no credentials means mock mode
    pub fn new(config: AuditConfig) -> Self {
        let oracle = oracle::from_config(&config.oracle);
        Self::with_oracle(config, oracle)
    }

    pub fn with_oracle(config: AuditConfig, oracle: Box<dyn DecisionOracle>) -> Self {
        let limiter = Self::limiter(&config, Box::new(SystemClock::new()));
        Self {
            config,
            oracle,
            fallback: MockOracle::new(),
            limiter,
            cache: ResponseCache::new(),
        }
    }

    /// Swap the time source used for oracle rate limiting
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.limiter = Self::limiter(&self.config, clock);
        self
    }

    fn limiter(config: &AuditConfig, clock: Box<dyn Clock>) -> RateLimiter {
        RateLimiter::new(
            config.oracle.requests_per_window,
            Duration::from_secs(config.oracle.window_secs),
            Duration::from_secs(config.oracle.min_interval_secs),
            clock,
        )
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Run one complete audit
    pub fn audit_system(&mut self, inputs: &AuditInputs) -> IsoResult<AuditReport> {
        let started_at = Utc::now();
        let audit_id = Uuid::new_v4();
        let (hits_before, misses_before) = (self.cache.hits(), self.cache.misses());

        let grounded = ground_inputs(inputs.volatility, inputs.rigidity, inputs.buffer_months);
        let constraints = apply_hard_rules(inputs.volatility, inputs.rigidity, grounded)?;
        let state = constraints.state;

        info!(
            audit = %audit_id,
            entropy = state.entropy,
            capacity = state.capacity,
            theta_max = state.theta_max,
            oracle = self.oracle.name(),
            "audit started"
        );
        for note in &constraints.adjustments {
            info!(audit = %audit_id, "{}", note);
        }

        let flags_note = constraints
            .flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut run = AuditRun {
            inputs: inputs.clone(),
            state,
            flags_note,
            agent: AgentState::new(state.capacity),
            fsm: PhaseStateMachine::new(self.config.stability),
            log: ExperimentLog::new(self.config.compaction_threshold),
            degraded: false,
            oracle_report: None,
            simulations: 0,
            wait: Duration::ZERO,
        };

        let mut termination = Termination::MaxIterations;
        let mut iterations = 0;

        for iteration in 1..=self.config.max_iterations {
            if !run.fsm.allow_simulation() {
                termination = Termination::Concluded;
                break;
            }
            iterations = iteration;
            debug!(iteration, phase = %run.fsm.phase(), k_base = run.agent.k_base, "iteration");

            let decision = match self.pre_control(&run) {
                Some(decision) => {
                    info!(iteration, action = decision.action(), "pre-control gate decided");
                    decision
                }
                None => self.consult_oracle(&mut run),
            };

            let decision = if !decision.is_simulate() && run.log.total_experiments() == 0 {
                warn!(
                    iteration,
                    rejected = decision.action(),
                    k = run.agent.k_base,
                    "no experiment logged yet, forcing a conservative SIMULATE"
                );
                Decision::simulate(run.agent.k_base, "Guard: at least one empirical observation is required")
            } else {
                decision
            };

            match decision {
                Decision::Simulate { k, reasoning } => {
                    if self.run_primary(&mut run, iteration, k, reasoning)? {
                        termination = Termination::ForcedConclusion;
                        break;
                    }
                }
                Decision::Terminate { reasoning } => {
                    info!(iteration, %reasoning, "audit terminated");
                    termination = Termination::Terminated { reasoning };
                    break;
                }
                Decision::Report { content } => {
                    run.oracle_report = Some(content);
                    termination = Termination::Reported;
                    break;
                }
                Decision::Unrecognized { action } => {
                    warn!(iteration, %action, "unrecognized oracle action, stopping");
                    termination = Termination::UnrecognizedAction { action };
                    break;
                }
            }
        }

        if termination == Termination::MaxIterations && !run.fsm.allow_simulation() {
            termination = Termination::Concluded;
        }

        let evidence = AuditEvidence {
            entropy: run.state.entropy,
            k_initial: run.agent.k_base_initial,
            k_min_viable: run.agent.k_min_viable,
            phase: run.fsm.phase(),
            replicas_confirmed: run.agent.replicas_confirmed,
            initial_attempts: run.agent.initial_attempts,
            forced_attempts: run.agent.forced_attempts_run,
            stable_observed: run.agent.stable_observed,
        };
        let assessment = assess(&evidence, &VerdictPolicy::from(&self.config));
        let overall = run.log.overall_summary();

        info!(
            audit = %audit_id,
            verdict = %assessment.verdict,
            k_min_viable = ?run.agent.k_min_viable,
            phase = %run.fsm.phase(),
            experiments = run.log.total_experiments(),
            "audit finished"
        );

        Ok(AuditReport {
            audit_id,
            inputs: run.inputs,
            grounded,
            constraints,
            verdict: assessment.verdict,
            verdict_reasons: assessment.reasons,
            k_min_viable: run.agent.k_min_viable,
            margin: run.agent.margin,
            replicas_confirmed: run.agent.replicas_confirmed,
            final_phase: run.fsm.phase(),
            termination,
            iterations,
            oracle: self.oracle.name().to_string(),
            mock_mode: self.oracle.is_mock(),
            oracle_degraded: run.degraded,
            oracle_report: run.oracle_report,
            cache_hits: self.cache.hits() - hits_before,
            cache_misses: self.cache.misses() - misses_before,
            max_collapse_rate: overall.as_ref().map_or(0.0, |s| s.max_collapse_rate),
            mean_critical_collapse_time: overall.as_ref().and_then(|s| s.mean_critical_collapse_time()),
            agent: run.agent,
            log: run.log,
            rate_limit_wait_ms: run.wait.as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DECISIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Clamp window around a base K
    fn k_window(&self, k_base: f64) -> (f64, f64) {
        (
            self.config.k_floor.max(k_base - self.config.max_k_step),
            self.config.k_ceiling.min(k_base + self.config.max_k_step),
        )
    }

    /// Oracle proposes, physics bounds
    fn clamp_k(&self, proposed: f64, k_base: f64) -> f64 {
        let (lo, hi) = self.k_window(k_base);
        proposed.max(lo).min(hi)
    }

    /// Deterministic short-circuits that never touch the oracle
    fn pre_control(&self, run: &AuditRun) -> Option<Decision> {
        let s = &run.state;
        let k_base = run.agent.k_base;

        if s.entropy > GATE_TERMINATE_RATIO * k_base {
            return Some(Decision::terminate(format!(
                "Deterministic collapse: I={:.2} > {:.1}·K={:.2}",
                s.entropy,
                GATE_TERMINATE_RATIO,
                GATE_TERMINATE_RATIO * k_base
            )));
        }
        if s.stock <= 0.0 {
            return Some(Decision::terminate("No buffer stock left to absorb entropy debt"));
        }
        if s.liquidity < GATE_LOW_LIQUIDITY && run.inputs.rigidity == Rigidity::High {
            return Some(Decision::simulate(
                k_base + GATE_LIQUIDITY_STEP,
                format!(
                    "Liquidity {:.2} under high rigidity: conservative capacity increase",
                    s.liquidity
                ),
            ));
        }
        if run.fsm.phase() == AuditPhase::Orient {
            let (lo, hi) = self.k_window(k_base);
            if hi - lo < WINDOW_EPSILON {
                if run.log.total_experiments() == 0 {
                    return Some(Decision::simulate(k_base, "Degenerate K window: single probe at base K"));
                }
                let err = IsoError::DegenerateSearch(format!("no room to move K around {:.2}", k_base));
                return Some(Decision::terminate(err.to_string()));
            }
        }
        None
    }

    fn request(&self, run: &AuditRun) -> OracleRequest {
        let s = &run.state;
        let mut description = format!(
            "Volatility: {}. Rigidity: {}. Buffer: {} months.",
            run.inputs.volatility, run.inputs.rigidity, run.inputs.buffer_months
        );
        if !run.flags_note.is_empty() {
            description.push_str(&format!(" Flags: {}.", run.flags_note));
        }
        if !run.inputs.description.trim().is_empty() {
            description.push('\n');
            description.push_str(run.inputs.description.trim());
        }

        OracleRequest {
            phase: run.fsm.phase(),
            phase_rationale: run.fsm.phase_rationale().to_string(),
            system_description: description,
            snapshot: SystemSnapshot {
                entropy: s.entropy,
                k_base: run.agent.k_base,
                k_initial: run.agent.k_base_initial,
                stock: s.stock,
                liquidity: s.liquidity,
                capital: s.capital,
                theta_max: s.theta_max,
                k_window: self.k_window(run.agent.k_base),
            },
            signal: OracleSignal::from_log(&run.log),
        }
    }

    /// Cache → rate limit → oracle, degrading on failure
    fn consult_oracle(&mut self, run: &mut AuditRun) -> Decision {
        let request = self.request(run);

        if run.degraded || self.oracle.is_mock() {
            let mock: &mut dyn DecisionOracle = if run.degraded {
                &mut self.fallback
            } else {
                self.oracle.as_mut()
            };
            let decision = mock
                .decide(&request)
                .unwrap_or_else(|e| Decision::terminate(IsoError::from(e).to_string()));
            debug!(source = mock.name(), action = decision.action(), "mock decision");
            return decision;
        }

        let key = match ResponseCache::key_for(&request) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "could not hash oracle request, skipping cache");
                None
            }
        };
        if let Some(decision) = key.as_deref().and_then(|k| self.cache.get(k)) {
            debug!(action = decision.action(), "oracle cache hit");
            return decision;
        }

        run.wait += self.limiter.acquire();

        match self.oracle.decide(&request) {
            Ok(decision) => {
                debug!(oracle = self.oracle.name(), action = decision.action(), "oracle decision");
                if let Some(key) = key {
                    self.cache.insert(key, decision.clone());
                }
                decision
            }
            Err(e) => match self.config.oracle.fallback {
                FallbackPolicy::Mock => {
                    warn!(error = %e, "oracle failed, switching to mock decisions");
                    run.degraded = true;
                    self.fallback
                        .decide(&request)
                        .unwrap_or_else(|e| Decision::terminate(IsoError::from(e).to_string()))
                }
                FallbackPolicy::Terminate => {
                    warn!(error = %e, "oracle failed, terminating");
                    Decision::terminate(IsoError::from(e).to_string())
                }
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPERIMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Primary experiment; returns true when the phase was force-advanced
    fn run_primary(&self, run: &mut AuditRun, iteration: u32, proposed: f64, reasoning: String) -> IsoResult<bool> {
        let k = self.clamp_k(proposed, run.agent.k_base);
        if (k - proposed).abs() > 1e-9 {
            info!(iteration, proposed, clamped = k, "proposed K clamped to the allowed window");
        }

        let record = self.experiment(
            run,
            iteration.to_string(),
            ExperimentKind::Initial,
            k,
            reasoning,
            self.config.simulation_params(),
        )?;
        run.agent.initial_attempts += 1;
        run.agent.k_base = k;
        run.fsm.update(record.collapse_rate(), record.upper_ci95);
        self.settle(run, &record, iteration)?;

        if record.collapse_rate() >= FORCED_TRIGGER_RATE
            && run.agent.k_min_viable.is_none()
            && !run.agent.forced_protocol_done
        {
            return self.forced_protocol(run, iteration);
        }
        Ok(false)
    }

    /// Probe K0 + n·ΔK within the accessibility budget
    fn forced_protocol(&self, run: &mut AuditRun, ordinal: u32) -> IsoResult<bool> {
        run.agent.forced_protocol_done = true;
        let k0 = run.agent.k_base_initial;
        info!(k0, attempts = self.config.forced_attempts, "forced re-exploration");

        for n in 1..=self.config.forced_attempts {
            let target = (k0 + n as f64 * self.config.forced_k_step)
                .min(k0 * self.config.max_forced_factor)
                .min(k0 + self.config.max_forced_delta);
            let k = target.max(self.config.k_floor).min(self.config.k_ceiling);

            let record = self.experiment(
                run,
                format!("{}-forced-{}", ordinal, n),
                ExperimentKind::Forced(n),
                k,
                format!("Forced re-exploration {} of {} from K0={:.2}", n, self.config.forced_attempts, k0),
                self.config.simulation_params(),
            )?;
            run.agent.forced_attempts_run += 1;
            run.fsm.update(record.collapse_rate(), record.upper_ci95);
            self.settle(run, &record, ordinal)?;
        }

        if let Some(k) = run.agent.k_min_viable {
            run.agent.k_base = k;
            return Ok(false);
        }
        if run.fsm.phase() == AuditPhase::Orient {
            warn!("forced re-exploration found no viable K, advancing to CONCLUDE");
            run.fsm.force_conclude();
            return Ok(true);
        }
        Ok(false)
    }

    /// Replica confirmation, then K_min bookkeeping
    fn settle(&self, run: &mut AuditRun, record: &ExperimentRecord, ordinal: u32) -> IsoResult<()> {
        let criteria = &self.config.stability;
        let marginal_forced =
            matches!(record.kind, ExperimentKind::Forced(_)) && criteria.is_marginal(record.collapse_rate());
        let wants_replica =
            marginal_forced || (record.stable && run.agent.replicas_confirmed < self.config.required_replicas);
        let k = record.capacity();

        if !wants_replica {
            if record.stable && run.agent.accept(k, run.state.entropy) {
                info!(k, "new minimum viable K");
            }
            return Ok(());
        }

        let cycle_id = match record.kind {
            ExperimentKind::Forced(n) => format!("{}-replica-{}", ordinal, n),
            _ => format!("{}-replica", ordinal),
        };
        let replica = self.experiment(
            run,
            cycle_id,
            ExperimentKind::Replica,
            k,
            format!("Replica of {} at K={:.2}", record.cycle_id, k),
            self.config.replica_params(),
        )?;
        run.agent.replica_runs += 1;

        if replica.stable {
            run.agent.replicas_confirmed += 1;
            let improved = run.agent.accept(k, run.state.entropy);
            info!(k, confirmed = run.agent.replicas_confirmed, improved, "replica confirmed stability");
        } else {
            info!(k, rate = replica.collapse_rate(), "replica rejected K");
        }
        Ok(())
    }

    /// Simulate, validate and log one hypothesis
    fn experiment(
        &self,
        run: &mut AuditRun,
        cycle_id: String,
        kind: ExperimentKind,
        k: f64,
        reasoning: String,
        params: SimulationParams,
    ) -> IsoResult<ExperimentRecord> {
        run.simulations += 1;
        let params = SimulationParams {
            seed: params.seed.map(|s| s ^ run.simulations.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            ..params
        };

        let result = run_simulation(run.state.entropy, k, run.state.theta_max, &params)?;
        let record = ExperimentRecord::new(
            cycle_id,
            kind,
            Hypothesis {
                entropy: run.state.entropy,
                capacity: k,
            },
            result,
            run.state.theta_max,
            reasoning,
            &self.config.stability,
        );

        run.agent.note_tested(k);
        if record.stable {
            run.agent.stable_observed += 1;
        }

        info!(
            cycle = %record.cycle_id,
            label = %record.label(),
            k,
            collapse_rate = record.collapse_rate(),
            upper_ci95 = record.upper_ci95,
            band = %record.band,
            phase = %run.fsm.phase(),
            "experiment"
        );

        if let Some(summary) = run.log.push(record.clone()) {
            info!(experiments = summary.experiments, "experiment log compacted");
        }
        Ok(record)
    }
}
