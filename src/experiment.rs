//! ═══════════════════════════════════════════════════════════════════════════════
//! EXPERIMENT — Append-Only Experiment Log with Lossy Compaction
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Records are appended in order. Once the log holds more than
//! `compaction_threshold` entries it is replaced by a single
//! `CompressedSummary`; later records append after it until the next
//! compaction folds them in again. Compaction is deterministic and local.
//! ═══════════════════════════════════════════════════════════════════════════════

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::physics::SimulationResult;
use crate::stats::{bernoulli_entropy, StabilityBand, StabilityCriteria};
use crate::telemetry::Trend;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Why an experiment was run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "attempt", rename_all = "snake_case")]
pub enum ExperimentKind {
    /// Primary experiment proposed by the gate or the oracle
    Initial,
    /// n-th forced re-exploration probe (1-based)
    Forced(u32),
    /// Larger-sample confirmation of an earlier experiment
    Replica,
}

impl ExperimentKind {
    pub fn label(&self) -> String {
        match self {
            ExperimentKind::Initial => "initial".to_string(),
            ExperimentKind::Forced(n) => format!("forced-{}", n),
            ExperimentKind::Replica => "replica".to_string(),
        }
    }

    pub fn is_replica(&self) -> bool {
        matches!(self, ExperimentKind::Replica)
    }
}

/// (I, K) pair under test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub entropy: f64,
    pub capacity: f64,
}

/// One simulated hypothesis and its validated outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// "3", "3-forced-1", "3-replica"
    pub cycle_id: String,
    pub kind: ExperimentKind,
    pub hypothesis: Hypothesis,
    pub result: SimulationResult,
    pub upper_ci95: f64,
    pub theta_max: f64,
    /// Statistically stable (rate AND UB95 below threshold)
    pub stable: bool,
    pub band: StabilityBand,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl ExperimentRecord {
    pub fn new(
        cycle_id: impl Into<String>,
        kind: ExperimentKind,
        hypothesis: Hypothesis,
        result: SimulationResult,
        theta_max: f64,
        reasoning: impl Into<String>,
        criteria: &StabilityCriteria,
    ) -> Self {
        let upper_ci95 = criteria.upper_bound(result.collapses, result.runs);
        let stable = criteria.is_statistically_stable(result.collapse_rate, upper_ci95);
        let band = criteria.band(result.collapse_rate);
        Self {
            cycle_id: cycle_id.into(),
            kind,
            hypothesis,
            result,
            upper_ci95,
            theta_max,
            stable,
            band,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn label(&self) -> String {
        self.kind.label()
    }

    pub fn collapse_rate(&self) -> f64 {
        self.result.collapse_rate
    }

    pub fn capacity(&self) -> f64 {
        self.hypothesis.capacity
    }

    /// (I−K)·rate when under-capacitated, else 0
    pub fn entropy_debt(&self) -> f64 {
        let gap = self.hypothesis.entropy - self.hypothesis.capacity;
        if gap > 0.0 {
            gap * self.result.collapse_rate
        } else {
            0.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPRESSED SUMMARY
// ═══════════════════════════════════════════════════════════════════════════════

/// Lossy, mergeable digest of a run of experiments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedSummary {
    pub experiments: u32,
    pub stable_count: u32,
    pub min_collapse_rate: f64,
    pub max_collapse_rate: f64,
    pub mean_collapse_rate: f64,
    pub k_min: f64,
    pub k_max: f64,
    pub theta_min: f64,
    pub theta_max: f64,
    /// Σ (I−K)·rate over under-capacitated experiments
    pub entropy_debt: f64,
    /// Mean Bernoulli entropy of the collapse rates H(M), bits
    pub system_uncertainty: f64,
    pub last_collapse_rate: f64,
    /// Rate of the experiment before the last one
    pub previous_collapse_rate: Option<f64>,
    pub last_k: f64,
    pub last_theta: f64,
    pub last_band: StabilityBand,
    /// Last experiment was statistically stable
    pub last_stable: bool,
    pub overall_trend: Trend,
    /// Collapse time over experiments that collapsed at all
    pub critical_collapse_time_sum: f64,
    pub critical_count: u32,
}

impl CompressedSummary {
    /// Digest a non-empty slice of records; `None` when empty
    pub fn from_records(records: &[&ExperimentRecord]) -> Option<Self> {
        let last = records.last()?;
        let rates: Vec<f64> = records.iter().map(|r| r.collapse_rate()).collect();
        let ks: Vec<f64> = records.iter().map(|r| r.capacity()).collect();
        let thetas: Vec<f64> = records.iter().map(|r| r.theta_max).collect();
        let n = records.len();

        let critical: Vec<f64> = records
            .iter()
            .filter(|r| r.result.any_collapse())
            .filter_map(|r| r.result.mean_collapse_time)
            .collect();

        Some(Self {
            experiments: n as u32,
            stable_count: records.iter().filter(|r| r.stable).count() as u32,
            min_collapse_rate: fold_min(&rates),
            max_collapse_rate: fold_max(&rates),
            mean_collapse_rate: rates.iter().sum::<f64>() / n as f64,
            k_min: fold_min(&ks),
            k_max: fold_max(&ks),
            theta_min: fold_min(&thetas),
            theta_max: fold_max(&thetas),
            entropy_debt: records.iter().map(|r| r.entropy_debt()).sum(),
            system_uncertainty: rates.iter().map(|&p| bernoulli_entropy(p)).sum::<f64>() / n as f64,
            last_collapse_rate: last.collapse_rate(),
            previous_collapse_rate: n.checked_sub(2).map(|i| rates[i]),
            last_k: last.capacity(),
            last_theta: last.theta_max,
            last_band: last.band,
            last_stable: last.stable,
            overall_trend: Trend::overall(&rates),
            critical_collapse_time_sum: critical.iter().sum(),
            critical_count: critical.len() as u32,
        })
    }

    /// Fold a newer summary into this one
    ///
    /// Counts and sums are exact. The overall trend compares the two means
    /// (older block vs newer block).
    pub fn merge(&self, newer: &CompressedSummary) -> CompressedSummary {
        let n_old = self.experiments as f64;
        let n_new = newer.experiments as f64;
        let total = n_old + n_new;
        let weighted = |a: f64, b: f64| {
            if total > 0.0 {
                (a * n_old + b * n_new) / total
            } else {
                0.0
            }
        };

        CompressedSummary {
            experiments: self.experiments + newer.experiments,
            stable_count: self.stable_count + newer.stable_count,
            min_collapse_rate: self.min_collapse_rate.min(newer.min_collapse_rate),
            max_collapse_rate: self.max_collapse_rate.max(newer.max_collapse_rate),
            mean_collapse_rate: weighted(self.mean_collapse_rate, newer.mean_collapse_rate),
            k_min: self.k_min.min(newer.k_min),
            k_max: self.k_max.max(newer.k_max),
            theta_min: self.theta_min.min(newer.theta_min),
            theta_max: self.theta_max.max(newer.theta_max),
            entropy_debt: self.entropy_debt + newer.entropy_debt,
            system_uncertainty: weighted(self.system_uncertainty, newer.system_uncertainty),
            last_collapse_rate: newer.last_collapse_rate,
            previous_collapse_rate: newer
                .previous_collapse_rate
                .or(Some(self.last_collapse_rate)),
            last_k: newer.last_k,
            last_theta: newer.last_theta,
            last_band: newer.last_band,
            last_stable: newer.last_stable,
            overall_trend: Trend::between(self.mean_collapse_rate, newer.mean_collapse_rate),
            critical_collapse_time_sum: self.critical_collapse_time_sum + newer.critical_collapse_time_sum,
            critical_count: self.critical_count + newer.critical_count,
        }
    }

    /// Mean collapse time over experiments with at least one collapse
    pub fn mean_critical_collapse_time(&self) -> Option<f64> {
        (self.critical_count > 0).then(|| self.critical_collapse_time_sum / self.critical_count as f64)
    }

    /// One-line executive summary for prompts and reports
    pub fn executive_summary(&self) -> String {
        format!(
            "{} experiments, collapse {:.1}%–{:.1}% (mean {:.1}%), K {:.2}–{:.2}, {} stable, last state {}, trend {}",
            self.experiments,
            self.min_collapse_rate * 100.0,
            self.max_collapse_rate * 100.0,
            self.mean_collapse_rate * 100.0,
            self.k_min,
            self.k_max,
            self.stable_count,
            self.last_band,
            self.overall_trend,
        )
    }
}

fn fold_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn fold_max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry in the experiment log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    Experiment(ExperimentRecord),
    Compressed(CompressedSummary),
}

/// Ordered experiment log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentLog {
    entries: Vec<LogEntry>,
    compaction_threshold: usize,
    compactions: u32,
}

impl ExperimentLog {
    pub fn new(compaction_threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            compaction_threshold: compaction_threshold.max(1),
            compactions: 0,
        }
    }

    /// Append a record, compacting if the log grew past its threshold.
    /// Returns the new summary when a compaction happened.
    pub fn push(&mut self, record: ExperimentRecord) -> Option<&CompressedSummary> {
        self.entries.push(LogEntry::Experiment(record));
        if self.entries.len() > self.compaction_threshold {
            self.compact();
            return self.summary();
        }
        None
    }

    /// Replace the whole log by a single summary
    pub fn compact(&mut self) {
        if let Some(summary) = self.overall_summary() {
            self.entries = vec![LogEntry::Compressed(summary)];
            self.compactions += 1;
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Full records still held (i.e. since the last compaction)
    pub fn records(&self) -> impl Iterator<Item = &ExperimentRecord> {
        self.entries.iter().filter_map(|e| match e {
            LogEntry::Experiment(r) => Some(r),
            LogEntry::Compressed(_) => None,
        })
    }

    /// Summary left by the last compaction
    pub fn summary(&self) -> Option<&CompressedSummary> {
        self.entries.iter().find_map(|e| match e {
            LogEntry::Compressed(s) => Some(s),
            LogEntry::Experiment(_) => None,
        })
    }

    /// Digest of everything ever logged: previous summary ⊕ live records
    pub fn overall_summary(&self) -> Option<CompressedSummary> {
        let records: Vec<&ExperimentRecord> = self.records().collect();
        let fresh = CompressedSummary::from_records(&records);
        match (self.summary(), fresh) {
            (Some(old), Some(new)) => Some(old.merge(&new)),
            (Some(old), None) => Some(old.clone()),
            (None, fresh) => fresh,
        }
    }

    pub fn last_record(&self) -> Option<&ExperimentRecord> {
        self.records().last()
    }

    /// Experiments ever logged, including compacted ones
    pub fn total_experiments(&self) -> u32 {
        self.summary().map_or(0, |s| s.experiments) + self.records().count() as u32
    }

    pub fn is_compressed(&self) -> bool {
        self.summary().is_some()
    }

    pub fn compactions(&self) -> u32 {
        self.compactions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
