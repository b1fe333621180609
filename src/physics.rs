//! ═══════════════════════════════════════════════════════════════════════════════
//! PHYSICS — Monte Carlo Entropy-Debt Simulation
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Each trial walks `time_steps` weeks. Every week draws
//!
//!   input_entropy     ~ N(I, 0.40·I)   floored at 0.01
//!   response_capacity ~ N(K, 0.08·K)   floored at 0.01
//!
//! and updates the entropy debt:
//!
//!   ratio        = input / response
//!   accumulation = (input − response)·(1 + √(ratio − 1))   if ratio > 1, else 0
//!   dissipation  = α·max(0, response − input)
//!   debt         = max(0, debt + accumulation − dissipation)
//!
//! The √ term makes damage super-linear in the insolvency ratio. A trial
//! collapses the first week debt ≥ θmax and stops there.
//!
//! Trials are independent and run on the rayon pool. Each trial seeds its own
//! RNG from (seed, trial index), so a seeded batch gives the same result on
//! any number of threads.
//! ═══════════════════════════════════════════════════════════════════════════════

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, IsoError, IsoResult};

/// Lower bound applied to every stochastic draw
pub const DRAW_FLOOR: f64 = 0.01;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLAPSE THRESHOLD
// ═══════════════════════════════════════════════════════════════════════════════

/// θmax = log₂(1+stock) + log₂(1+capital) + log₂(1+liquidity)
///
/// Maximum absorbable entropy debt in bits. Fails on negative or
/// non-finite ratios.
pub fn calculate_collapse_threshold(stock: f64, capital: f64, liquidity: f64) -> IsoResult<f64> {
    ensure_non_negative("stock", stock)?;
    ensure_non_negative("capital", capital)?;
    ensure_non_negative("liquidity", liquidity)?;
    Ok(threshold_for(stock, capital, liquidity))
}

/// Unchecked θmax for values already known to be valid
pub(crate) fn threshold_for(stock: f64, capital: f64, liquidity: f64) -> f64 {
    (1.0 + stock.max(0.0)).log2() + (1.0 + capital.max(0.0)).log2() + (1.0 + liquidity.max(0.0)).log2()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Knobs for one Monte Carlo batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Independent trials
    pub runs: u32,
    /// Weeks per trial
    pub time_steps: u32,
    /// Debt dissipation rate when K > I
    pub alpha: f64,
    /// Relative standard deviation of the entropy draw
    pub entropy_volatility: f64,
    /// Relative standard deviation of the capacity draw
    pub capacity_volatility: f64,
    /// Fixed seed for reproducible batches
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            runs: 500,
            time_steps: 52,
            alpha: 0.15,
            entropy_volatility: 0.4,
            capacity_volatility: 0.08,
            seed: None,
        }
    }
}

impl SimulationParams {
    pub fn with_runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Aggregate outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// collapses / runs
    pub collapse_rate: f64,
    pub collapses: u32,
    pub runs: u32,
    /// Mean collapse week over collapsed trials; None when none collapsed
    pub mean_collapse_time: Option<f64>,
    /// Mean of per-trial average I/K ratio
    pub avg_insolvency: f64,
    /// Mean terminal debt over all trials
    pub avg_residual_debt: f64,
}

impl SimulationResult {
    pub fn any_collapse(&self) -> bool {
        self.collapses > 0
    }

    /// Mean collapse week, ∞ when nothing collapsed
    pub fn avg_collapse_time(&self) -> f64 {
        self.mean_collapse_time.unwrap_or(f64::INFINITY)
    }
}

/// What a single trial left behind
#[derive(Debug, Clone, Copy)]
struct TrialOutcome {
    collapse_step: Option<u32>,
    terminal_debt: f64,
    mean_ratio: Option<f64>,
}

/// Net change in entropy debt for one week
pub fn debt_increment(input_entropy: f64, response_capacity: f64, alpha: f64) -> f64 {
    let ratio = input_entropy / response_capacity;
    let accumulation = if ratio > 1.0 {
        (input_entropy - response_capacity) * (1.0 + (ratio - 1.0).sqrt())
    } else {
        0.0
    };
    let dissipation = alpha * (response_capacity - input_entropy).max(0.0);
    accumulation - dissipation
}

/// Run a batch of entropy-debt trials for (I, K, θmax)
pub fn run_simulation(
    entropy: f64,
    capacity: f64,
    theta_max: f64,
    params: &SimulationParams,
) -> IsoResult<SimulationResult> {
    ensure_non_negative("entropy", entropy)?;
    ensure_non_negative("capacity", capacity)?;
    ensure_non_negative("theta_max", theta_max)?;
    ensure_non_negative("alpha", params.alpha)?;
    ensure_non_negative("entropy_volatility", params.entropy_volatility)?;
    ensure_non_negative("capacity_volatility", params.capacity_volatility)?;

    let entropy_dist = Normal::new(entropy, entropy * params.entropy_volatility)
        .map_err(|e| IsoError::invalid_input("entropy", e.to_string()))?;
    let capacity_dist = Normal::new(capacity, capacity * params.capacity_volatility)
        .map_err(|e| IsoError::invalid_input("capacity", e.to_string()))?;

    let base_seed = params.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let time_steps = params.time_steps;
    let alpha = params.alpha;

    let outcomes: Vec<TrialOutcome> = (0..params.runs)
        .into_par_iter()
        .map(|trial| {
            let mut rng = StdRng::seed_from_u64(trial_seed(base_seed, trial));
            simulate_trial(&mut rng, entropy_dist, capacity_dist, theta_max, alpha, time_steps)
        })
        .collect();

    Ok(aggregate(&outcomes, params.runs, entropy, capacity))
}

fn simulate_trial<R: Rng>(
    rng: &mut R,
    entropy_dist: Normal<f64>,
    capacity_dist: Normal<f64>,
    theta_max: f64,
    alpha: f64,
    time_steps: u32,
) -> TrialOutcome {
    let mut debt = 0.0;
    let mut ratio_sum = 0.0;

    for t in 1..=time_steps {
        let input = entropy_dist.sample(rng).max(DRAW_FLOOR);
        let response = capacity_dist.sample(rng).max(DRAW_FLOOR);
        ratio_sum += input / response;

        debt = (debt + debt_increment(input, response, alpha)).max(0.0);

        if debt >= theta_max {
            return TrialOutcome {
                collapse_step: Some(t),
                terminal_debt: debt,
                mean_ratio: Some(ratio_sum / t as f64),
            };
        }
    }

    TrialOutcome {
        collapse_step: None,
        terminal_debt: debt,
        mean_ratio: (time_steps > 0).then(|| ratio_sum / time_steps as f64),
    }
}

fn aggregate(outcomes: &[TrialOutcome], runs: u32, entropy: f64, capacity: f64) -> SimulationResult {
    let collapse_steps: Vec<f64> = outcomes
        .iter()
        .filter_map(|o| o.collapse_step.map(|t| t as f64))
        .collect();
    let ratios: Vec<f64> = outcomes.iter().filter_map(|o| o.mean_ratio).collect();
    let collapses = collapse_steps.len() as u32;

    let collapse_rate = if runs > 0 {
        collapses as f64 / runs as f64
    } else {
        0.0
    };

    let avg_insolvency = mean(&ratios).unwrap_or(if capacity > 0.0 {
        entropy / capacity
    } else {
        f64::INFINITY
    });

    let debts: Vec<f64> = outcomes.iter().map(|o| o.terminal_debt).collect();

    SimulationResult {
        collapse_rate,
        collapses,
        runs,
        mean_collapse_time: mean(&collapse_steps),
        avg_insolvency,
        avg_residual_debt: mean(&debts).unwrap_or(0.0),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// SplitMix64 over (seed, trial) so neighbouring trials get unrelated streams
fn trial_seed(base: u64, trial: u32) -> u64 {
    let mut z = base ^ (trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
