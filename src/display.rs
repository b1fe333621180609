//! ═══════════════════════════════════════════════════════════════════════════════
//! DISPLAY — Terminal Output Formatting
//! ═══════════════════════════════════════════════════════════════════════════════

use colored::*;

use crate::config::AuditConfig;
use crate::constraints::{ConstraintFlag, ConstraintReport};
use crate::experiment::{ExperimentLog, ExperimentRecord, LogEntry};
use crate::grounding::PhysicalState;
use crate::orchestrator::{AuditReport, Termination};
use crate::physics::SimulationResult;
use crate::stats::{StabilityBand, StabilityCriteria};
use crate::verdict::Verdict;

/// Display audit banner
pub fn banner(oracle: &str, mock: bool) {
    println!();
    println!("{}", "═".repeat(60).cyan());
    println!("{}", "  ISO-ENTROPY — Structural Fragility Audit".bright_white().bold());
    println!("{}", "═".repeat(60).cyan());
    println!(
        "{} {}{}",
        "Oracle:".bright_black(),
        oracle.white(),
        if mock { " (mock mode)".yellow().to_string() } else { String::new() }
    );
    println!();
}

/// Display grounded physical state
pub fn physical_state(title: &str, state: &PhysicalState) {
    println!("{}", format!("═══ {} ═══", title).cyan().bold());
    println!("  {:12} {:.2} bits", "Entropy I".white(), state.entropy);
    println!("  {:12} {:.2} bits", "Capacity K".white(), state.capacity);
    println!("  {:12} {:.2}", "Stock".white(), state.stock);
    println!("  {:12} {:.2}", "Liquidity".white(), state.liquidity);
    println!("  {:12} {:.2}", "Capital".white(), state.capital);
    println!("  {:12} {:.3} bits", "θ_max".white(), state.theta_max);
    ratio_bar("I/K", state.insolvency_ratio());
    println!();
}

/// Display gate adjustments and flags
pub fn constraints(report: &ConstraintReport) {
    if report.adjustments.is_empty() && report.flags.is_empty() {
        return;
    }
    for note in &report.adjustments {
        println!("  {} {}", "ADJUSTED:".yellow(), note);
    }
    for flag in &report.flags {
        let label = flag.as_str();
        if *flag == ConstraintFlag::CriticalStructuralWarning {
            println!("  {} {}", "⚠".red(), label.red().bold());
        } else {
            println!("  {} {}", "⚠".yellow(), label.yellow());
        }
    }
    println!();
}

/// I/K as a bar; full at 2.0
pub fn ratio_bar(name: &str, ratio: f64) {
    let bar_width: usize = 30;
    let fill = (ratio / 2.0).clamp(0.0, 1.0);
    let filled = (fill * bar_width as f64) as usize;

    let color = if ratio >= 2.0 {
        "red"
    } else if ratio >= 1.5 {
        "yellow"
    } else if ratio >= 1.0 {
        "bright_yellow"
    } else {
        "green"
    };

    let bar = format!(
        "[{}{}] {:5.2}",
        "█".repeat(filled).color(color),
        "░".repeat(bar_width.saturating_sub(filled)).bright_black(),
        ratio
    );

    println!("  {:12} {}", name.white(), bar);
}

/// One experiment row
pub fn experiment_row(record: &ExperimentRecord) {
    println!(
        "  {:>14} {:>9} K={:<5.2} rate={:>6.2}% UB95={:>6.2}% {}",
        record.cycle_id.bright_black(),
        record.label().white(),
        record.capacity(),
        record.collapse_rate() * 100.0,
        record.upper_ci95 * 100.0,
        band_label(record.band, record.stable)
    );
}

/// Experiment table, compressed summaries inline
pub fn experiment_table(log: &ExperimentLog) {
    println!("{}", "═══ EXPERIMENTS ═══".cyan().bold());
    for entry in log.entries() {
        match entry {
            LogEntry::Experiment(record) => experiment_row(record),
            LogEntry::Compressed(summary) => {
                println!("  {} {}", "[compressed]".bright_black(), summary.executive_summary().bright_black());
            }
        }
    }
    println!();
}

/// Single simulation result
pub fn simulation(entropy: f64, capacity: f64, theta_max: f64, result: &SimulationResult, criteria: &StabilityCriteria) {
    let upper = criteria.upper_bound(result.collapses, result.runs);
    let stable = criteria.is_statistically_stable(result.collapse_rate, upper);

    println!("{}", "═══ SIMULATION ═══".cyan().bold());
    println!("  {:12} I={:.2} K={:.2} θ={:.3}", "Hypothesis".white(), entropy, capacity, theta_max);
    println!("  {:12} {}/{} ({:.2}%)", "Collapses".white(), result.collapses, result.runs, result.collapse_rate * 100.0);
    println!("  {:12} {:.2}%", "UB95".white(), upper * 100.0);
    if let Some(week) = result.mean_collapse_time {
        println!("  {:12} week {:.1}", "Mean collapse".white(), week);
    }
    println!("  {:12} {:.3} bits", "Residual debt".white(), result.avg_residual_debt);
    println!("  {:12} {}", "Band".white(), band_label(criteria.band(result.collapse_rate), stable));
    println!();
}

/// Final verdict block
pub fn verdict(report: &AuditReport) {
    let color = verdict_color(report.verdict);
    println!("{}", "═══ VERDICT ═══".cyan().bold());
    println!("  {}", report.verdict.to_string().color(color).bold());
    for reason in &report.verdict_reasons {
        println!("    {}", reason.white());
    }
    println!();

    match report.k_min_viable {
        Some(k) => println!(
            "  {:14} {:.2} bits (margin {:.2}, {} replicas)",
            "K_min viable".white(),
            k,
            report.margin.unwrap_or(k - report.constraints.state.entropy),
            report.replicas_confirmed
        ),
        None => println!("  {:14} {}", "K_min viable".white(), "none found".red()),
    }
    println!("  {:14} {:.2}%", "Max collapse".white(), report.max_collapse_rate * 100.0);
    if let Some(t) = report.mean_critical_collapse_time {
        println!("  {:14} week {:.1}", "Mean collapse".white(), t);
    }
    println!(
        "  {:14} {} after {} iterations ({})",
        "Phase".white(),
        report.final_phase,
        report.iterations,
        termination_label(&report.termination)
    );
    println!("  {:14} {}", "Experiments".white(), report.total_experiments());
    if !report.mock_mode {
        println!(
            "  {:14} {} hits / {} misses",
            "Oracle cache".white(),
            report.cache_hits,
            report.cache_misses
        );
    }
    if report.oracle_degraded {
        warning("oracle failed during the audit, later decisions came from the mock");
    }
    if let Some(text) = &report.oracle_report {
        println!();
        println!("{}", "Oracle report:".blue().bold());
        println!("{}", text);
    }
    println!();
}

/// Full human-readable audit
pub fn audit_report(report: &AuditReport) {
    banner(&report.oracle, report.mock_mode);
    physical_state("GROUNDED", &report.constraints.state);
    constraints(&report.constraints);
    experiment_table(&report.log);
    verdict(report);
}

/// Current configuration
pub fn config(config: &AuditConfig) {
    println!("{}", "═══ CONFIGURATION ═══".cyan().bold());
    println!("  Provider: {}", config.oracle.provider);
    println!("  Model: {}", config.oracle.model_name());
    println!(
        "  API key: {}",
        if config.oracle.has_api_key() { "configured".green() } else { "NOT SET (mock mode)".yellow() }
    );
    println!(
        "  Rate limit: {} per {}s, {}s spacing",
        config.oracle.requests_per_window, config.oracle.window_secs, config.oracle.min_interval_secs
    );
    println!();
    println!("  Max iterations: {}", config.max_iterations);
    println!("  Runs: {} (replicas {})", config.runs, config.replica_runs);
    println!("  Horizon: {} weeks, α={}", config.time_steps, config.dissipation_alpha);
    println!("  K window: [{}, {}], step ±{}", config.k_floor, config.k_ceiling, config.max_k_step);
    println!(
        "  Stability: rate < {:.0}% and UB95 < {:.0}%, marginal < {:.0}%",
        config.stability.stable_threshold * 100.0,
        config.stability.stable_threshold * 100.0,
        config.stability.marginal_threshold * 100.0
    );
    match config.seed {
        Some(seed) => println!("  Seed: {}", seed),
        None => println!("  Seed: random"),
    }
    println!();
    println!("Config file: {}", AuditConfig::config_path().display());
}

/// Display warning message
pub fn warning(message: &str) {
    println!();
    println!("{} {}", "WARNING:".yellow().bold(), message.yellow());
}

/// Display error
pub fn error(message: &str) {
    println!();
    println!("{} {}", "ERROR:".red().bold(), message.red());
}

fn band_label(band: StabilityBand, stable: bool) -> ColoredString {
    match band {
        StabilityBand::Stable if stable => "STABLE".green(),
        StabilityBand::Stable => "STABLE?".bright_green(),
        StabilityBand::Marginal => "MARGINAL".yellow(),
        StabilityBand::Collapse => "COLLAPSE".red(),
    }
}

fn termination_label(termination: &Termination) -> String {
    match termination {
        Termination::Concluded => "concluded".to_string(),
        Termination::ForcedConclusion => "forced conclusion".to_string(),
        Termination::Terminated { reasoning } => format!("terminated: {}", reasoning),
        Termination::Reported => "oracle reported".to_string(),
        Termination::UnrecognizedAction { action } => format!("unrecognized action {}", action),
        Termination::MaxIterations => "iteration budget spent".to_string(),
    }
}

/// Get color for verdict
fn verdict_color(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Robust => "green",
        Verdict::Marginal => "yellow",
        Verdict::Fragile => "red",
    }
}
