//! ═══════════════════════════════════════════════════════════════════════════════
//! ISO-ENTROPY CLI — Structural Fragility Audits
//! ═══════════════════════════════════════════════════════════════════════════════

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iso_entropy::display;
use iso_entropy::grounding::{ground_inputs, stock_from_months, DEFAULT_CAPITAL};
use iso_entropy::{
    apply_hard_rules, calculate_collapse_threshold, run_simulation, AuditConfig, AuditInputs, ExperimentOrchestrator,
    OracleProvider, Rigidity, Volatility,
};

#[derive(Parser)]
#[command(name = "iso-entropy")]
#[command(about = "Audit structural fragility with Monte Carlo entropy-debt experiments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logs on stderr (ISO_ENTROPY_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Fixed seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full adaptive audit
    Audit {
        /// Environmental volatility: Low, Medium, High
        #[arg(long)]
        volatility: Volatility,

        /// Structural rigidity: Low, Medium, High
        #[arg(long)]
        rigidity: Rigidity,

        /// Months of buffer stock (1-24)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=24))]
        buffer_months: u32,

        /// Free-text context passed to the oracle
        #[arg(short, long, default_value = "")]
        description: String,

        /// Oracle provider override: mock, gemini, anthropic
        #[arg(long)]
        provider: Option<OracleProvider>,

        /// Use the deterministic mock oracle
        #[arg(long, conflicts_with = "provider")]
        mock: bool,

        /// Iteration budget override
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Run one Monte Carlo experiment
    Simulate {
        /// External entropy I (bits)
        #[arg(long)]
        entropy: f64,

        /// Response capacity K (bits)
        #[arg(long)]
        capacity: f64,

        /// Collapse threshold θ_max; derived from stock/capital/liquidity when absent
        #[arg(long, conflicts_with_all = ["stock", "capital", "liquidity"])]
        theta: Option<f64>,

        /// Normalised buffer stock
        #[arg(long, default_value_t = stock_from_months(6))]
        stock: f64,

        /// Capital multiplier
        #[arg(long, default_value_t = DEFAULT_CAPITAL)]
        capital: f64,

        /// Operational liquidity in [0, 1]
        #[arg(long, default_value_t = 0.6)]
        liquidity: f64,

        /// Number of simulated trajectories
        #[arg(long)]
        runs: Option<u32>,
    },

    /// Show the physical state three answers ground to
    Ground {
        #[arg(long)]
        volatility: Volatility,

        #[arg(long)]
        rigidity: Rigidity,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=24))]
        buffer_months: u32,
    },

    /// Show/set configuration
    Config {
        /// Show current config
        #[arg(long)]
        show: bool,

        /// Set API key (saved to config file)
        #[arg(long)]
        set_key: Option<String>,

        /// Set oracle provider (saved to config file)
        #[arg(long)]
        set_provider: Option<OracleProvider>,

        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "iso_entropy=debug" } else { "iso_entropy=info" };
    let filter = EnvFilter::try_from_env("ISO_ENTROPY_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match AuditConfig::load() {
        Ok(config) => config,
        Err(e) => {
            display::warning(&format!("{}; using defaults", e));
            AuditConfig::default()
        }
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    match cli.command {
        Commands::Audit {
            volatility,
            rigidity,
            buffer_months,
            description,
            provider,
            mock,
            max_iterations,
        } => {
            if let Some(provider) = provider {
                config.oracle.provider = provider;
            }
            if mock {
                config.oracle.provider = OracleProvider::Mock;
            }
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            config.validate()?;

            let inputs = AuditInputs::new(volatility, rigidity, buffer_months).with_description(description);
            let mut orchestrator = ExperimentOrchestrator::new(config);
            let report = orchestrator.audit_system(&inputs)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                display::audit_report(&report);
            }
        }

        Commands::Simulate {
            entropy,
            capacity,
            theta,
            stock,
            capital,
            liquidity,
            runs,
        } => {
            let theta_max = match theta {
                Some(theta) => theta,
                None => calculate_collapse_threshold(stock, capital, liquidity)?,
            };
            let mut params = config.simulation_params();
            if let Some(runs) = runs {
                params = params.with_runs(runs);
            }
            let result = run_simulation(entropy, capacity, theta_max, &params)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                display::simulation(entropy, capacity, theta_max, &result, &config.stability);
            }
        }

        Commands::Ground {
            volatility,
            rigidity,
            buffer_months,
        } => {
            let grounded = ground_inputs(volatility, rigidity, buffer_months);
            let gated = apply_hard_rules(volatility, rigidity, grounded)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&gated)?);
            } else {
                display::physical_state("GROUNDED", &grounded);
                display::physical_state("GATED", &gated.state);
                display::constraints(&gated);
            }
        }

        Commands::Config {
            show,
            set_key,
            set_provider,
            save,
        } => {
            if show {
                if cli.json {
                    let mut redacted = config.clone();
                    redacted.oracle.api_key = redacted.oracle.api_key.map(|_| "***".to_string());
                    println!("{}", serde_json::to_string_pretty(&redacted)?);
                } else {
                    display::config(&config);
                }
            }

            let changed = save || set_key.is_some() || set_provider.is_some();
            if let Some(key) = set_key {
                config.oracle.api_key = Some(key);
            }
            if let Some(provider) = set_provider {
                config.oracle.provider = provider;
            }
            if changed {
                let path = config.save()?;
                println!("Configuration saved to {}", path.display());
            }
        }
    }

    Ok(())
}
