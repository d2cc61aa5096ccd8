//! PCE Token CLI
//!
//! Replays scenario files against the token engine and projects the
//! decay schedule.

mod scenario;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pce_core::clock::next_wednesday_after;
use pce_core::{EngineConfig, FactorEngine, SCALE};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::scenario::{format_time, parse_time, Scenario};

/// PCE Token - decaying base token with community exchange pools
#[derive(Parser)]
#[command(name = "pce")]
#[command(author = "PEACE COIN Developers")]
#[command(version)]
#[command(about = "PCE token engine tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "PCE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print a JSON report
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project the global factor over the coming weeks
    Factor {
        /// Number of weeks to project
        #[arg(short, long, default_value = "12")]
        weeks: u32,

        /// Projection start (RFC 3339)
        #[arg(short, long, default_value = "2024-01-03T00:00:00Z")]
        start: String,
    },

    /// Print the default configuration
    Config,

    /// Validate a configuration file
    Check {
        /// Configuration file (TOML)
        path: PathBuf,
    },
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    // Logs go to stderr so reports on stdout stay machine-readable
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_scenario(config: EngineConfig, path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let scenario = Scenario::load(path)?;
    let report = scenario.run(config)?;
    let json = serde_json::to_string_pretty(&report)?;

    match output {
        Some(out) => {
            std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), "report written");
        }
        None => println!("{json}"),
    }

    let mismatched: Vec<usize> = report
        .steps
        .iter()
        .filter(|s| !s.as_expected)
        .map(|s| s.index)
        .collect();
    if !mismatched.is_empty() {
        bail!("scenario '{}': steps {:?} did not match expectations", report.scenario, mismatched);
    }
    Ok(())
}

fn project_factor(config: EngineConfig, start: &str, weeks: u32) -> anyhow::Result<()> {
    let start = parse_time(start)?;
    let engine = FactorEngine::new(config.factor, start)?;
    let scale = SCALE as f64;

    println!();
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║                  PCE FACTOR PROJECTION                    ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("  {:<28} {:>26} {:>8}", "Boundary", "Factor", "Ratio");
    println!("  {}", "─".repeat(64));

    let mut at = start;
    for week in 0..=weeks {
        if week > 0 {
            at = next_wednesday_after(at);
        }
        let factor = engine.current_factor(at)?;
        println!("  {:<28} {:>26} {:>8.4}", format_time(at), factor, factor as f64 / scale);
    }
    println!();
    println!(
        "  Decay interval: {} days, compounding: {:?}",
        engine.schedule().interval_days,
        engine.schedule().compounding
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { scenario, output } => {
            let config = load_config(cli.config.as_deref())?;
            run_scenario(config, &scenario, output.as_deref())?;
        }

        Commands::Factor { weeks, start } => {
            let config = load_config(cli.config.as_deref())?;
            project_factor(config, &start, weeks)?;
        }

        Commands::Config => {
            print!("{}", EngineConfig::default().to_toml_string()?);
        }

        Commands::Check { path } => {
            let config = load_config(Some(&path))?;
            println!("✓ {} is valid", path.display());
            println!("  Token:     {} ({})", config.token.name, config.token.symbol);
            println!("  Chain ID:  {}", config.token.chain_id);
            println!("  Contract:  {}", config.token.contract_address);
            println!(
                "  Decay:     {}/{} every {} days",
                config.factor.decrease_rate,
                config.factor.decrease_rate_base,
                config.factor.interval_days
            );
        }
    }

    Ok(())
}
