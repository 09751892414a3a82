//! ticketflowd: drive the throughput probing controller from the command line.
//!
//! # Usage
//!
//! ```text
//! ticketflowd simulate --workload peak --peak 40 --cycles 200
//! ticketflowd simulate --workload decreasing --noise 0.02 --output json
//! ticketflowd check-config ticketflow.toml
//! ```

use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ticketflow_probe::{ProbingConfig, render_prometheus};

mod workload;

use workload::{Objective, Shape, SimulationOptions};

const DEFAULT_LOG_FILTER: &str = "info,ticketflow=debug";

#[derive(Parser)]
#[command(
    name = "ticketflowd",
    about = "Adaptive admission concurrency for ticket pools",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller against a synthetic workload on a simulated clock.
    Simulate {
        /// Probing config file. Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How throughput responds to concurrency.
        #[arg(short, long, value_enum, default_value = "peak")]
        workload: Shape,

        /// Concurrency of maximum throughput for the peak workload.
        #[arg(long, default_value = "40")]
        peak: u32,

        /// Number of controller cycles to simulate.
        #[arg(long, default_value = "200")]
        cycles: u32,

        /// Initial ticket count of both pools.
        #[arg(long, default_value = "20")]
        start_concurrency: u32,

        /// Relative throughput noise, in [0, 1).
        #[arg(long, default_value = "0")]
        noise: f64,

        /// Seed for the noise generator.
        #[arg(long, default_value = "2685821657736338717")]
        seed: u64,

        /// Fail context acquisition every N cycles.
        #[arg(long)]
        fail_every: Option<NonZeroU32>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Load and validate a probing config file, then print it normalized.
    CheckConfig {
        /// Path to the config file.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Simulate {
            config,
            workload,
            peak,
            cycles,
            start_concurrency,
            noise,
            seed,
            fail_every,
            output,
        } => {
            let config = load_config(config)?;
            let opts = SimulationOptions {
                objective: Objective {
                    shape: workload,
                    peak,
                },
                cycles,
                start_concurrency,
                noise,
                fail_every,
                seed,
            };
            simulate(config, &opts, output)
        }
        Command::CheckConfig { path } => check_config(path),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ProbingConfig> {
    match path {
        Some(path) => {
            let config = ProbingConfig::from_file(&path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(ProbingConfig::default()),
    }
}

fn simulate(
    config: ProbingConfig,
    opts: &SimulationOptions,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let report = workload::run_simulation(config, opts)?;

    match output {
        OutputFormat::Text => print!("{}", workload::format_report(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Prometheus => print!("{}", render_prometheus(&report.stats)),
    }
    Ok(())
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = ProbingConfig::from_file(&path)?;
    println!("# {} is valid", path.display());
    print!("{}", config.to_toml_string()?);
    Ok(())
}
