//! shardd — the shardgrid daemon.
//!
//! Loads `shardd.toml`, connects the stream and metrics gateways once, and
//! drives the shard count of a single stream until Ctrl-C:
//! - Partition model (lineage + tiling checks)
//! - Capacity estimator
//! - Scaling decision engine
//! - Action executor
//!
//! # Usage
//!
//! ```text
//! shardd init --stream events --output shardd.toml
//! shardd simulate --config shardd.toml --fixture stream.json
//! shardd plan --config shardd.toml --fixture stream.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use shard_core::ShardConfig;
use shardgrid_autoscale::ControlLoop;
use shardgrid_gateway::memory::SimOptions;
use shardgrid_gateway::{SimulatedMetrics, SimulatedStream, StreamFixture};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardd", about = "shardgrid shard autoscaler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a shardd.toml with every default spelled out.
    Init {
        /// Stream to manage.
        #[arg(long)]
        stream: String,

        #[arg(long)]
        region: Option<String>,

        /// Write here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the control loop against a simulated stream until Ctrl-C.
    Simulate {
        #[command(flatten)]
        target: Target,

        /// Log actions instead of issuing them.
        #[arg(long)]
        dry_run: bool,

        /// Override the check interval, in seconds.
        #[arg(long)]
        interval: Option<u64>,

        /// Describes that still return the old shards after a request.
        #[arg(long, default_value = "1")]
        visibility_lag: u32,
    },

    /// Refresh and decide once, print the plan as JSON, and exit.
    Plan {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Path to shardd.toml.
    #[arg(long, default_value = "shardd.toml")]
    config: PathBuf,

    /// JSON fixture describing the simulated stream.
    #[arg(long)]
    fixture: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init {
            stream,
            region,
            output,
        } => init(&stream, region.as_deref(), output.as_deref()),
        Command::Simulate {
            target,
            dry_run,
            interval,
            visibility_lag,
        } => {
            let mut config = load_config(&target.config)?;
            if dry_run {
                config.controller.dry_run = true;
            }
            if let Some(secs) = interval {
                config.controller.check_interval_secs = secs;
            }
            config.validate()?;
            init_tracing(&config.logging.level)?;

            let options = SimOptions {
                visibility_lag,
                ..SimOptions::default()
            };
            simulate(config, &target.fixture, options).await
        }
        Command::Plan { target } => {
            let config = load_config(&target.config)?;
            init_tracing(&config.logging.level)?;
            plan(config, &target.fixture).await
        }
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so `plan`
/// output stays machine-readable.
fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid [logging] level {default_level:?}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ShardConfig> {
    ShardConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn connect(
    config: &ShardConfig,
    fixture_path: &Path,
    options: SimOptions,
) -> anyhow::Result<(SimulatedStream, SimulatedMetrics)> {
    let fixture = StreamFixture::from_file(fixture_path)
        .with_context(|| format!("loading fixture {}", fixture_path.display()))?;
    let stream = SimulatedStream::connect_with(&config.stream.name, &fixture, options)
        .with_context(|| format!("connecting to stream {}", config.stream.name))?;
    let metrics = SimulatedMetrics::from_fixture(&fixture);
    Ok((stream, metrics))
}

fn init(stream: &str, region: Option<&str>, output: Option<&Path>) -> anyhow::Result<()> {
    let config = ShardConfig::scaffold(stream, region);
    config.validate()?;
    let rendered = config.to_toml_string()?;

    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}

async fn simulate(config: ShardConfig, fixture: &Path, options: SimOptions) -> anyhow::Result<()> {
    info!(
        stream = %config.stream.name,
        region = ?config.stream.region,
        fixture = %fixture.display(),
        "shardd starting in simulate mode"
    );

    let (stream, metrics) = connect(&config, fixture, options)?;
    let mut control = ControlLoop::new(&config, stream, metrics);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    control.run(shutdown_rx).await?;

    info!("shardd stopped");
    Ok(())
}

async fn plan(config: ShardConfig, fixture: &Path) -> anyhow::Result<()> {
    let (stream, metrics) = connect(&config, fixture, SimOptions::default())?;
    let mut control = ControlLoop::new(&config, stream, metrics);

    let report = control.plan().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
