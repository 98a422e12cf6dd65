mod script;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tandem_core::text::DiffGranularity;
use tandem_core::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use script::{replay, ReplayOptions, Script};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Granularity {
    Line,
    Char,
}

impl From<Granularity> for DiffGranularity {
    fn from(g: Granularity) -> Self {
        match g {
            Granularity::Line => DiffGranularity::Line,
            Granularity::Char => DiffGranularity::Char,
        }
    }
}

#[derive(Parser)]
#[command(name = "tandem-replay")]
#[command(about = "Replay an editing-session script and print the resulting snapshots")]
struct Cli {
    /// JSON script to replay.
    script: PathBuf,

    /// Engine config file. Defaults to $TANDEM_ROOT/.tandem/config.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured diff granularity.
    #[arg(short, long, value_enum)]
    granularity: Option<Granularity>,

    /// Record failing steps in the report instead of stopping.
    #[arg(long)]
    keep_going: bool,

    /// Milliseconds to wait for the session to settle before reporting.
    #[arg(long, default_value = "1000")]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path).await,
        None => EngineConfig::load().await,
    }
    .context("Failed to load engine config")?;
    if let Some(granularity) = cli.granularity {
        config.diff_granularity = granularity.into();
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("=== Tandem Replay [crate: tandem-replay] ===");
    info!("Diff granularity: {:?}", config.diff_granularity);

    let raw = tokio::fs::read_to_string(&cli.script)
        .await
        .with_context(|| format!("Failed to read script {:?}", cli.script))?;
    let script: Script = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse script {:?}", cli.script))?;

    let options = ReplayOptions {
        keep_going: cli.keep_going,
        settle: Duration::from_millis(cli.settle_ms),
    };
    let report = replay(script, config, options).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
