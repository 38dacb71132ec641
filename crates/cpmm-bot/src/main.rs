//! CPMM subsidy drizzle daemon - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

/// Moves market subsidy into CPMM pools on a schedule.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DRIZZLE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Seed for the draw generator (overrides config)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    cpmm_telemetry::init_logging()?;

    info!("Starting cpmm-bot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            cpmm_bot::AppConfig::from_file(&path)?
        }
        None => cpmm_bot::AppConfig::load()?,
    };
    if args.seed.is_some() {
        config.drizzle.seed = args.seed;
    }
    info!(
        snapshot = %config.store.snapshot_path.display(),
        interval_secs = config.drizzle.interval_secs,
        "Configuration loaded"
    );

    let app = cpmm_bot::Application::new(config)?;

    if args.once {
        let report = app.run_once().await?;
        info!(%report, "Single cycle complete");
    } else {
        app.run().await?;
    }

    debug!(metrics = %cpmm_telemetry::Metrics::gather_text()?, "Final metrics");

    Ok(())
}
