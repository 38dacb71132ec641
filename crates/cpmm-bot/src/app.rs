//! Main application.
//!
//! Owns the store, the drizzle scheduler and the shutdown token. Market data
//! is loaded from a JSON snapshot at startup and written back after every
//! cycle so the next run picks up where this one stopped.

use crate::config::AppConfig;
use crate::error::AppResult;
use cpmm_drizzle::{CycleReport, DrizzleScheduler, Drizzler, SeededDraw};
use cpmm_store::{MemoryStore, Snapshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drizzle daemon.
pub struct Application {
    config: AppConfig,
    store: MemoryStore,
    scheduler: DrizzleScheduler<MemoryStore, SeededDraw>,
    shutdown: CancellationToken,
}

impl Application {
    /// Load market data and build the drizzler.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let path = &config.store.snapshot_path;
        let store = if path.exists() {
            MemoryStore::from_snapshot(Snapshot::load(path)?)
        } else {
            warn!(path = %path.display(), "Snapshot not found, starting with an empty store");
            MemoryStore::new()
        };

        if let Some(seed) = config.drizzle.seed {
            info!(seed, "Using seeded draws");
        }
        let draw = SeededDraw::from_config(config.drizzle.seed);
        let drizzler = Drizzler::new(store.clone(), draw, config.drizzle.clone())?;

        Ok(Self {
            config,
            store,
            scheduler: DrizzleScheduler::new(drizzler),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Token that stops the schedule when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run a single cycle and persist the result.
    pub async fn run_once(&self) -> AppResult<CycleReport> {
        let report = self
            .scheduler
            .drizzler()
            .run_drizzle_cycle(&self.shutdown)
            .await?;
        self.persist()?;
        Ok(report)
    }

    /// Run the schedule until ctrl-c or the shutdown token fires.
    pub async fn run(&self) -> AppResult<()> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            shutdown.cancel();
        });

        self.scheduler
            .run(&self.shutdown, |report| {
                info!(cycle_id = %report.cycle_id, %report, "Cycle finished");
                if let Err(e) = self.persist() {
                    error!(error = %e, "Failed to save snapshot");
                }
            })
            .await;

        signal_task.abort();
        info!("Application stopped");
        Ok(())
    }

    fn persist(&self) -> AppResult<()> {
        if self.config.store.read_only {
            return Ok(());
        }
        self.store.snapshot().save(&self.config.store.snapshot_path)?;
        Ok(())
    }
}
