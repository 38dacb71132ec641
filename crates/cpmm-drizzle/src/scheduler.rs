//! Periodic drizzle loop.

use crate::cycle::{CycleReport, Drizzler};
use crate::draw::DrawSource;
use cpmm_store::PoolStore;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs a drizzle cycle every `interval` until shut down.
///
/// Cycles never overlap: a cycle that outlives the interval swallows the
/// missed ticks instead of queueing them.
pub struct DrizzleScheduler<S, D> {
    drizzler: Drizzler<S, D>,
    interval: Duration,
}

impl<S, D> DrizzleScheduler<S, D>
where
    S: PoolStore,
    D: DrawSource,
{
    /// Scheduler using the drizzler's configured interval.
    pub fn new(drizzler: Drizzler<S, D>) -> Self {
        let interval = drizzler.config().interval();
        Self { drizzler, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn drizzler(&self) -> &Drizzler<S, D> {
        &self.drizzler
    }

    /// Loop until `shutdown` is cancelled. The first cycle starts immediately.
    ///
    /// `on_cycle` sees every completed report, e.g. to persist state.
    pub async fn run<F>(&self, shutdown: &CancellationToken, mut on_cycle: F)
    where
        F: FnMut(&CycleReport),
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs_f64(), "Drizzle scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.drizzler.run_drizzle_cycle(shutdown).await {
                Ok(report) => on_cycle(&report),
                Err(e) => error!(error = %e, "Drizzle cycle failed"),
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        info!("Drizzle scheduler stopped");
    }
}
