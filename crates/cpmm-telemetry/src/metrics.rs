//! Prometheus metrics for the drizzle job.
//!
//! Labels:
//! - `unit`: `market` or `answer`
//! - `reason`: skip or failure classification
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means a duplicate metric name, which should crash at startup rather than
//! silently drop observations.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge_vec, CounterVec, Encoder,
    Histogram, IntGaugeVec, TextEncoder,
};

/// Drizzles committed.
pub static DRIZZLE_APPLIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cpmm_drizzle_applied_total",
        "Total subsidy drizzles committed",
        &["unit"]
    )
    .unwrap()
});

/// Drizzles that ended without a write (dust, no answers).
pub static DRIZZLE_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cpmm_drizzle_skipped_total",
        "Total subsidy drizzles skipped without a write",
        &["unit", "reason"]
    )
    .unwrap()
});

/// Drizzles aborted (not found, overflow, conflict, store failure).
pub static DRIZZLE_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cpmm_drizzle_failed_total",
        "Total subsidy drizzles aborted",
        &["unit", "reason"]
    )
    .unwrap()
});

/// Subsidy moved into trading pools.
pub static DRIZZLE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cpmm_drizzle_amount_total",
        "Total subsidy moved into trading pools",
        &["unit"]
    )
    .unwrap()
});

/// Candidates found by the last discovery pass.
pub static DRIZZLE_CANDIDATES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "cpmm_drizzle_candidates",
        "Markets or answers holding subsidy above the dust threshold",
        &["unit"]
    )
    .unwrap()
});

/// Wall time of a full drizzle cycle.
pub static DRIZZLE_CYCLE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cpmm_drizzle_cycle_duration_seconds",
        "Duration of a drizzle cycle in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 540.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a committed drizzle and the amount it moved.
    pub fn drizzle_applied(unit: &str, amount: f64) {
        DRIZZLE_APPLIED_TOTAL.with_label_values(&[unit]).inc();
        DRIZZLE_AMOUNT_TOTAL.with_label_values(&[unit]).inc_by(amount);
    }

    /// Record a drizzle that ended without a write.
    pub fn drizzle_skipped(unit: &str, reason: &str) {
        DRIZZLE_SKIPPED_TOTAL
            .with_label_values(&[unit, reason])
            .inc();
    }

    /// Record an aborted drizzle.
    pub fn drizzle_failed(unit: &str, reason: &str) {
        DRIZZLE_FAILED_TOTAL
            .with_label_values(&[unit, reason])
            .inc();
    }

    /// Update the candidate count from discovery.
    pub fn candidates(unit: &str, count: usize) {
        DRIZZLE_CANDIDATES
            .with_label_values(&[unit])
            .set(count as i64);
    }

    /// Record cycle duration.
    pub fn cycle_duration(seconds: f64) {
        DRIZZLE_CYCLE_DURATION_SECONDS.observe(seconds);
    }

    /// Render all registered metrics in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
