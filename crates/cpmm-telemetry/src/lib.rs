//! Prometheus metrics and structured logging for the drizzle job.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus counters for applied, skipped and failed drizzles

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, LogFormat};
pub use metrics::Metrics;
