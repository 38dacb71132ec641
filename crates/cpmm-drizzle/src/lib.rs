//! Subsidy drizzling for CPMM markets.
//!
//! Markets and answers accumulate a subsidy balance that is not yet part of
//! any trading pool. Every few minutes the job moves a random fraction of
//! each balance into the pool, deepening liquidity without moving prices.
//!
//! - [`Drizzler`]: one cycle over all candidates, bounded concurrency
//! - [`DrizzleScheduler`]: periodic loop with graceful shutdown
//! - [`DrawSource`]: injectable randomness (seeded or fixed)

pub mod config;
pub mod cycle;
pub mod draw;
pub mod error;
pub mod scheduler;

pub use config::DrizzleConfig;
pub use cycle::{CycleReport, DrizzleOutcome, Drizzler, SkipReason, Unit};
pub use draw::{DrawSource, FixedDraw, SeededDraw};
pub use error::{DrizzleError, DrizzleResult};
pub use scheduler::DrizzleScheduler;
