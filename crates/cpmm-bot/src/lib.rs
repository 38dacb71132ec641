//! CPMM subsidy drizzle daemon.
//!
//! Loads market data, then drizzles subsidy into pools every few minutes
//! until stopped.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
