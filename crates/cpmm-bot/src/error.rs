//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Drizzle error: {0}")]
    Drizzle(#[from] cpmm_drizzle::DrizzleError),

    #[error("Store error: {0}")]
    Store(#[from] cpmm_store::StoreError),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
