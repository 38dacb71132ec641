//! Drizzle error types.

use cpmm_core::CoreError;
use cpmm_store::StoreError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrizzleError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Engine error: {0}")]
    Engine(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DrizzleError {
    pub(crate) fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        DrizzleError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Injection rejected because the engine produced a non-finite or
    /// out-of-range result. The subsidy stays put for the next cycle.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, DrizzleError::Engine(e) if e.is_overflow())
    }

    /// A caller-level retry against fresh state may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DrizzleError::Store(e) if e.is_retryable())
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DrizzleError::NotFound { .. } => "not_found",
            DrizzleError::Engine(e) if e.is_overflow() => "overflow",
            DrizzleError::Engine(_) => "invalid_state",
            DrizzleError::Store(StoreError::Conflict { .. }) => "conflict",
            DrizzleError::Store(StoreError::NotFound { .. }) => "not_found",
            DrizzleError::Store(_) => "store",
            DrizzleError::InvalidConfig(_) => "config",
        }
    }
}

pub type DrizzleResult<T> = Result<T, DrizzleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        let overflow = DrizzleError::from(CoreError::Overflow("skew NaN".to_string()));
        assert!(overflow.is_overflow());
        assert_eq!(overflow.reason(), "overflow");

        let conflict = DrizzleError::from(StoreError::Conflict {
            row: "market m1".to_string(),
        });
        assert!(conflict.is_retryable());
        assert_eq!(conflict.reason(), "conflict");

        let missing = DrizzleError::not_found("market", "m1");
        assert!(!missing.is_retryable());
        assert_eq!(missing.reason(), "not_found");
        assert_eq!(missing.to_string(), "market not found: m1");
    }
}
