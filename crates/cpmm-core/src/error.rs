//! Error types for cpmm-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid pool: {0}")]
    InvalidPool(String),

    #[error("Invalid skew parameter: {0}")]
    InvalidSkew(f64),

    #[error("Invalid liquidity amount: {0}")]
    InvalidAmount(f64),

    #[error("Probability out of range: {0}")]
    ProbabilityOutOfRange(f64),

    #[error("Liquidity injection rejected due to overflow error: {0}")]
    Overflow(String),

    #[error("Liquidity injection moved the price from {before} to {after}")]
    PriceDrift { before: f64, after: f64 },

    #[error("Answer probabilities drifted from sum {before} to {after}")]
    SumDrift { before: f64, after: f64 },

    #[error("No answers to allocate liquidity to")]
    NoAnswers,
}

impl CoreError {
    /// True for non-finite or out-of-domain results produced by an injection.
    ///
    /// These are rejected and retried on a later cycle with fresh state.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(
            self,
            CoreError::Overflow(_)
                | CoreError::PriceDrift { .. }
                | CoreError::SumDrift { .. }
                | CoreError::ProbabilityOutOfRange(_)
        )
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_classification() {
        assert!(CoreError::Overflow("p".to_string()).is_overflow());
        assert!(CoreError::SumDrift {
            before: 1.0,
            after: 1.1
        }
        .is_overflow());
        assert!(!CoreError::InvalidAmount(-1.0).is_overflow());
        assert!(!CoreError::NoAnswers.is_overflow());
    }
}
