//! Two-sided share pool.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Skew used for pools that carry no independent skew parameter.
pub const FIXED_P: f64 = 0.5;

/// Outstanding YES/NO shares backing the price of one binary outcome.
///
/// A pool is only valid while both sides are finite and strictly positive.
/// A side reaching zero is a degenerate state that the engine rejects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(rename = "YES")]
    pub yes: f64,
    #[serde(rename = "NO")]
    pub no: f64,
}

impl Pool {
    #[inline]
    pub fn new(yes: f64, no: f64) -> Self {
        Self { yes, no }
    }

    /// Sum of both sides.
    #[inline]
    pub fn total(&self) -> f64 {
        self.yes + self.no
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.yes.is_finite() && self.no.is_finite()
    }

    /// Check that both sides are finite and strictly positive.
    pub fn validate(&self) -> Result<()> {
        if !self.is_finite() {
            return Err(CoreError::InvalidPool(format!(
                "non-finite shares YES={} NO={}",
                self.yes, self.no
            )));
        }
        if self.yes <= 0.0 || self.no <= 0.0 {
            return Err(CoreError::InvalidPool(format!(
                "non-positive shares YES={} NO={}",
                self.yes, self.no
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{YES: {}, NO: {}}}", self.yes, self.no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_degenerate_sides() {
        assert!(Pool::new(1.0, 2.0).validate().is_ok());
        assert!(Pool::new(0.0, 2.0).validate().is_err());
        assert!(Pool::new(1.0, -2.0).validate().is_err());
        assert!(Pool::new(f64::NAN, 2.0).validate().is_err());
        assert!(Pool::new(1.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_serializes_with_outcome_keys() {
        let pool = Pool::new(3.0, 4.5);
        let json = serde_json::to_string(&pool).unwrap();
        assert_eq!(json, r#"{"YES":3.0,"NO":4.5}"#);

        let parsed: Pool = serde_json::from_str(r#"{"YES": 10, "NO": 20}"#).unwrap();
        assert_eq!(parsed, Pool::new(10.0, 20.0));
    }
}
