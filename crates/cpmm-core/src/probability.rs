//! Implied probability of a CPMM pool.
//!
//! `prob = p*NO / (p*NO + (1-p)*YES)`. With `p = 0.5` this reduces to
//! `NO / (NO + YES)`.

use crate::error::{CoreError, Result};
use crate::pool::Pool;

/// Relative tolerance when comparing probabilities before and after an
/// injection.
pub const PRICE_TOLERANCE: f64 = 1e-9;

/// Implied probability of `pool` under skew `p`.
///
/// Share counts are normalized by the larger side before weighting so that
/// pools near `f64::MAX` cannot overflow the denominator. Results that
/// underflow to exactly 0 or round to 1 are reported as errors rather than
/// clamped.
pub fn probability(pool: &Pool, p: f64) -> Result<f64> {
    pool.validate()?;
    validate_skew(p)?;

    let scale = pool.yes.max(pool.no);
    let weighted_no = p * (pool.no / scale);
    let weighted_yes = (1.0 - p) * (pool.yes / scale);
    let denominator = weighted_no + weighted_yes;

    if !denominator.is_finite() || denominator <= 0.0 {
        return Err(CoreError::ProbabilityOutOfRange(denominator));
    }

    let prob = weighted_no / denominator;
    if !(prob > 0.0 && prob < 1.0) {
        return Err(CoreError::ProbabilityOutOfRange(prob));
    }
    Ok(prob)
}

/// Skew must be finite and strictly inside (0, 1).
pub(crate) fn validate_skew(p: f64) -> Result<()> {
    if !p.is_finite() || p <= 0.0 || p >= 1.0 {
        return Err(CoreError::InvalidSkew(p));
    }
    Ok(())
}

/// Relative comparison of two probabilities.
#[inline]
pub(crate) fn prices_match(before: f64, after: f64) -> bool {
    (before - after).abs() <= PRICE_TOLERANCE * before.max(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_pool_is_even() {
        let prob = probability(&Pool::new(100.0, 100.0), 0.5).unwrap();
        assert!((prob - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_fixed_p_reduces_to_share_ratio() {
        let pool = Pool::new(30.0, 10.0);
        let prob = probability(&pool, 0.5).unwrap();
        assert!((prob - 10.0 / 40.0).abs() < 1e-15);
    }

    #[test]
    fn test_skew_weights_no_side() {
        // p = 0.75 -> 0.75*10 / (0.75*10 + 0.25*30) = 0.5
        let prob = probability(&Pool::new(30.0, 10.0), 0.75).unwrap();
        assert!((prob - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert!(matches!(
            probability(&Pool::new(0.0, 10.0), 0.5),
            Err(CoreError::InvalidPool(_))
        ));
        assert!(matches!(
            probability(&Pool::new(10.0, -1.0), 0.5),
            Err(CoreError::InvalidPool(_))
        ));
        assert!(matches!(
            probability(&Pool::new(10.0, 10.0), 0.0),
            Err(CoreError::InvalidSkew(_))
        ));
        assert!(matches!(
            probability(&Pool::new(10.0, 10.0), 1.0),
            Err(CoreError::InvalidSkew(_))
        ));
        assert!(matches!(
            probability(&Pool::new(10.0, 10.0), f64::NAN),
            Err(CoreError::InvalidSkew(_))
        ));
    }

    #[test]
    fn test_huge_pools_do_not_overflow() {
        let prob = probability(&Pool::new(f64::MAX, f64::MAX), 0.5).unwrap();
        assert!((prob - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_extreme_skew_stays_finite() {
        let prob = probability(&Pool::new(10.0, 10.0), 1e-300).unwrap();
        assert!(prob > 0.0 && prob < 1e-299);

        let prob = probability(&Pool::new(10.0, 10.0), 1.0 - 1e-12).unwrap();
        assert!(prob < 1.0 && prob > 0.999);
    }

    #[test]
    fn test_underflow_is_reported_not_clamped() {
        let result = probability(&Pool::new(1e300, 1.0), 1e-300);
        assert!(matches!(result, Err(CoreError::ProbabilityOutOfRange(p)) if p == 0.0));
    }
}
