//! Price-preserving liquidity injection into a single pool.
//!
//! Both injectors add exactly `amount` shares in total (`ΔYES + ΔNO =
//! amount`) and leave the implied probability unchanged. The variable-skew
//! injector may also move `p` when the pool is too lopsided for a
//! proportional split to register in floating point.

use crate::error::{CoreError, Result};
use crate::pool::{Pool, FIXED_P};
use crate::probability::{prices_match, probability, validate_skew};

/// New state of a variable-skew pool after an injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Injection {
    pub pool: Pool,
    pub p: f64,
}

/// CPMM liquidity constant `YES^p * NO^(1-p)`.
pub fn cpmm_liquidity(pool: &Pool, p: f64) -> f64 {
    pool.yes.powf(p) * pool.no.powf(1.0 - p)
}

/// Add `amount` to a binary pool with skew `p`.
///
/// Prefers the split proportional to the existing sides, which keeps `p`.
/// When that split cannot grow both sides (or drifts the price), the amount
/// is split evenly and `p` is solved so the probability is unchanged.
///
/// Returns [`CoreError::Overflow`] when the resulting pool or skew is not
/// finite or leaves (0, 1); nothing should be persisted in that case.
pub fn add_liquidity(pool: &Pool, p: f64, amount: f64) -> Result<Injection> {
    validate_amount(amount)?;
    let prob = probability(pool, p)?;

    let proportional = proportional_split(pool, amount);
    if grew_both_sides(pool, &proportional) {
        if let Ok(after) = probability(&proportional, p) {
            if prices_match(prob, after) {
                return Ok(Injection {
                    pool: proportional,
                    p,
                });
            }
        }
    }

    let half = amount / 2.0;
    let even = Pool::new(pool.yes + half, pool.no + (amount - half));
    ensure_finite(&even)?;

    let new_p = solve_skew(&even, prob)?;
    let after = probability(&even, new_p)?;
    if !prices_match(prob, after) {
        return Err(CoreError::PriceDrift {
            before: prob,
            after,
        });
    }

    Ok(Injection {
        pool: even,
        p: new_p,
    })
}

/// Add `amount` to a pool priced at the fixed skew of 0.5.
///
/// Only the proportional split preserves the price here. If the thinner side
/// is too small to absorb its share it stays equal, which is accepted as long
/// as the price holds.
pub fn add_liquidity_fixed_p(pool: &Pool, amount: f64) -> Result<Pool> {
    validate_amount(amount)?;
    let prob = probability(pool, FIXED_P)?;

    let new_pool = proportional_split(pool, amount);
    ensure_finite(&new_pool)?;

    let after = probability(&new_pool, FIXED_P)?;
    if !prices_match(prob, after) {
        return Err(CoreError::PriceDrift {
            before: prob,
            after,
        });
    }
    Ok(new_pool)
}

pub(crate) fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    Ok(())
}

/// Split `amount` in the ratio of the existing sides.
fn proportional_split(pool: &Pool, amount: f64) -> Pool {
    let scale = pool.yes.max(pool.no);
    let yes = pool.yes / scale;
    let no = pool.no / scale;
    let yes_share = amount * (yes / (yes + no));
    Pool::new(pool.yes + yes_share, pool.no + (amount - yes_share))
}

fn grew_both_sides(before: &Pool, after: &Pool) -> bool {
    after.is_finite() && after.yes > before.yes && after.no > before.no
}

fn ensure_finite(pool: &Pool) -> Result<()> {
    if !pool.is_finite() {
        return Err(CoreError::Overflow(format!("pool {pool}")));
    }
    Ok(())
}

/// Skew that prices `pool` at `prob`: `p = q*y / (q*y + (1-q)*n)`.
fn solve_skew(pool: &Pool, prob: f64) -> Result<f64> {
    let scale = pool.yes.max(pool.no);
    let weighted_yes = prob * (pool.yes / scale);
    let weighted_no = (1.0 - prob) * (pool.no / scale);
    let p = weighted_yes / (weighted_yes + weighted_no);

    validate_skew(p).map_err(|_| CoreError::Overflow(format!("skew {p}")))?;
    Ok(p)
}
