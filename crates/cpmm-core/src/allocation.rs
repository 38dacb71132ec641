//! Subsidy allocation across the answers of a multi-answer market.
//!
//! The amount is apportioned in proportion to each answer's CPMM liquidity
//! (`sqrt(YES * NO)`), so deep answers absorb more and a thin answer is never
//! hit by a disproportionate injection. Each share is then injected with the
//! fixed-skew proportional split, which leaves every answer's probability
//! unchanged.
//!
//! [`AllocationPolicy::SumToOne`] additionally checks that the sum of answer
//! probabilities is the same after the injection as before and rejects the
//! whole allocation otherwise.

use crate::error::{CoreError, Result};
use crate::liquidity::{add_liquidity_fixed_p, cpmm_liquidity, validate_amount};
use crate::pool::{Pool, FIXED_P};
use crate::probability::{probability, PRICE_TOLERANCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How answers of one market relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Mutually exclusive answers; probabilities sum to one.
    SumToOne,
    /// Each answer resolves on its own.
    Independent,
}

impl AllocationPolicy {
    pub fn for_market(should_answers_sum_to_one: bool) -> Self {
        if should_answers_sum_to_one {
            Self::SumToOne
        } else {
            Self::Independent
        }
    }
}

/// Distribute `amount` across `pools` under `policy`.
///
/// The returned map has exactly the keys of `pools`.
pub fn allocate_liquidity<K>(
    pools: &BTreeMap<K, Pool>,
    amount: f64,
    policy: AllocationPolicy,
) -> Result<BTreeMap<K, Pool>>
where
    K: Ord + Clone,
{
    validate_amount(amount)?;
    if pools.is_empty() {
        return Err(CoreError::NoAnswers);
    }

    let weights = liquidity_weights(pools)?;
    let total_weight: f64 = weights.iter().sum();

    let prob_sum_before = match policy {
        AllocationPolicy::SumToOne => Some(probability_sum(pools.values())?),
        AllocationPolicy::Independent => None,
    };

    let mut new_pools = BTreeMap::new();
    for ((answer, pool), weight) in pools.iter().zip(weights) {
        let share = amount * (weight / total_weight);
        let new_pool = if share > 0.0 {
            add_liquidity_fixed_p(pool, share)?
        } else {
            // Share underflowed to zero next to much deeper answers. What is
            // lost is below the smallest subnormal, so the pool stays as is.
            *pool
        };
        new_pools.insert(answer.clone(), new_pool);
    }

    if let Some(before) = prob_sum_before {
        let after = probability_sum(new_pools.values())?;
        if (before - after).abs() > PRICE_TOLERANCE * before {
            return Err(CoreError::SumDrift { before, after });
        }
    }

    Ok(new_pools)
}

/// Allocate to mutually exclusive answers, keeping the probability sum.
pub fn add_liquidity_sum_to_one<K: Ord + Clone>(
    pools: &BTreeMap<K, Pool>,
    amount: f64,
) -> Result<BTreeMap<K, Pool>> {
    allocate_liquidity(pools, amount, AllocationPolicy::SumToOne)
}

/// Allocate to independent answers.
pub fn add_liquidity_independently<K: Ord + Clone>(
    pools: &BTreeMap<K, Pool>,
    amount: f64,
) -> Result<BTreeMap<K, Pool>> {
    allocate_liquidity(pools, amount, AllocationPolicy::Independent)
}

/// Liquidity of each pool, normalized by the largest so the total cannot
/// overflow.
fn liquidity_weights<K>(pools: &BTreeMap<K, Pool>) -> Result<Vec<f64>> {
    let mut weights = Vec::with_capacity(pools.len());
    for pool in pools.values() {
        pool.validate()?;
        let weight = cpmm_liquidity(pool, FIXED_P);
        if !weight.is_finite() || weight <= 0.0 {
            return Err(CoreError::Overflow(format!("liquidity {weight} for pool {pool}")));
        }
        weights.push(weight);
    }

    let max = weights.iter().copied().fold(0.0_f64, f64::max);
    for weight in &mut weights {
        *weight /= max;
    }
    Ok(weights)
}

fn probability_sum<'a>(pools: impl Iterator<Item = &'a Pool>) -> Result<f64> {
    let mut sum = 0.0;
    for pool in pools {
        sum += probability(pool, FIXED_P)?;
    }
    Ok(sum)
}
