//! Market and answer records.
//!
//! A market (contract) is either a single binary pool with its own skew, or
//! a set of answers that each own a fixed-skew pool. Subsidy lives on the
//! market's pool row and on each answer separately.

use crate::pool::Pool;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer identifier, unique across markets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerId(pub String);

impl AnswerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pricing mechanism of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mechanism {
    /// Single binary pool with a variable skew.
    #[default]
    #[serde(rename = "cpmm-1")]
    Cpmm,
    /// One fixed-skew pool per answer.
    #[serde(rename = "cpmm-multi-1")]
    CpmmMulti,
}

/// Market metadata the drizzle job needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: MarketId,
    pub slug: String,
    #[serde(default)]
    pub mechanism: Mechanism,
    /// Answers are mutually exclusive; their probabilities sum to one.
    #[serde(default)]
    pub should_answers_sum_to_one: bool,
    #[serde(default)]
    pub unique_bettor_count: u32,
}

impl Contract {
    #[inline]
    pub fn is_multi(&self) -> bool {
        self.mechanism == Mechanism::CpmmMulti
    }
}

/// One outcome of a multi-answer market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub contract_id: MarketId,
    #[serde(default)]
    pub text: String,
    pub pool_yes: f64,
    pub pool_no: f64,
    /// Cached `probability(pool, 0.5)`; rewritten on every pool change.
    pub prob: f64,
    #[serde(default)]
    pub subsidy_pool: f64,
}

impl Answer {
    #[inline]
    pub fn pool(&self) -> Pool {
        Pool::new(self.pool_yes, self.pool_no)
    }
}
