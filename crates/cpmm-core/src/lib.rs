//! CPMM pricing and liquidity engine.
//!
//! Pure functions over constant-product pools:
//! - `probability`: implied probability of a YES/NO pool under a skew `p`
//! - `liquidity`: price-preserving subsidy injection into one pool
//! - `allocation`: subsidy apportionment across the answers of a market
//!
//! Nothing in this crate touches storage or randomness. Callers supply the
//! current state and persist the returned state.

pub mod allocation;
pub mod error;
pub mod liquidity;
pub mod market;
pub mod pool;
pub mod probability;

pub use allocation::{
    add_liquidity_independently, add_liquidity_sum_to_one, allocate_liquidity, AllocationPolicy,
};
pub use error::{CoreError, Result};
pub use liquidity::{add_liquidity, add_liquidity_fixed_p, cpmm_liquidity, Injection};
pub use market::{Answer, AnswerId, Contract, MarketId, Mechanism};
pub use pool::{Pool, FIXED_P};
pub use probability::{probability, PRICE_TOLERANCE};
