//! Storage traits consumed by the drizzle job.
//!
//! All pool reads and writes happen inside a [`StoreTx`]. A transaction
//! either commits every write it buffered or none of them; dropping it or
//! calling [`StoreTx::rollback`] discards the writes. Implementations must
//! detect conflicting writers on the rows a transaction touched and surface
//! them as [`StoreError::Conflict`](crate::StoreError::Conflict).

use crate::error::StoreResult;
use cpmm_core::{Answer, AnswerId, Contract, MarketId, Pool};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trading pool and undrizzled subsidy of a market.
///
/// For multi-answer markets `pool` and `p` are unused; only the subsidy
/// matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub pool: Pool,
    pub p: f64,
    #[serde(default)]
    pub subsidy_pool: f64,
}

/// How a subsidy column is written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubsidyUpdate {
    /// Overwrite with a value computed from the transaction's read.
    Set(f64),
    /// Add to whatever value is committed at write time.
    Increment(f64),
}

/// Partial update of a market row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractUpdate {
    pub pool: Option<Pool>,
    pub p: Option<f64>,
    pub subsidy_pool: Option<SubsidyUpdate>,
}

/// Partial update of an answer row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerUpdate {
    pub pool_yes: Option<f64>,
    pub pool_no: Option<f64>,
    pub prob: Option<f64>,
    pub subsidy_pool: Option<f64>,
}

/// Answer update addressed by id, for bulk writes.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRowUpdate {
    pub id: AnswerId,
    pub update: AnswerUpdate,
}

/// Entry point into the pool storage backend.
pub trait PoolStore: Send + Sync {
    type Tx: StoreTx;

    /// Open a transaction.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Self::Tx>>;

    /// Markets whose subsidy pool exceeds `threshold` (outside any transaction).
    fn markets_with_subsidy_above(&self, threshold: f64)
        -> BoxFuture<'_, StoreResult<Vec<MarketId>>>;

    /// Answers whose subsidy pool exceeds `threshold` (outside any transaction).
    fn answers_with_subsidy_above(&self, threshold: f64)
        -> BoxFuture<'_, StoreResult<Vec<AnswerId>>>;
}

/// One storage transaction.
pub trait StoreTx: Send + 'static {
    fn get_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
    ) -> BoxFuture<'a, StoreResult<Option<Contract>>>;

    fn get_pool<'a>(&'a mut self, id: &'a MarketId) -> BoxFuture<'a, StoreResult<Option<PoolRecord>>>;

    fn get_answers_for_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
    ) -> BoxFuture<'a, StoreResult<Vec<Answer>>>;

    fn get_answer<'a>(&'a mut self, id: &'a AnswerId) -> BoxFuture<'a, StoreResult<Option<Answer>>>;

    fn update_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
        update: ContractUpdate,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn update_answer<'a>(
        &'a mut self,
        id: &'a AnswerId,
        update: AnswerUpdate,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn bulk_update_answers(&mut self, updates: Vec<AnswerRowUpdate>)
        -> BoxFuture<'_, StoreResult<()>>;

    /// Apply all buffered writes atomically.
    fn commit(self) -> BoxFuture<'static, StoreResult<()>>
    where
        Self: Sized;

    /// Discard all buffered writes.
    fn rollback(self)
    where
        Self: Sized;
}
