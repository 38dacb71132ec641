//! Transactional pool storage for the drizzle job.
//!
//! - [`PoolStore`] / [`StoreTx`]: the storage contract the job runs against
//! - [`MemoryStore`]: versioned in-process backend with optimistic concurrency
//! - [`Snapshot`]: JSON file format the daemon loads and saves

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryTx};
pub use snapshot::{MarketRecord, Snapshot};
pub use store::{
    AnswerRowUpdate, AnswerUpdate, BoxFuture, ContractUpdate, PoolRecord, PoolStore, StoreTx,
    SubsidyUpdate,
};
