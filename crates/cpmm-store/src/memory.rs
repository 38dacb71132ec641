//! In-process pool store with optimistic concurrency.
//!
//! Every market and answer row carries a version. A [`MemoryTx`] remembers
//! the version of each row it reads and buffers its writes; commit takes the
//! table lock, fails with [`StoreError::Conflict`] if any row it read has
//! moved on, and otherwise applies all writes and bumps the touched rows.
//!
//! Reads inside a transaction see committed state, not the transaction's own
//! buffered writes.

use crate::error::{StoreError, StoreResult};
use crate::snapshot::{MarketRecord, Snapshot};
use crate::store::{
    AnswerRowUpdate, AnswerUpdate, BoxFuture, ContractUpdate, PoolRecord, PoolStore, StoreTx,
    SubsidyUpdate,
};
use cpmm_core::{probability, Answer, AnswerId, Contract, MarketId, Pool, FIXED_P};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::ready;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Debug, Default)]
struct Tables {
    markets: BTreeMap<MarketId, Versioned<MarketRecord>>,
    answers: BTreeMap<AnswerId, Versioned<Answer>>,
}

impl Tables {
    /// Current version of a row; 0 when absent.
    fn version_of(&self, key: &RowKey) -> u64 {
        match key {
            RowKey::Market(id) => self.markets.get(id).map_or(0, |row| row.version),
            RowKey::Answer(id) => self.answers.get(id).map_or(0, |row| row.version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Market(MarketId),
    Answer(AnswerId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Market(id) => write!(f, "market {id}"),
            RowKey::Answer(id) => write!(f, "answer {id}"),
        }
    }
}

/// Shared in-memory pool tables.
///
/// Cloning is cheap and yields a handle to the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        for market in snapshot.markets {
            store.insert_market(market);
        }
        for answer in snapshot.answers {
            store.insert_answer(answer);
        }
        store
    }

    /// Copy of all committed rows.
    pub fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read();
        Snapshot {
            markets: tables.markets.values().map(|row| row.value.clone()).collect(),
            answers: tables.answers.values().map(|row| row.value.clone()).collect(),
        }
    }

    /// Insert or replace a market row.
    pub fn insert_market(&self, record: MarketRecord) {
        let mut tables = self.tables.write();
        let version = tables
            .markets
            .get(&record.contract.id)
            .map_or(1, |row| row.version + 1);
        tables.markets.insert(
            record.contract.id.clone(),
            Versioned {
                value: record,
                version,
            },
        );
    }

    /// Insert or replace an answer row.
    pub fn insert_answer(&self, answer: Answer) {
        let mut tables = self.tables.write();
        let version = tables.answers.get(&answer.id).map_or(1, |row| row.version + 1);
        tables.answers.insert(
            answer.id.clone(),
            Versioned {
                value: answer,
                version,
            },
        );
    }

    pub fn market(&self, id: &MarketId) -> Option<MarketRecord> {
        self.tables.read().markets.get(id).map(|row| row.value.clone())
    }

    pub fn answer(&self, id: &AnswerId) -> Option<Answer> {
        self.tables.read().answers.get(id).map(|row| row.value.clone())
    }

    /// Overwrite a market's pool outside any transaction, as a trade would.
    pub fn record_trade(&self, id: &MarketId, pool: Pool, p: f64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let row = tables.markets.get_mut(id).ok_or_else(|| not_found("market", id))?;
        row.value.state.pool = pool;
        row.value.state.p = p;
        row.version += 1;
        Ok(())
    }

    /// Overwrite an answer's pool outside any transaction, as a trade would.
    pub fn record_answer_trade(&self, id: &AnswerId, pool: Pool) -> StoreResult<()> {
        let prob = probability(&pool, FIXED_P).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut tables = self.tables.write();
        let row = tables.answers.get_mut(id).ok_or_else(|| not_found("answer", id))?;
        row.value.pool_yes = pool.yes;
        row.value.pool_no = pool.no;
        row.value.prob = prob;
        row.version += 1;
        Ok(())
    }

    /// Add user-contributed subsidy to a market.
    pub fn add_subsidy(&self, id: &MarketId, amount: f64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let row = tables.markets.get_mut(id).ok_or_else(|| not_found("market", id))?;
        row.value.state.subsidy_pool += amount;
        row.version += 1;
        Ok(())
    }

    /// Add user-contributed subsidy to an answer.
    pub fn add_answer_subsidy(&self, id: &AnswerId, amount: f64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let row = tables.answers.get_mut(id).ok_or_else(|| not_found("answer", id))?;
        row.value.subsidy_pool += amount;
        row.version += 1;
        Ok(())
    }
}

impl PoolStore for MemoryStore {
    type Tx = MemoryTx;

    fn begin(&self) -> BoxFuture<'_, StoreResult<MemoryTx>> {
        done(Ok(MemoryTx {
            tables: Arc::clone(&self.tables),
            reads: HashMap::new(),
            market_writes: Vec::new(),
            answer_writes: Vec::new(),
        }))
    }

    fn markets_with_subsidy_above(
        &self,
        threshold: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<MarketId>>> {
        let ids: Vec<MarketId> = self
            .tables
            .read()
            .markets
            .values()
            .filter(|row| row.value.state.subsidy_pool > threshold)
            .map(|row| row.value.contract.id.clone())
            .collect();
        done(Ok(ids))
    }

    fn answers_with_subsidy_above(
        &self,
        threshold: f64,
    ) -> BoxFuture<'_, StoreResult<Vec<AnswerId>>> {
        let ids: Vec<AnswerId> = self
            .tables
            .read()
            .answers
            .values()
            .filter(|row| row.value.subsidy_pool > threshold)
            .map(|row| row.value.id.clone())
            .collect();
        done(Ok(ids))
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    reads: HashMap<RowKey, u64>,
    market_writes: Vec<(MarketId, ContractUpdate)>,
    answer_writes: Vec<(AnswerId, AnswerUpdate)>,
}

impl MemoryTx {
    /// Remember the first version seen for a row.
    fn observe(&mut self, key: RowKey, version: u64) {
        self.reads.entry(key).or_insert(version);
    }

    fn read_market(&mut self, id: &MarketId) -> Option<MarketRecord> {
        let row = self.tables.read().markets.get(id).cloned();
        self.observe(RowKey::Market(id.clone()), row.as_ref().map_or(0, |r| r.version));
        row.map(|r| r.value)
    }

    fn read_answer(&mut self, id: &AnswerId) -> Option<Answer> {
        let row = self.tables.read().answers.get(id).cloned();
        self.observe(RowKey::Answer(id.clone()), row.as_ref().map_or(0, |r| r.version));
        row.map(|r| r.value)
    }

    fn read_answers_for(&mut self, contract_id: &MarketId) -> Vec<Answer> {
        let rows: Vec<Versioned<Answer>> = self
            .tables
            .read()
            .answers
            .values()
            .filter(|row| &row.value.contract_id == contract_id)
            .cloned()
            .collect();

        rows.into_iter()
            .map(|row| {
                self.observe(RowKey::Answer(row.value.id.clone()), row.version);
                row.value
            })
            .collect()
    }

    fn apply(self) -> StoreResult<()> {
        let mut tables = self.tables.write();

        for (key, expected) in &self.reads {
            let current = tables.version_of(key);
            if current != *expected {
                debug!(row = %key, expected, current, "Commit conflict");
                return Err(StoreError::Conflict {
                    row: key.to_string(),
                });
            }
        }

        if let Some((id, _)) = self
            .market_writes
            .iter()
            .find(|(id, _)| !tables.markets.contains_key(id))
        {
            return Err(not_found("market", id));
        }
        if let Some((id, _)) = self
            .answer_writes
            .iter()
            .find(|(id, _)| !tables.answers.contains_key(id))
        {
            return Err(not_found("answer", id));
        }

        let mut touched = HashSet::new();
        for (id, update) in self.market_writes {
            if let Some(row) = tables.markets.get_mut(&id) {
                apply_contract_update(&mut row.value.state, update);
                if touched.insert(RowKey::Market(id)) {
                    row.version += 1;
                }
            }
        }
        for (id, update) in self.answer_writes {
            if let Some(row) = tables.answers.get_mut(&id) {
                apply_answer_update(&mut row.value, update);
                if touched.insert(RowKey::Answer(id)) {
                    row.version += 1;
                }
            }
        }

        debug!(rows = touched.len(), "Committed transaction");
        Ok(())
    }
}

impl StoreTx for MemoryTx {
    fn get_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
    ) -> BoxFuture<'a, StoreResult<Option<Contract>>> {
        let contract = self.read_market(id).map(|record| record.contract);
        done(Ok(contract))
    }

    fn get_pool<'a>(&'a mut self, id: &'a MarketId) -> BoxFuture<'a, StoreResult<Option<PoolRecord>>> {
        let state = self.read_market(id).map(|record| record.state);
        done(Ok(state))
    }

    fn get_answers_for_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
    ) -> BoxFuture<'a, StoreResult<Vec<Answer>>> {
        let answers = self.read_answers_for(id);
        done(Ok(answers))
    }

    fn get_answer<'a>(&'a mut self, id: &'a AnswerId) -> BoxFuture<'a, StoreResult<Option<Answer>>> {
        let answer = self.read_answer(id);
        done(Ok(answer))
    }

    fn update_contract<'a>(
        &'a mut self,
        id: &'a MarketId,
        update: ContractUpdate,
    ) -> BoxFuture<'a, StoreResult<()>> {
        self.market_writes.push((id.clone(), update));
        done(Ok(()))
    }

    fn update_answer<'a>(
        &'a mut self,
        id: &'a AnswerId,
        update: AnswerUpdate,
    ) -> BoxFuture<'a, StoreResult<()>> {
        self.answer_writes.push((id.clone(), update));
        done(Ok(()))
    }

    fn bulk_update_answers(
        &mut self,
        updates: Vec<AnswerRowUpdate>,
    ) -> BoxFuture<'_, StoreResult<()>> {
        self.answer_writes
            .extend(updates.into_iter().map(|row| (row.id, row.update)));
        done(Ok(()))
    }

    fn commit(self) -> BoxFuture<'static, StoreResult<()>> {
        done(self.apply())
    }

    fn rollback(self) {
        debug!(
            market_writes = self.market_writes.len(),
            answer_writes = self.answer_writes.len(),
            "Rolled back transaction"
        );
    }
}

fn apply_contract_update(state: &mut PoolRecord, update: ContractUpdate) {
    if let Some(pool) = update.pool {
        state.pool = pool;
    }
    if let Some(p) = update.p {
        state.p = p;
    }
    match update.subsidy_pool {
        Some(SubsidyUpdate::Set(value)) => state.subsidy_pool = value.max(0.0),
        Some(SubsidyUpdate::Increment(delta)) => {
            state.subsidy_pool = (state.subsidy_pool + delta).max(0.0)
        }
        None => {}
    }
}

fn apply_answer_update(answer: &mut Answer, update: AnswerUpdate) {
    if let Some(pool_yes) = update.pool_yes {
        answer.pool_yes = pool_yes;
    }
    if let Some(pool_no) = update.pool_no {
        answer.pool_no = pool_no;
    }
    if let Some(prob) = update.prob {
        answer.prob = prob;
    }
    if let Some(subsidy_pool) = update.subsidy_pool {
        answer.subsidy_pool = subsidy_pool.max(0.0);
    }
}

/// Resolved future carrying `result`.
fn done<'a, T: Send + 'a>(result: StoreResult<T>) -> BoxFuture<'a, StoreResult<T>> {
    Box::pin(ready(result))
}

fn not_found(kind: &'static str, id: impl fmt::Display) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpmm_core::Mechanism;

    fn market(id: &str, subsidy: f64) -> MarketRecord {
        MarketRecord {
            contract: Contract {
                id: MarketId::new(id),
                slug: format!("slug-{id}"),
                mechanism: Mechanism::Cpmm,
                should_answers_sum_to_one: false,
                unique_bettor_count: 0,
            },
            state: PoolRecord {
                pool: Pool::new(10.0, 10.0),
                p: 0.5,
                subsidy_pool: subsidy,
            },
        }
    }

    fn answer(id: &str, contract: &str, subsidy: f64) -> Answer {
        Answer {
            id: AnswerId::new(id),
            contract_id: MarketId::new(contract),
            text: id.to_uppercase(),
            pool_yes: 5.0,
            pool_no: 5.0,
            prob: 0.5,
            subsidy_pool: subsidy,
        }
    }

    #[tokio::test]
    async fn test_commit_applies_buffered_writes() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 4.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        let pool = tx.get_pool(&id).await.unwrap().unwrap();
        tx.update_contract(
            &id,
            ContractUpdate {
                pool: Some(Pool::new(11.0, 11.0)),
                p: None,
                subsidy_pool: Some(SubsidyUpdate::Set(pool.subsidy_pool - 2.0)),
            },
        )
        .await
        .unwrap();

        // Not visible before commit.
        assert_eq!(store.market(&id).unwrap().state.subsidy_pool, 4.0);

        tx.commit().await.unwrap();
        let committed = store.market(&id).unwrap().state;
        assert_eq!(committed.pool, Pool::new(11.0, 11.0));
        assert_eq!(committed.subsidy_pool, 2.0);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        store.insert_answer(answer("a1", "m1", 3.0));
        let id = AnswerId::new("a1");

        let mut tx = store.begin().await.unwrap();
        tx.update_answer(
            &id,
            AnswerUpdate {
                subsidy_pool: Some(0.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        tx.rollback();

        assert_eq!(store.answer(&id).unwrap().subsidy_pool, 3.0);
    }

    #[tokio::test]
    async fn test_concurrent_trade_causes_conflict() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 4.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        tx.get_pool(&id).await.unwrap();
        tx.update_contract(
            &id,
            ContractUpdate {
                subsidy_pool: Some(SubsidyUpdate::Set(0.0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        store.record_trade(&id, Pool::new(8.0, 12.5), 0.5).unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_retryable());
        let state = store.market(&id).unwrap().state;
        assert_eq!(state.subsidy_pool, 4.0);
        assert_eq!(state.pool, Pool::new(8.0, 12.5));
    }

    #[tokio::test]
    async fn test_increment_applies_to_committed_value() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 4.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        tx.update_contract(
            &id,
            ContractUpdate {
                subsidy_pool: Some(SubsidyUpdate::Increment(-1.5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.market(&id).unwrap().state.subsidy_pool, 2.5);
    }

    #[tokio::test]
    async fn test_blind_increment_lands_on_new_contribution() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 4.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        tx.update_contract(
            &id,
            ContractUpdate {
                subsidy_pool: Some(SubsidyUpdate::Increment(-1.0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Never read, so a contribution in between does not conflict.
        store.add_subsidy(&id, 10.0).unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.market(&id).unwrap().state.subsidy_pool, 13.0);
    }

    #[tokio::test]
    async fn test_answer_trade_conflicts_with_read() {
        let store = MemoryStore::new();
        store.insert_answer(answer("a1", "m1", 2.0));
        let id = AnswerId::new("a1");

        let mut tx = store.begin().await.unwrap();
        let read = tx.get_answer(&id).await.unwrap().unwrap();
        tx.update_answer(
            &id,
            AnswerUpdate {
                subsidy_pool: Some(read.subsidy_pool - 1.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        store.add_answer_subsidy(&id, 5.0).unwrap();
        assert!(tx.commit().await.unwrap_err().is_retryable());
        assert_eq!(store.answer(&id).unwrap().subsidy_pool, 7.0);

        store.record_answer_trade(&id, Pool::new(15.0, 5.0)).unwrap();
        let traded = store.answer(&id).unwrap();
        assert_eq!(traded.pool(), Pool::new(15.0, 5.0));
        assert!((traded.prob - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_subsidy_is_floored_at_zero() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 1.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        tx.update_contract(
            &id,
            ContractUpdate {
                subsidy_pool: Some(SubsidyUpdate::Increment(-1.0000001)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.market(&id).unwrap().state.subsidy_pool, 0.0);
    }

    #[tokio::test]
    async fn test_write_to_missing_row_fails_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.update_answer(&AnswerId::new("ghost"), AnswerUpdate::default())
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "answer", .. }));
    }

    #[tokio::test]
    async fn test_answers_for_contract_and_bulk_update() {
        let store = MemoryStore::new();
        store.insert_answer(answer("a1", "m1", 0.0));
        store.insert_answer(answer("a2", "m1", 0.0));
        store.insert_answer(answer("b1", "m2", 0.0));
        let id = MarketId::new("m1");

        let mut tx = store.begin().await.unwrap();
        let answers = tx.get_answers_for_contract(&id).await.unwrap();
        assert_eq!(answers.len(), 2);

        let updates = answers
            .iter()
            .map(|a| AnswerRowUpdate {
                id: a.id.clone(),
                update: AnswerUpdate {
                    pool_yes: Some(6.0),
                    pool_no: Some(6.0),
                    ..Default::default()
                },
            })
            .collect();
        tx.bulk_update_answers(updates).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.answer(&AnswerId::new("a2")).unwrap().pool_yes, 6.0);
        assert_eq!(store.answer(&AnswerId::new("b1")).unwrap().pool_yes, 5.0);
    }

    #[test]
    fn test_discovery_filters_by_threshold() {
        let store = MemoryStore::new();
        store.insert_market(market("dust", 1e-9));
        store.insert_market(market("rich", 5.0));
        store.insert_answer(answer("a1", "m", 0.0));
        store.insert_answer(answer("a2", "m", 2.0));

        let markets = tokio_test::block_on(store.markets_with_subsidy_above(1e-7)).unwrap();
        let answers = tokio_test::block_on(store.answers_with_subsidy_above(1e-7)).unwrap();

        assert_eq!(markets, vec![MarketId::new("rich")]);
        assert_eq!(answers, vec![AnswerId::new("a2")]);
    }

    #[test]
    fn test_snapshot_round_trip_through_store() {
        let store = MemoryStore::new();
        store.insert_market(market("m1", 1.0));
        store.insert_answer(answer("a1", "m2", 2.0));

        let copy = MemoryStore::from_snapshot(store.snapshot());
        assert_eq!(copy.snapshot(), store.snapshot());
    }
}
