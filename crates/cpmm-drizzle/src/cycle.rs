//! One drizzle cycle.
//!
//! Discovery reads candidates outside any transaction, so each market or
//! answer is re-read inside its own transaction before anything is computed.
//! The store rejects the commit if a concurrent trade touched the same row.
//!
//! Per-unit flow:
//! 1. Begin transaction, re-read the row
//! 2. Skip if the subsidy has fallen to dust
//! 3. Draw the amount, run the engine
//! 4. Write pools and decremented subsidy, commit
//!
//! Any failure rolls the unit back and is logged; the cycle carries on.

use crate::config::DrizzleConfig;
use crate::draw::DrawSource;
use crate::error::{DrizzleError, DrizzleResult};
use chrono::{DateTime, Utc};
use cpmm_core::{
    add_liquidity, add_liquidity_fixed_p, allocate_liquidity, probability, AllocationPolicy,
    AnswerId, Contract, MarketId, Pool, FIXED_P,
};
use cpmm_store::{
    AnswerRowUpdate, AnswerUpdate, ContractUpdate, PoolRecord, PoolStore, StoreTx, SubsidyUpdate,
};
use cpmm_telemetry::Metrics;
use futures_util::future::ready;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Granularity of a drizzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Market,
    Answer,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Market => "market",
            Unit::Answer => "answer",
        }
    }
}

/// Why a drizzle ended without a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Subsidy fell below the dust threshold since discovery.
    Dust,
    /// Multi-answer market with no answers.
    NoAnswers,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Dust => "dust",
            SkipReason::NoAnswers => "no_answers",
        }
    }
}

/// Result of one market or answer drizzle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrizzleOutcome {
    Applied { amount: f64, subsidy_before: f64 },
    Skipped(SkipReason),
}

/// Summary of a full cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub markets_found: usize,
    pub answers_found: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subsidy moved into pools across all committed drizzles.
    pub total_amount: f64,
    /// Stopped early by timeout or shutdown.
    pub cancelled: bool,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            markets_found: 0,
            answers_found: 0,
            applied: 0,
            skipped: 0,
            failed: 0,
            total_amount: 0.0,
            cancelled: false,
        }
    }

    fn record(&mut self, result: &DrizzleResult<DrizzleOutcome>) {
        match result {
            Ok(DrizzleOutcome::Applied { amount, .. }) => {
                self.applied += 1;
                self.total_amount += amount;
            }
            Ok(DrizzleOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "markets={} answers={} applied={} skipped={} failed={} amount={:.4}{}",
            self.markets_found,
            self.answers_found,
            self.applied,
            self.skipped,
            self.failed,
            self.total_amount,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Applies randomized partial subsidy injections against a store.
pub struct Drizzler<S, D> {
    store: S,
    draw: D,
    config: DrizzleConfig,
}

impl<S, D> Drizzler<S, D>
where
    S: PoolStore,
    D: DrawSource,
{
    pub fn new(store: S, draw: D, config: DrizzleConfig) -> DrizzleResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            draw,
            config,
        })
    }

    pub fn config(&self) -> &DrizzleConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drizzle every market, then every answer, holding subsidy.
    ///
    /// Only discovery failures are returned; per-unit failures are logged,
    /// counted in the report and skipped. Cancelling `shutdown` (or hitting
    /// the cycle timeout) stops new drizzles from starting while in-flight
    /// ones finish.
    pub async fn run_drizzle_cycle(
        &self,
        shutdown: &CancellationToken,
    ) -> DrizzleResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("drizzle_cycle", %cycle_id);
        self.run_cycle_inner(cycle_id, shutdown).instrument(span).await
    }

    async fn run_cycle_inner(
        &self,
        cycle_id: Uuid,
        shutdown: &CancellationToken,
    ) -> DrizzleResult<CycleReport> {
        let started = Instant::now();
        let deadline = started + self.config.cycle_timeout();
        let mut report = CycleReport::new(cycle_id);

        let mut market_ids = self
            .store
            .markets_with_subsidy_above(self.config.dust_threshold)
            .await?;
        self.draw.shuffle(&mut market_ids);
        report.markets_found = market_ids.len();
        Metrics::candidates(Unit::Market.as_str(), market_ids.len());
        info!(count = market_ids.len(), "Found markets to drizzle");

        self.fan_out(
            Unit::Market,
            market_ids,
            shutdown,
            deadline,
            &mut report,
            |id| self.drizzle_market(id),
        )
        .await;

        if !stopped(shutdown, deadline) {
            let mut answer_ids = self
                .store
                .answers_with_subsidy_above(self.config.dust_threshold)
                .await?;
            self.draw.shuffle(&mut answer_ids);
            report.answers_found = answer_ids.len();
            Metrics::candidates(Unit::Answer.as_str(), answer_ids.len());
            info!(count = answer_ids.len(), "Found answers to drizzle");

            self.fan_out(
                Unit::Answer,
                answer_ids,
                shutdown,
                deadline,
                &mut report,
                |id| self.drizzle_answer(id),
            )
            .await;
        }

        report.cancelled = stopped(shutdown, deadline);
        report.elapsed = started.elapsed();
        Metrics::cycle_duration(report.elapsed.as_secs_f64());
        info!(%report, elapsed_ms = report.elapsed.as_millis() as u64, "Drizzle cycle complete");
        Ok(report)
    }

    /// Run `drizzle` over `ids` with at most `max_concurrency` in flight.
    async fn fan_out<I, F, Fut>(
        &self,
        unit: Unit,
        ids: Vec<I>,
        shutdown: &CancellationToken,
        deadline: Instant,
        report: &mut CycleReport,
        drizzle: F,
    ) where
        I: fmt::Display + Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = DrizzleResult<DrizzleOutcome>>,
    {
        let mut results = stream::iter(ids)
            .take_while(|_| ready(!stopped(shutdown, deadline)))
            .map(|id| {
                let label = id.clone();
                let fut = drizzle(id);
                async move { (label, fut.await) }
            })
            .buffer_unordered(self.config.max_concurrency);

        while let Some((id, result)) = results.next().await {
            log_result(unit, &id, &result);
            report.record(&result);
        }
    }

    /// Drizzle one market's subsidy inside a transaction.
    pub async fn drizzle_market(&self, id: MarketId) -> DrizzleResult<DrizzleOutcome> {
        let mut tx = self.store.begin().await?;
        let result = self.drizzle_market_in(&mut tx, &id).await;
        settle(tx, result).await
    }

    /// Drizzle one answer's subsidy inside a transaction.
    pub async fn drizzle_answer(&self, id: AnswerId) -> DrizzleResult<DrizzleOutcome> {
        let mut tx = self.store.begin().await?;
        let result = self.drizzle_answer_in(&mut tx, &id).await;
        settle(tx, result).await
    }

    async fn drizzle_market_in(
        &self,
        tx: &mut S::Tx,
        id: &MarketId,
    ) -> DrizzleResult<DrizzleOutcome> {
        let contract = tx
            .get_contract(id)
            .await?
            .ok_or_else(|| DrizzleError::not_found("market", id))?;
        let record = tx
            .get_pool(id)
            .await?
            .ok_or_else(|| DrizzleError::not_found("pool", id))?;

        let subsidy = record.subsidy_pool;
        if subsidy < self.config.dust_threshold {
            return Ok(DrizzleOutcome::Skipped(SkipReason::Dust));
        }

        let coefficient = self.config.market_coefficient(contract.unique_bettor_count);
        let amount = self
            .config
            .drizzle_amount(subsidy, self.draw.unit(), coefficient);

        if contract.is_multi() {
            self.inject_answers(tx, &contract, subsidy, amount).await
        } else {
            self.inject_pool(tx, &contract, &record, amount).await
        }
    }

    async fn inject_pool(
        &self,
        tx: &mut S::Tx,
        contract: &Contract,
        record: &PoolRecord,
        amount: f64,
    ) -> DrizzleResult<DrizzleOutcome> {
        let injection = add_liquidity(&record.pool, record.p, amount)?;

        tx.update_contract(
            &contract.id,
            ContractUpdate {
                pool: Some(injection.pool),
                p: Some(injection.p),
                subsidy_pool: Some(SubsidyUpdate::Increment(-amount)),
            },
        )
        .await?;

        info!(
            market_id = %contract.id,
            slug = %contract.slug,
            amount,
            subsidy_pool = record.subsidy_pool,
            p = injection.p,
            "Added subsidy to pool"
        );
        Ok(DrizzleOutcome::Applied {
            amount,
            subsidy_before: record.subsidy_pool,
        })
    }

    async fn inject_answers(
        &self,
        tx: &mut S::Tx,
        contract: &Contract,
        subsidy: f64,
        amount: f64,
    ) -> DrizzleResult<DrizzleOutcome> {
        let answers = tx.get_answers_for_contract(&contract.id).await?;
        if answers.is_empty() {
            return Ok(DrizzleOutcome::Skipped(SkipReason::NoAnswers));
        }

        let cap = self.config.max_answers_per_market;
        if answers.len() > cap {
            warn!(
                market_id = %contract.id,
                answers = answers.len(),
                cap,
                "Answer count exceeds cap, drizzling the first answers only"
            );
        }
        let pools: BTreeMap<AnswerId, Pool> = answers
            .iter()
            .take(cap)
            .map(|answer| (answer.id.clone(), answer.pool()))
            .collect();

        let policy = AllocationPolicy::for_market(contract.should_answers_sum_to_one);
        let new_pools = allocate_liquidity(&pools, amount, policy)?;

        let mut updates = Vec::with_capacity(new_pools.len());
        for (id, pool) in new_pools {
            let prob = probability(&pool, FIXED_P)?;
            updates.push(AnswerRowUpdate {
                id,
                update: AnswerUpdate {
                    pool_yes: Some(pool.yes),
                    pool_no: Some(pool.no),
                    prob: Some(prob),
                    subsidy_pool: None,
                },
            });
        }
        let answer_count = updates.len();

        tx.bulk_update_answers(updates).await?;
        tx.update_contract(
            &contract.id,
            ContractUpdate {
                subsidy_pool: Some(SubsidyUpdate::Set((subsidy - amount).max(0.0))),
                ..Default::default()
            },
        )
        .await?;

        info!(
            market_id = %contract.id,
            slug = %contract.slug,
            amount,
            subsidy_pool = subsidy,
            answers = answer_count,
            ?policy,
            "Added subsidy to answers"
        );
        Ok(DrizzleOutcome::Applied {
            amount,
            subsidy_before: subsidy,
        })
    }

    async fn drizzle_answer_in(
        &self,
        tx: &mut S::Tx,
        id: &AnswerId,
    ) -> DrizzleResult<DrizzleOutcome> {
        let answer = tx
            .get_answer(id)
            .await?
            .ok_or_else(|| DrizzleError::not_found("answer", id))?;

        let subsidy = answer.subsidy_pool;
        if subsidy < self.config.dust_threshold {
            return Ok(DrizzleOutcome::Skipped(SkipReason::Dust));
        }

        let amount =
            self.config
                .drizzle_amount(subsidy, self.draw.unit(), self.config.answer_coefficient);

        let pool = answer.pool();
        let new_pool = add_liquidity_fixed_p(&pool, amount)?;
        let prob = probability(&new_pool, FIXED_P)?;

        tx.update_answer(
            id,
            AnswerUpdate {
                pool_yes: Some(new_pool.yes),
                pool_no: Some(new_pool.no),
                prob: Some(prob),
                subsidy_pool: Some((subsidy - amount).max(0.0)),
            },
        )
        .await?;

        info!(
            answer_id = %id,
            text = %answer.text,
            yes_added = new_pool.yes - pool.yes,
            no_added = new_pool.no - pool.no,
            amount,
            subsidy_pool = subsidy,
            "Added subsidy to answer"
        );
        Ok(DrizzleOutcome::Applied {
            amount,
            subsidy_before: subsidy,
        })
    }
}

/// Commit only an applied drizzle. Skips hold no writes and roll back, so a
/// trade on a row they read cannot turn them into conflicts.
async fn settle<T: StoreTx>(
    tx: T,
    result: DrizzleResult<DrizzleOutcome>,
) -> DrizzleResult<DrizzleOutcome> {
    match result {
        Ok(outcome @ DrizzleOutcome::Applied { .. }) => {
            tx.commit().await?;
            Ok(outcome)
        }
        other => {
            tx.rollback();
            other
        }
    }
}

fn stopped(shutdown: &CancellationToken, deadline: Instant) -> bool {
    shutdown.is_cancelled() || Instant::now() >= deadline
}

fn log_result(unit: Unit, id: &dyn fmt::Display, result: &DrizzleResult<DrizzleOutcome>) {
    let unit_label = unit.as_str();
    match result {
        Ok(DrizzleOutcome::Applied {
            amount,
            subsidy_before,
        }) => {
            debug!(
                unit = unit_label,
                id = %id,
                amount,
                remaining = (subsidy_before - amount).max(0.0),
                "Drizzle committed"
            );
            Metrics::drizzle_applied(unit_label, *amount);
        }
        Ok(DrizzleOutcome::Skipped(reason)) => {
            debug!(unit = unit_label, id = %id, reason = reason.as_str(), "Drizzle skipped");
            Metrics::drizzle_skipped(unit_label, reason.as_str());
        }
        Err(e) if e.is_overflow() => {
            warn!(unit = unit_label, id = %id, error = %e, "Liquidity injection rejected");
            Metrics::drizzle_failed(unit_label, e.reason());
        }
        Err(e) => {
            warn!(
                unit = unit_label,
                id = %id,
                error = %e,
                retryable = e.is_retryable(),
                "Drizzle failed"
            );
            Metrics::drizzle_failed(unit_label, e.reason());
        }
    }
}
