//! Scheduler loop - the per-tick decision procedure
//!
//! A periodic timer drives ticks; each tick runs the whole critical section
//! to completion: gate, rate check, dequeue (refreshing from the source when
//! the queue is empty), archive membership check, execute, commit. The gate
//! is the sole serialization authority - if the timer ever fires while a
//! tick is still running, the overlap surfaces as a busy skip, never as two
//! concurrent executions.
//!
//! Durable state is mutated only while the gate is held. Contention and
//! throttling are resolved by skipping, never by waiting; work skipped now is
//! re-derived from durable state on a later tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use queuestore::{StoreError, WorkStore};

use crate::executor::{ExecError, Executor};
use crate::gate::TickGate;
use crate::rate::RateLimiter;
use crate::source::{JobSource, SourceError};

/// Per-tick failures. Busy and rate-limited are not failures; they are
/// [`TickOutcome`] variants and mutate nothing.
#[derive(Debug, Error)]
pub enum TickError {
    /// Transient: cache left unchanged, retried on the next empty-queue refresh
    #[error("source fetch failed: {0}")]
    Source(#[from] SourceError),

    /// Item-specific: the id stays queued for a later tick
    #[error("processing {id} failed: {source}")]
    Exec {
        id: String,
        #[source]
        source: ExecError,
    },

    /// A durable write failed; the tick aborts before any dependent write
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// One item was executed and committed
    Processed(String),
    /// The executor failed; the item stays queued
    ExecutorFailed(String),
    /// Fully caught up - queue empty even after a refresh
    NoWork,
    /// Another critical section was running
    SkippedBusy,
    /// The minimum interval since the last action has not elapsed
    SkippedRateLimited,
    /// A transient source or persistence error ended the tick early
    Aborted,
}

/// Counters owned by one scheduler instance; no process-wide globals
#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks_total: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_rate_limited: AtomicU64,
    processed_success: AtomicU64,
    processed_failure: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks_total: u64,
    pub skipped_busy: u64,
    pub skipped_rate_limited: u64,
    pub processed_success: u64,
    pub processed_failure: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            skipped_rate_limited: self.skipped_rate_limited.load(Ordering::Relaxed),
            processed_success: self.processed_success.load(Ordering::Relaxed),
            processed_failure: self.processed_failure.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Orchestrates gate, rate limiter, store, source, and executor
pub struct Scheduler {
    gate: TickGate,
    limiter: Mutex<RateLimiter>,
    store: WorkStore,
    source: Box<dyn JobSource>,
    executor: Box<dyn Executor>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(store: WorkStore, limiter: RateLimiter, source: Box<dyn JobSource>, executor: Box<dyn Executor>) -> Self {
        Self {
            gate: TickGate::new(),
            limiter: Mutex::new(limiter),
            store,
            source,
            executor,
            stats: SchedulerStats::default(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn store(&self) -> &WorkStore {
        &self.store
    }

    pub async fn last_action(&self) -> Option<DateTime<Utc>> {
        self.limiter.lock().await.last_action()
    }

    /// Run one tick of the decision procedure at wall-clock time `now`.
    ///
    /// All errors are absorbed here: they end the tick, not the process. The
    /// gate permit releases on every path out of this function.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        SchedulerStats::bump(&self.stats.ticks_total);

        let Some(_permit) = self.gate.try_acquire() else {
            SchedulerStats::bump(&self.stats.skipped_busy);
            warn!("tick skipped: previous critical section still in progress");
            return TickOutcome::SkippedBusy;
        };

        // Check and (later) record both happen under this tick's permit,
        // so two ticks can never both observe "allowed".
        {
            let limiter = self.limiter.lock().await;
            if !limiter.allow_now(now) {
                SchedulerStats::bump(&self.stats.skipped_rate_limited);
                info!(
                    remaining = ?limiter.time_until_allowed(now),
                    "tick skipped: rate limited"
                );
                return TickOutcome::SkippedRateLimited;
            }
        }

        match self.process_next(now).await {
            Ok(Some(id)) => {
                SchedulerStats::bump(&self.stats.processed_success);
                info!(%id, "processed and committed");
                TickOutcome::Processed(id)
            }
            Ok(None) => {
                debug!("no pending work");
                TickOutcome::NoWork
            }
            Err(TickError::Exec { id, source }) => {
                SchedulerStats::bump(&self.stats.processed_failure);
                warn!(%id, error = %source, "execution failed; item stays queued");
                TickOutcome::ExecutorFailed(id)
            }
            Err(TickError::Source(e)) => {
                warn!(error = %e, "source fetch failed; cache unchanged, will retry");
                TickOutcome::Aborted
            }
            Err(TickError::Store(e)) => {
                error!(error = %e, "persistence failure; tick aborted");
                TickOutcome::Aborted
            }
        }
    }

    /// Steps 3-7: dequeue (with refresh-on-empty), archive re-check, execute,
    /// commit, record. Returns the processed id, or None when caught up.
    async fn process_next(&self, now: DateTime<Utc>) -> Result<Option<String>, TickError> {
        let mut next = self.store.peek_next()?;
        if next.is_none() {
            self.refill().await?;
            next = self.store.peek_next()?;
        }
        let Some(mut id) = next else {
            return Ok(None);
        };

        // An id can be in both archive and queue after a crash between the
        // archive append and the queue rewrite. Never hand those to the
        // executor; drop them from the queue instead. Bounded by the queue
        // length so corrupted state cannot loop forever.
        let archived = self.store.archived()?;
        let mut budget = self.store.queue_len()?;
        while archived.contains(&id) {
            warn!(%id, "queued item already archived; dropping without execution");
            self.store.remove_from_queue(&id)?;
            budget = budget.saturating_sub(1);
            if budget == 0 {
                return Ok(None);
            }
            match self.store.peek_next()? {
                Some(n) => id = n,
                None => return Ok(None),
            }
        }

        self.executor
            .process(&id)
            .await
            .map_err(|source| TickError::Exec { id: id.clone(), source })?;

        // Archive-first commit, then the rate stamp; both under the permit.
        self.store.commit_processed(&id)?;
        self.limiter.lock().await.record_action(now);
        Ok(Some(id))
    }

    /// Fetch the full item set and rebuild cache and queue. A fetch failure
    /// propagates before any durable write, leaving the cache untouched.
    async fn refill(&self) -> Result<(), TickError> {
        info!("queue empty; refreshing from source");
        let ids = self.source.fetch_all().await?;
        self.store.refresh_cache(&ids)?;
        self.store.recompute_queue()?;
        Ok(())
    }

    /// Drive ticks at a fixed period until `shutdown` flips to true.
    ///
    /// The first tick fires immediately. Periods are measured from the
    /// scheduled time, not from tick completion; a tick outliving the period
    /// shows up as a busy skip on the next fire, never as a burst. Shutdown
    /// is observed only between ticks - an in-flight critical section always
    /// completes and commits before the loop stops.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(?period, "scheduler loop started");

        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Shutdown sender dropped; treat as a stop request
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick(Utc::now()).await;
        }

        let stats = self.stats.snapshot();
        info!(
            ticks_total = stats.ticks_total,
            skipped_busy = stats.skipped_busy,
            skipped_rate_limited = stats.skipped_rate_limited,
            processed_success = stats.processed_success,
            processed_failure = stats.processed_failure,
            "scheduler loop stopped"
        );
    }
}
