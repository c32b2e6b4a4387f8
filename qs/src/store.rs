//! WorkStore - the cache/queue/archive state machine
//!
//! Owns the three ledgers under one state directory and enforces the
//! invariants between them:
//!
//! - queue is always cache minus archive, in cache order
//! - archive grows monotonically, one append per completed item
//! - a completed item is archived before it is removed from the queue, so a
//!   crash between the two writes leaves the id visible in both (safe - the
//!   scheduler re-checks archive membership before executing) rather than in
//!   neither (lost)

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::ledger::LineLedger;
use crate::StoreError;

const CACHE_FILE: &str = "cache";
const QUEUE_FILE: &str = "queue";
const ARCHIVE_FILE: &str = "archive";
const LOCK_FILE: &str = ".lock";

/// Counts and existence flags for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Ids in the last cached snapshot
    pub total: usize,
    /// Ids recorded as completed
    pub archived: usize,
    /// Ids awaiting processing
    pub pending: usize,
    pub cache_exists: bool,
    pub queue_exists: bool,
    pub archive_exists: bool,
}

/// Durable cache/queue/archive manager rooted at one state directory
#[derive(Debug)]
pub struct WorkStore {
    dir: PathBuf,
    cache: LineLedger,
    queue: LineLedger,
    archive: LineLedger,
    /// Held for the store's lifetime when opened exclusively
    _lock: Option<File>,
}

impl WorkStore {
    /// Open the store read-only, without taking the state-directory lock.
    ///
    /// Used for status reporting while a daemon may be running; snapshots can
    /// be momentarily stale but each file read is individually consistent.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self::at(dir, None))
    }

    /// Open the store for writing, taking an exclusive lock on the state
    /// directory. Fails with [`StoreError::Locked`] if another process holds
    /// it - two writers on the same files are never safe.
    pub fn open_exclusive(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = File::create(&lock_path).map_err(|e| StoreError::io(&lock_path, e))?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.clone()))?;

        info!(dir = %dir.display(), "opened work store (exclusive)");
        Ok(Self::at(dir, Some(lock)))
    }

    fn at(dir: PathBuf, lock: Option<File>) -> Self {
        Self {
            cache: LineLedger::new(dir.join(CACHE_FILE)),
            queue: LineLedger::new(dir.join(QUEUE_FILE)),
            archive: LineLedger::new(dir.join(ARCHIVE_FILE)),
            dir,
            _lock: lock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The full item set from the last successful source fetch
    pub fn cache_ids(&self) -> Result<Vec<String>, StoreError> {
        self.cache.load()
    }

    /// Ordered pending items
    pub fn queue_ids(&self) -> Result<Vec<String>, StoreError> {
        self.queue.load()
    }

    /// Completed items, as a set for membership checks
    pub fn archived(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.archive.load()?.into_iter().collect())
    }

    /// Atomically replace the cache with a freshly fetched snapshot.
    ///
    /// The caller only invokes this after a successful fetch; a failed fetch
    /// never reaches the cache, leaving the previous snapshot intact.
    pub fn refresh_cache(&self, ids: &[String]) -> Result<(), StoreError> {
        self.cache.replace(ids)?;
        info!(count = ids.len(), "cache refreshed");
        Ok(())
    }

    /// Rebuild the queue as cache minus archive, preserving cache order.
    pub fn recompute_queue(&self) -> Result<usize, StoreError> {
        let cached = self.cache.load()?;
        let archived = self.archived()?;

        let pending: Vec<String> = cached.into_iter().filter(|id| !archived.contains(id)).collect();
        let count = pending.len();

        self.queue.replace(&pending)?;
        info!(pending = count, "queue recomputed");
        Ok(count)
    }

    /// Head of the queue, without removing it. Removal happens only at
    /// commit, so an executor failure leaves the item queued.
    pub fn peek_next(&self) -> Result<Option<String>, StoreError> {
        Ok(self.queue.load()?.into_iter().next())
    }

    pub fn queue_len(&self) -> Result<usize, StoreError> {
        Ok(self.queue.load()?.len())
    }

    /// Record a successfully processed item.
    ///
    /// Ordering matters: archive append first, queue removal second. A crash
    /// between the two leaves the id in both files, which the scheduler's
    /// archive check resolves; the reverse order would drop the id entirely.
    /// Idempotent - a second commit of the same id changes nothing.
    pub fn commit_processed(&self, id: &str) -> Result<(), StoreError> {
        if !self.archived()?.contains(id) {
            self.archive.append(id)?;
        } else {
            debug!(%id, "already archived, skipping append");
        }
        self.remove_from_queue(id)?;
        info!(%id, "committed");
        Ok(())
    }

    /// Drop an id from the queue without touching the archive. Returns
    /// whether the id was present.
    pub fn remove_from_queue(&self, id: &str) -> Result<bool, StoreError> {
        let queue = self.queue.load()?;
        let remaining: Vec<String> = queue.iter().filter(|q| q.as_str() != id).cloned().collect();

        if remaining.len() == queue.len() {
            debug!(%id, "not in queue");
            return Ok(false);
        }

        self.queue.replace(&remaining)?;
        debug!(%id, remaining = remaining.len(), "removed from queue");
        Ok(true)
    }

    pub fn status(&self) -> Result<StoreStatus, StoreError> {
        Ok(StoreStatus {
            total: self.cache.load()?.len(),
            archived: self.archive.load()?.len(),
            pending: self.queue.load()?.len(),
            cache_exists: self.cache.exists(),
            queue_exists: self.queue.exists(),
            archive_exists: self.archive.exists(),
        })
    }
}
