//! QueueStore - durable line-oriented work-queue state
//!
//! Three plain-text files under one state directory, one item id per line:
//!
//! - `cache` - full snapshot of the last successful source fetch, replaced
//!   wholesale and atomically on each refresh
//! - `queue` - ordered pending items, always a subset of cache minus archive
//! - `archive` - append-only ledger of completed items; the idempotency
//!   source of truth
//!
//! Every replace goes through a temp-file-then-rename so a crash never leaves
//! a torn file behind. The state directory carries an exclusive lock so two
//! writing processes cannot race each other on the same files.

mod ledger;
mod store;

pub use ledger::LineLedger;
pub use store::{StoreStatus, WorkStore};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from durable store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state directory {0} is locked by another instance")]
    Locked(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
