//! queued - durable single-flight work-queue daemon
//!
//! Periodically asks an external Job Source for the full set of candidate
//! item ids, mirrors that set into durable on-disk state, and drains pending
//! items one at a time through an external Executor. No two executions ever
//! overlap, the processing rate never exceeds the configured minimum
//! interval, and completed/pending work survives restarts.
//!
//! # Modules
//!
//! - [`gate`] - non-blocking mutual exclusion for the tick critical section
//! - [`rate`] - minimum-interval rate limiter with a persisted timestamp
//! - [`source`] - JobSource trait and command-backed implementation
//! - [`executor`] - Executor trait and command-backed implementation
//! - [`scheduler`] - the per-tick decision procedure and run loop
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//!
//! Durable cache/queue/archive state lives in the `queuestore` crate.

pub mod cli;
pub mod config;
pub mod executor;
pub mod gate;
pub mod rate;
pub mod scheduler;
pub mod source;

pub use config::{Config, ExecutorConfig, SourceConfig};
pub use executor::{CommandExecutor, ExecError, Executor};
pub use gate::{TickGate, TickPermit};
pub use rate::RateLimiter;
pub use scheduler::{Scheduler, SchedulerStats, StatsSnapshot, TickError, TickOutcome};
pub use source::{CommandSource, JobSource, SourceError};
