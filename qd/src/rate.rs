//! Minimum-interval rate limiter
//!
//! Tracks the wall-clock time of the last successful processing action and
//! refuses a new one until the configured interval has elapsed. An interval
//! of zero disables the limiter entirely.
//!
//! The timestamp persists to a small RFC3339 file in the state directory so
//! a process restart cannot reset the enforced interval. Check and record
//! must both happen under the tick gate; the limiter itself does no locking.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Last-action throttle with optional durable timestamp
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_action: Option<DateTime<Utc>>,
    persist_path: Option<PathBuf>,
}

impl RateLimiter {
    /// In-memory limiter with no persistence
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_action: None,
            persist_path: None,
        }
    }

    /// Limiter backed by a timestamp file, reloading any previous timestamp
    pub fn with_persistence(interval: Duration, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_action = load_timestamp(&path);
        if let Some(ts) = last_action {
            debug!(last_action = %ts, "restored last-action timestamp");
        }
        Self {
            interval,
            last_action,
            persist_path: Some(path),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_action(&self) -> Option<DateTime<Utc>> {
        self.last_action
    }

    /// Whether a processing action is allowed at `now`.
    ///
    /// True when the limiter is disabled, no prior action is recorded, or
    /// the full interval has elapsed since the last one.
    pub fn allow_now(&self, now: DateTime<Utc>) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        match self.last_action {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .map(|elapsed| elapsed >= self.interval)
                .unwrap_or(false),
        }
    }

    /// Remaining wait until an action would be allowed. Informational only;
    /// `allow_now` stays the authority.
    pub fn time_until_allowed(&self, now: DateTime<Utc>) -> Duration {
        match self.last_action {
            _ if self.interval.is_zero() => Duration::ZERO,
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
                self.interval.saturating_sub(elapsed)
            }
        }
    }

    /// Record a successful processing action at `now`.
    ///
    /// Callers only invoke this after the action actually succeeded. The
    /// stored timestamp never moves backwards, even if the clock does.
    pub fn record_action(&mut self, now: DateTime<Utc>) {
        let stamped = match self.last_action {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_action = Some(stamped);

        if let Some(path) = &self.persist_path {
            if let Err(e) = fs::write(path, stamped.to_rfc3339()) {
                // Non-fatal: the in-memory timestamp already advanced; a
                // crash before the next persist just shortens one interval.
                warn!(path = %path.display(), error = %e, "failed to persist last-action timestamp");
            }
        }
    }
}

fn load_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(path).ok()?;
    match DateTime::parse_from_rfc3339(content.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparseable last-action timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    #[test]
    fn test_no_prior_action_allows() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        assert!(limiter.allow_now(Utc::now()));
    }

    #[test]
    fn test_zero_interval_disables() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let now = Utc::now();
        limiter.record_action(now);
        assert!(limiter.allow_now(now));
        assert_eq!(limiter.time_until_allowed(now), Duration::ZERO);
    }

    #[test]
    fn test_interval_boundary() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3600));
        let t0 = Utc::now();
        limiter.record_action(t0);

        let just_before = t0 + TimeDelta::seconds(3600) - TimeDelta::milliseconds(1);
        let exactly = t0 + TimeDelta::seconds(3600);

        assert!(!limiter.allow_now(just_before));
        assert!(limiter.allow_now(exactly));
    }

    #[test]
    fn test_time_until_allowed_counts_down() {
        let mut limiter = RateLimiter::new(Duration::from_secs(100));
        let t0 = Utc::now();
        limiter.record_action(t0);

        assert_eq!(limiter.time_until_allowed(t0 + TimeDelta::seconds(40)), Duration::from_secs(60));
        assert_eq!(limiter.time_until_allowed(t0 + TimeDelta::seconds(100)), Duration::ZERO);
    }

    #[test]
    fn test_timestamp_never_goes_backwards() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60));
        let t0 = Utc::now();
        limiter.record_action(t0);
        limiter.record_action(t0 - TimeDelta::seconds(30));

        assert_eq!(limiter.last_action(), Some(t0));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("last_action");

        let t0 = Utc::now();
        let mut limiter = RateLimiter::with_persistence(Duration::from_secs(3600), &path);
        limiter.record_action(t0);

        // A fresh instance (restart) still enforces the interval
        let restarted = RateLimiter::with_persistence(Duration::from_secs(3600), &path);
        assert!(restarted.last_action().is_some());
        assert!(!restarted.allow_now(t0 + TimeDelta::seconds(60)));
        assert!(restarted.allow_now(t0 + TimeDelta::seconds(3600)));
    }

    #[test]
    fn test_garbage_timestamp_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("last_action");
        fs::write(&path, "not a timestamp").unwrap();

        let limiter = RateLimiter::with_persistence(Duration::from_secs(3600), &path);
        assert_eq!(limiter.last_action(), None);
        assert!(limiter.allow_now(Utc::now()));
    }
}
