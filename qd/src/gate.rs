//! Non-blocking mutual exclusion for tick critical sections
//!
//! At most one permit exists at a time, process-wide per gate. There is
//! deliberately no blocking acquire: a tick that finds the gate busy has
//! nothing useful to wait for, since the next successful tick re-derives its
//! work from durable state anyway.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Busy/free flag guarding the tick critical section
#[derive(Debug, Default)]
pub struct TickGate {
    busy: AtomicBool,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to enter the critical section without blocking.
    ///
    /// Returns a permit on success; the permit releases the gate when
    /// dropped, on every exit path including panics.
    pub fn try_acquire(&self) -> Option<TickPermit<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("gate acquired");
            Some(TickPermit { gate: self })
        } else {
            debug!("gate busy");
            None
        }
    }

    /// Whether a critical section is currently running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// RAII permit for the gate; dropping it releases the critical section
#[derive(Debug)]
pub struct TickPermit<'a> {
    gate: &'a TickGate,
}

impl Drop for TickPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
        debug!("gate released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_permit_at_a_time() {
        let gate = TickGate::new();

        let permit = gate.try_acquire();
        assert!(permit.is_some());
        assert!(gate.is_busy());

        // Second acquire fails while the first permit lives
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn test_drop_releases() {
        let gate = TickGate::new();

        drop(gate.try_acquire().unwrap());
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_release_on_unwind() {
        let gate = TickGate::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = gate.try_acquire().unwrap();
            panic!("executor blew up");
        }));

        assert!(result.is_err());
        assert!(gate.try_acquire().is_some());
    }
}
