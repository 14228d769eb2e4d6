//! The per-unit-of-work deadline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::clock::{Clock, MonotonicClock};

/// Sentinel stored while no deadline is configured. Sorts after every real
/// deadline, so the first `set` always wins the tightening comparison.
const UNSET: u64 = u64::MAX;

/// Returned when the deadline of the current unit of work has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline exceeded")]
pub struct Timeout;

/// Handle to the deadline of one logical unit of work (a request, a task).
///
/// Clones share the same underlying value. The deadline is an absolute
/// reading of the context's monotonic clock; absence means unlimited time.
#[derive(Clone)]
pub struct Deadline {
    inner: Arc<Inner>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    deadline_ms: AtomicU64,
}

impl Deadline {
    /// Create an empty context on the process monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create an empty context reading the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                deadline_ms: AtomicU64::new(UNSET),
            }),
        }
    }

    /// Whether a deadline is currently configured.
    pub fn is_set(&self) -> bool {
        self.load().is_some()
    }

    /// Set the deadline `duration_ms` from now, but only if that is earlier
    /// than the current one (or none is set). Returns whether it changed.
    pub fn set(&self, duration_ms: u64) -> bool {
        let candidate = self.candidate(duration_ms);
        let updated = self
            .inner
            .deadline_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (candidate < current).then_some(candidate)
            })
            .is_ok();

        if !updated {
            tracing::trace!(duration_ms, "Deadline not extended");
        }
        updated
    }

    /// Set the deadline `duration_ms` from now unconditionally, even if that
    /// extends it.
    pub fn set_forced(&self, duration_ms: u64) -> bool {
        let candidate = self.candidate(duration_ms);
        let previous = self.inner.deadline_ms.swap(candidate, Ordering::AcqRel);
        previous != candidate
    }

    /// Remove the deadline, restoring unlimited time.
    pub fn clear(&self) {
        self.inner.deadline_ms.store(UNSET, Ordering::Release);
    }

    /// Milliseconds left before the deadline, floored at zero. `None` if unset.
    pub fn time_left_ms(&self) -> Option<u64> {
        let deadline = self.load()?;
        Some(deadline.saturating_sub(self.now_ms()))
    }

    /// `time_left_ms` as a `Duration`.
    pub fn remaining(&self) -> Option<Duration> {
        self.time_left_ms().map(Duration::from_millis)
    }

    /// Whether there is time left. Always true when unset.
    ///
    /// Strict: with exactly 0ms remaining this is `false` while
    /// `time_left_ms` reports `Some(0)`.
    pub fn time_left(&self) -> bool {
        match self.load() {
            Some(deadline) => self.now_ms() < deadline,
            None => true,
        }
    }

    /// Fail with `Timeout` unless `time_left` holds.
    pub fn ensure_time_left(&self) -> Result<(), Timeout> {
        if self.time_left() {
            Ok(())
        } else {
            Err(Timeout)
        }
    }

    fn load(&self) -> Option<u64> {
        match self.inner.deadline_ms.load(Ordering::Acquire) {
            UNSET => None,
            deadline => Some(deadline),
        }
    }

    fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    fn candidate(&self, duration_ms: u64) -> u64 {
        self.now_ms().saturating_add(duration_ms).min(UNSET - 1)
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("deadline_ms", &self.load())
            .field("time_left_ms", &self.time_left_ms())
            .finish()
    }
}

/// Clears a deadline when dropped.
///
/// Held by whoever owns a unit of work so the deadline is cleared on every
/// exit path, including in clones handed to other tasks.
#[derive(Debug)]
pub struct ClearGuard {
    deadline: Deadline,
}

impl ClearGuard {
    pub fn new(deadline: Deadline) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

impl Drop for ClearGuard {
    fn drop(&mut self) {
        self.deadline.clear();
    }
}
