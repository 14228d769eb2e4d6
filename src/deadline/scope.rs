//! Ambient access to the current task's deadline.
//!
//! The deadline travels with the tokio task, not the worker thread, so two
//! requests multiplexed onto one worker never observe each other's budget.
//! Spawned tasks do not inherit it; hand them `Deadline::current()` and
//! re-enter with `scope`.

use std::future::Future;

use crate::deadline::context::{Deadline, Timeout};

tokio::task_local! {
    static CURRENT: Deadline;
}

impl Deadline {
    /// Run `future` with this deadline as the task's current deadline.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, future).await
    }

    /// Run `f` with this deadline as the current deadline.
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(self, f)
    }

    /// The deadline of the enclosing scope, if any.
    pub fn current() -> Option<Deadline> {
        CURRENT.try_with(Deadline::clone).ok()
    }
}

/// Whether the current task has a deadline configured.
pub fn is_set() -> bool {
    CURRENT.try_with(Deadline::is_set).unwrap_or(false)
}

/// Milliseconds left for the current task. `None` outside a scope or when unset.
pub fn time_left_ms() -> Option<u64> {
    CURRENT.try_with(Deadline::time_left_ms).ok().flatten()
}

/// Whether the current task has time left. True outside a scope.
pub fn time_left() -> bool {
    CURRENT.try_with(Deadline::time_left).unwrap_or(true)
}

/// Fail with `Timeout` if the current task has run out of time.
pub fn ensure_time_left() -> Result<(), Timeout> {
    CURRENT
        .try_with(Deadline::ensure_time_left)
        .unwrap_or(Ok(()))
}
