//! Cancellable query execution.
//!
//! # Protocol
//! ```text
//! time_left_ms → ensure_time_left ──(expired)──▶ Timeout, nothing sent
//!     → send(query)
//!     → poll(budget)
//!         ready    → fetch_result → Completed
//!         timeout  → cancel → fetch_result (drain)
//!                        cancel failed  → cancel error, after draining
//!                        query canceled → Cancelled (Timeout)
//!                        other error    → propagated unchanged
//!                        result         → Completed (finished first)
//! ```
//!
//! # Design Decisions
//! - The connection is always drained before returning, so it is reusable
//! - A failed cancel is never reported as a timeout, even if the drain
//!   then reports the query canceled
//! - The caller's transform only runs on a completed result

use std::time::Duration;

use crate::deadline::{Deadline, Timeout};
use crate::observability::metrics;
use crate::query::connection::{AsyncConnection, Connection, ConnectionError, Query};
use crate::query::error::QueryError;

/// Result of a deadline-bounded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The query finished and produced a result.
    Completed(T),
    /// The budget ran out and the server confirmed the cancellation.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Surface `Cancelled` as a `Timeout` error.
    pub fn into_result<E>(self) -> Result<T, QueryError<E>> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Cancelled => Err(QueryError::Timeout(Timeout)),
        }
    }
}

/// Run `query` bounded by `deadline`, returning the raw result.
pub async fn execute<C>(
    conn: &mut C,
    query: &Query,
    deadline: &Deadline,
) -> Result<Outcome<C::Output>, QueryError<C::Error>>
where
    C: AsyncConnection,
{
    execute_with(conn, query, deadline, |result| result).await
}

/// Run `query` bounded by `deadline`, applying `map` to a completed result.
///
/// With no deadline set the query takes the connection's blocking path.
pub async fn execute_with<C, T, F>(
    conn: &mut C,
    query: &Query,
    deadline: &Deadline,
    map: F,
) -> Result<Outcome<T>, QueryError<C::Error>>
where
    C: AsyncConnection,
    F: FnOnce(C::Output) -> T,
{
    let Some(budget_ms) = deadline.time_left_ms() else {
        let result = Connection::execute(conn, query)
            .await
            .map_err(QueryError::Connection)?;
        return Ok(Outcome::Completed(map(result)));
    };
    deadline.ensure_time_left()?;

    tracing::debug!(budget_ms, "Sending query");
    conn.send(query).await.map_err(QueryError::Connection)?;

    let ready = conn
        .poll(Duration::from_millis(budget_ms))
        .await
        .map_err(QueryError::Connection)?;

    if ready {
        let result = conn.fetch_result().await.map_err(QueryError::Connection)?;
        return Ok(Outcome::Completed(map(result)));
    }

    tracing::warn!(budget_ms, "Query exceeded deadline, cancelling");
    if let Err(cancel_error) = conn.cancel().await {
        metrics::record_query_cancellation("cancel_failed");
        if let Err(e) = conn.fetch_result().await {
            tracing::warn!(error = %e, "Draining after failed cancel failed");
        }
        return Err(QueryError::Connection(cancel_error));
    }

    match conn.fetch_result().await {
        Err(e) if e.is_query_canceled() => {
            metrics::record_query_cancellation("cancelled");
            Ok(Outcome::Cancelled)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Draining cancelled query failed");
            metrics::record_query_cancellation("drain_failed");
            Err(QueryError::Connection(e))
        }
        Ok(result) => {
            tracing::debug!("Query completed before cancellation took effect");
            metrics::record_query_cancellation("completed");
            Ok(Outcome::Completed(map(result)))
        }
    }
}
