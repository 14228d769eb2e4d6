//! Recovery from stale prepared statement plans.
//!
//! # Responsibilities
//! - Detect a cached plan failure on a prepared execution
//! - Inside a transaction: surface it distinctly, never retry
//! - Outside: evict the statement and retry from the top, at most once
//!
//! # Design Decisions
//! - Each attempt re-checks the deadline; a retry spends what is left of
//!   the initial budget, never a fresh one
//! - Only cached plan failures are retried; everything else propagates

use crate::deadline::Deadline;
use crate::observability::metrics;
use crate::query::connection::{Connection, ConnectionError, Param, Query};
use crate::query::error::QueryError;
use crate::query::statements::StatementCache;
use crate::query::strategy::DeadlineStrategy;

/// Most retries a stale plan ever earns.
pub const MAX_RETRIES: u32 = 1;

/// Bounded retry of prepared executions whose cached plan went stale.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    retries: u32,
}

impl RetryPolicy {
    /// `retries` is clamped to [`MAX_RETRIES`]; 0 disables the retry.
    pub fn new(retries: u32) -> Self {
        Self {
            retries: retries.min(MAX_RETRIES),
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Prepare (or reuse) `sql` and execute it with `params` through
    /// `strategy`, retrying on a stale cached plan.
    pub async fn execute_prepared<C, S>(
        &self,
        conn: &mut C,
        strategy: &S,
        statements: &StatementCache,
        sql: &str,
        params: &[Param],
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>>
    where
        C: Connection,
        S: DeadlineStrategy<C> + ?Sized,
    {
        let mut attempt = 0;
        loop {
            deadline.ensure_time_left()?;

            let name = statements
                .prepare(conn, sql)
                .await
                .map_err(QueryError::Connection)?;
            let query = Query::prepared(name, params.to_vec());

            let error = match strategy.execute(conn, &query, deadline).await {
                Err(QueryError::Connection(e)) if e.is_cached_plan_failure() => e,
                other => return other,
            };

            if conn.in_transaction() {
                metrics::record_prepared_statement_retry("in_transaction");
                return Err(QueryError::PreparedStatementCacheExpired(error));
            }
            if attempt >= self.retries {
                metrics::record_prepared_statement_retry("exhausted");
                return Err(QueryError::Connection(error));
            }

            attempt += 1;
            tracing::warn!(attempt, error = %error, "Prepared statement plan expired, retrying");
            metrics::record_prepared_statement_retry("retried");
            statements.evict(conn, sql).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}
