//! Deadline-aware decoration of a connection.

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::deadline::Deadline;
use crate::query::connection::{AsyncConnection, Connection, Param, Query};
use crate::query::error::QueryError;
use crate::query::executor::{self, Outcome};
use crate::query::retry::RetryPolicy;
use crate::query::statements::StatementCache;
use crate::query::strategy::{AnyStrategy, AsyncCancel, DeadlineStrategy};

/// Wraps a connection so every query respects the current task's deadline.
///
/// Composition rather than modification: the wrapped connection is
/// untouched and stays reachable through `inner`/`into_inner`. The wrapper
/// owns the connection, so it cannot be handed back to a pool mid-drain.
#[derive(Debug)]
pub struct DeadlineConnection<C, S = AsyncCancel> {
    inner: C,
    strategy: S,
    statements: StatementCache,
    retry: RetryPolicy,
}

impl<C: AsyncConnection> DeadlineConnection<C, AsyncCancel> {
    /// Wrap `inner` using query cancellation.
    pub fn new(inner: C) -> Self {
        Self::with_strategy(inner, AsyncCancel)
    }

    /// Like `execute_with`, applying `map` to a completed result only.
    pub async fn execute_map<T, F>(
        &mut self,
        query: &Query,
        deadline: &Deadline,
        map: F,
    ) -> Result<T, QueryError<C::Error>>
    where
        F: FnOnce(C::Output) -> T + Send,
    {
        executor::execute_with(&mut self.inner, query, deadline, map)
            .await
            .and_then(Outcome::into_result)
    }
}

impl<C: AsyncConnection> DeadlineConnection<C, AnyStrategy> {
    /// Wrap `inner` with the strategy and retry budget from `config`.
    pub fn from_config(inner: C, config: &DatabaseConfig) -> Self {
        Self::with_strategy(inner, AnyStrategy::from_config(config))
            .with_retry_policy(RetryPolicy::new(config.prepared_statement_retries))
    }
}

impl<C, S> DeadlineConnection<C, S>
where
    C: Connection,
    S: DeadlineStrategy<C>,
{
    pub fn with_strategy(inner: C, strategy: S) -> Self {
        Self {
            inner,
            strategy,
            statements: StatementCache::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run `query` bounded by an explicit deadline.
    pub async fn execute_with(
        &mut self,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        if !deadline.is_set() {
            return self.inner.execute(query).await.map_err(QueryError::Connection);
        }
        self.strategy.execute(&mut self.inner, query, deadline).await
    }

    /// Run `sql` as a cached prepared statement bounded by the current
    /// task's deadline, retrying once if its plan went stale.
    pub async fn execute_prepared(
        &mut self,
        sql: &str,
        params: &[Param],
    ) -> Result<C::Output, QueryError<C::Error>> {
        let deadline = Deadline::current().unwrap_or_default();
        self.retry
            .execute_prepared(
                &mut self.inner,
                &self.strategy,
                &self.statements,
                sql,
                params,
                &deadline,
            )
            .await
    }

    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C, S> Connection for DeadlineConnection<C, S>
where
    C: Connection,
    S: DeadlineStrategy<C>,
{
    type Output = C::Output;
    type Error = QueryError<C::Error>;

    /// Deadline-aware: reads the current task's deadline, or takes the
    /// blocking path outside a deadline scope.
    async fn execute(&mut self, query: &Query) -> Result<C::Output, Self::Error> {
        match Deadline::current() {
            Some(deadline) => self.execute_with(query, &deadline).await,
            None => self.inner.execute(query).await.map_err(QueryError::Connection),
        }
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), Self::Error> {
        self.inner.prepare(name, sql).await.map_err(QueryError::Connection)
    }

    async fn deallocate(&mut self, name: &str) -> Result<(), Self::Error> {
        self.inner.deallocate(name).await.map_err(QueryError::Connection)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}
