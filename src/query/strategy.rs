//! Strategies for bounding query latency to the remaining budget.
//!
//! # Strategies
//! - `AsyncCancel`: non-blocking send, poll with the budget, cancel on
//!   expiry. Needs `AsyncConnection`.
//! - `StatementTimeout`: set the session's `statement_timeout` around the
//!   query and let the server enforce it.
//! - `OptimizerHint`: inject `MAX_EXECUTION_TIME` into SELECTs (MySQL
//!   ignores it elsewhere).
//! - `CheckOnly`: refuse to start once the budget is gone, nothing more.
//!
//! # Design Decisions
//! - All strategies take the blocking path when no deadline is set
//! - A server-side cancellation of the query always surfaces as `Timeout`

use std::borrow::Cow;

use async_trait::async_trait;

use crate::config::{DatabaseConfig, DeadlineStrategyKind};
use crate::deadline::{Deadline, Timeout};
use crate::query::connection::{AsyncConnection, Connection, ConnectionError, Query};
use crate::query::error::QueryError;
use crate::query::executor;

const MAX_EXECUTION_TIME: &str = "MAX_EXECUTION_TIME";

/// Deadline-aware execution of a single query.
#[async_trait]
pub trait DeadlineStrategy<C: Connection>: Send + Sync {
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>>;
}

async fn blocking<C: Connection>(
    conn: &mut C,
    query: &Query,
) -> Result<C::Output, QueryError<C::Error>> {
    conn.execute(query).await.map_err(QueryError::Connection)
}

fn classify<E: ConnectionError>(e: E) -> QueryError<E> {
    if e.is_query_canceled() {
        QueryError::Timeout(Timeout)
    } else {
        QueryError::Connection(e)
    }
}

/// Drive the non-blocking protocol and cancel when the budget runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncCancel;

#[async_trait]
impl<C> DeadlineStrategy<C> for AsyncCancel
where
    C: AsyncConnection,
{
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        executor::execute(conn, query, deadline).await?.into_result()
    }
}

/// Check the budget before starting, then run the query unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOnly;

#[async_trait]
impl<C> DeadlineStrategy<C> for CheckOnly
where
    C: Connection,
{
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        deadline.ensure_time_left()?;
        blocking(conn, query).await
    }
}

/// Wrap the query in `SET SESSION statement_timeout` statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementTimeout {
    /// Connection-level timeout to restore afterwards; `DEFAULT` if unset.
    pub restore_ms: Option<u64>,
}

impl StatementTimeout {
    pub fn new(restore_ms: Option<u64>) -> Self {
        Self { restore_ms }
    }

    pub fn set_sql(budget_ms: u64) -> String {
        format!("SET SESSION statement_timeout TO {budget_ms}")
    }

    pub fn reset_sql(&self) -> String {
        match self.restore_ms {
            Some(ms) => format!("SET SESSION statement_timeout TO {ms}"),
            None => "SET SESSION statement_timeout TO DEFAULT".to_string(),
        }
    }
}

#[async_trait]
impl<C> DeadlineStrategy<C> for StatementTimeout
where
    C: Connection,
{
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        let Some(budget_ms) = deadline.time_left_ms() else {
            return blocking(conn, query).await;
        };
        deadline.ensure_time_left()?;

        conn.execute(&Query::simple(Self::set_sql(budget_ms)))
            .await
            .map_err(QueryError::Connection)?;

        let result = conn.execute(query).await;
        let reset = conn.execute(&Query::simple(self.reset_sql())).await;

        match (result, reset) {
            (Ok(output), Ok(_)) => Ok(output),
            (Ok(_), Err(e)) => Err(QueryError::Connection(e)),
            (Err(e), reset) => {
                if let Err(reset_error) = reset {
                    tracing::warn!(error = %reset_error, "Failed to reset statement_timeout");
                }
                Err(classify(e))
            }
        }
    }
}

/// Add a `MAX_EXECUTION_TIME` optimizer hint to SELECT statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizerHint;

#[async_trait]
impl<C> DeadlineStrategy<C> for OptimizerHint
where
    C: Connection,
{
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        let Some(budget_ms) = deadline.time_left_ms() else {
            return blocking(conn, query).await;
        };
        deadline.ensure_time_left()?;

        let hinted = match query {
            Query::Simple { sql } => Query::simple(add_max_execution_time(sql, budget_ms)),
            Query::Params { sql, params } => {
                Query::params(add_max_execution_time(sql, budget_ms), params.clone())
            }
            Query::Prepared { .. } => query.clone(),
        };

        conn.execute(&hinted).await.map_err(classify)
    }
}

/// Append `MAX_EXECUTION_TIME(<ms>)` to a hint list when a deadline is set
/// and no such hint is present.
pub fn optimizer_hints(mut hints: Vec<String>, deadline: &Deadline) -> Vec<String> {
    let Some(budget_ms) = deadline.time_left_ms() else {
        return hints;
    };
    if !hints.iter().any(|hint| contains_max_execution_time(hint)) {
        hints.push(format!("{MAX_EXECUTION_TIME}({budget_ms})"));
    }
    hints
}

/// Inject a `MAX_EXECUTION_TIME` hint into a SELECT, merging with an
/// existing `/*+ ... */` block. Other statements are returned unchanged.
pub fn add_max_execution_time(sql: &str, budget_ms: u64) -> Cow<'_, str> {
    if contains_max_execution_time(sql) {
        return Cow::Borrowed(sql);
    }

    let trimmed = sql.trim_start();
    let lead = &sql[..sql.len() - trimmed.len()];
    let Some(keyword) = trimmed.get(..6).filter(|k| k.eq_ignore_ascii_case("select")) else {
        return Cow::Borrowed(sql);
    };
    let rest = &trimmed[6..];
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Cow::Borrowed(sql);
    }

    let hint = format!("{MAX_EXECUTION_TIME}({budget_ms})");
    let after_keyword = rest.trim_start();
    if let Some(block) = after_keyword.strip_prefix("/*+") {
        if let Some(end) = block.find("*/") {
            let existing = block[..end].trim();
            let tail = &block[end + 2..];
            return Cow::Owned(format!("{lead}{keyword} /*+ {existing} {hint} */{tail}"));
        }
    }

    Cow::Owned(format!("{lead}{keyword} /*+ {hint} */{rest}"))
}

fn contains_max_execution_time(text: &str) -> bool {
    text.to_ascii_uppercase().contains(MAX_EXECUTION_TIME)
}

/// Strategy selected from configuration.
#[derive(Debug, Clone, Copy)]
pub enum AnyStrategy {
    AsyncCancel(AsyncCancel),
    StatementTimeout(StatementTimeout),
    OptimizerHint(OptimizerHint),
    CheckOnly(CheckOnly),
}

impl AnyStrategy {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        match config.strategy {
            DeadlineStrategyKind::AsyncCancel => AnyStrategy::AsyncCancel(AsyncCancel),
            DeadlineStrategyKind::StatementTimeout => AnyStrategy::StatementTimeout(
                StatementTimeout::new(config.statement_timeout_restore_ms),
            ),
            DeadlineStrategyKind::OptimizerHint => AnyStrategy::OptimizerHint(OptimizerHint),
            DeadlineStrategyKind::CheckOnly => AnyStrategy::CheckOnly(CheckOnly),
        }
    }
}

impl Default for AnyStrategy {
    fn default() -> Self {
        AnyStrategy::AsyncCancel(AsyncCancel)
    }
}

#[async_trait]
impl<C> DeadlineStrategy<C> for AnyStrategy
where
    C: AsyncConnection,
{
    async fn execute(
        &self,
        conn: &mut C,
        query: &Query,
        deadline: &Deadline,
    ) -> Result<C::Output, QueryError<C::Error>> {
        match self {
            AnyStrategy::AsyncCancel(s) => s.execute(conn, query, deadline).await,
            AnyStrategy::StatementTimeout(s) => s.execute(conn, query, deadline).await,
            AnyStrategy::OptimizerHint(s) => s.execute(conn, query, deadline).await,
            AnyStrategy::CheckOnly(s) => s.execute(conn, query, deadline).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::ManualClock;
    use std::sync::Arc;

    fn deadline_with(ms: Option<u64>) -> Deadline {
        let deadline = Deadline::with_clock(Arc::new(ManualClock::new(1_000)));
        if let Some(ms) = ms {
            deadline.set(ms);
        }
        deadline
    }

    #[test]
    fn hint_is_injected_into_select() {
        assert_eq!(
            add_max_execution_time("SELECT `posts`.* FROM `posts`", 1000),
            "SELECT /*+ MAX_EXECUTION_TIME(1000) */ `posts`.* FROM `posts`"
        );
    }

    #[test]
    fn hint_merges_with_existing_block() {
        assert_eq!(
            add_max_execution_time("SELECT /*+ NO_INDEX_MERGE(posts) */ `posts`.* FROM `posts`", 1000),
            "SELECT /*+ NO_INDEX_MERGE(posts) MAX_EXECUTION_TIME(1000) */ `posts`.* FROM `posts`"
        );
    }

    #[test]
    fn existing_max_execution_time_wins() {
        let sql = "SELECT /*+ MAX_EXECUTION_TIME(500) */ 1";
        assert_eq!(add_max_execution_time(sql, 1000), sql);
    }

    #[test]
    fn non_select_statements_are_untouched() {
        for sql in ["UPDATE posts SET title = 'x'", "SELECTED_ROWS()", "  insert into t values (1)"] {
            assert_eq!(add_max_execution_time(sql, 1000), sql);
        }
    }

    #[test]
    fn leading_whitespace_and_case_are_preserved() {
        assert_eq!(
            add_max_execution_time("  select 1", 20),
            "  select /*+ MAX_EXECUTION_TIME(20) */ 1"
        );
    }

    #[test]
    fn hint_list_gains_max_execution_time_with_deadline() {
        let deadline = deadline_with(Some(1000));

        assert_eq!(optimizer_hints(vec![], &deadline), vec!["MAX_EXECUTION_TIME(1000)"]);
        assert_eq!(
            optimizer_hints(vec!["SOMETHING_ELSE".into()], &deadline),
            vec!["SOMETHING_ELSE", "MAX_EXECUTION_TIME(1000)"]
        );
        assert_eq!(
            optimizer_hints(vec!["MAX_EXECUTION_TIME(500)".into()], &deadline),
            vec!["MAX_EXECUTION_TIME(500)"]
        );
    }

    #[test]
    fn hint_list_is_untouched_without_deadline() {
        let deadline = deadline_with(None);

        assert!(optimizer_hints(vec![], &deadline).is_empty());
        assert_eq!(
            optimizer_hints(vec!["SOMETHING_ELSE".into()], &deadline),
            vec!["SOMETHING_ELSE"]
        );
    }

    #[test]
    fn statement_timeout_reset_sql() {
        assert_eq!(
            StatementTimeout::new(None).reset_sql(),
            "SET SESSION statement_timeout TO DEFAULT"
        );
        assert_eq!(
            StatementTimeout::new(Some(10_000)).reset_sql(),
            "SET SESSION statement_timeout TO 10000"
        );
        assert_eq!(StatementTimeout::set_sql(1000), "SET SESSION statement_timeout TO 1000");
    }

    #[test]
    fn strategy_follows_config() {
        let mut config = DatabaseConfig::default();
        assert!(matches!(AnyStrategy::from_config(&config), AnyStrategy::AsyncCancel(_)));

        config.strategy = DeadlineStrategyKind::StatementTimeout;
        config.statement_timeout_restore_ms = Some(5_000);
        match AnyStrategy::from_config(&config) {
            AnyStrategy::StatementTimeout(s) => assert_eq!(s.restore_ms, Some(5_000)),
            other => panic!("unexpected strategy {other:?}"),
        }
    }
}
