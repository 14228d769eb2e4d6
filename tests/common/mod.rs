//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use shed::query::{AsyncConnection, Connection, ConnectionError, Query};

/// Errors a scripted connection can raise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FakeError {
    #[error("canceling statement due to user request")]
    QueryCanceled,
    #[error("cached plan must not change result type")]
    CachedPlan,
    #[error("connection reset: {0}")]
    Io(&'static str),
}

impl ConnectionError for FakeError {
    fn is_query_canceled(&self) -> bool {
        matches!(self, FakeError::QueryCanceled)
    }

    fn is_cached_plan_failure(&self) -> bool {
        matches!(self, FakeError::CachedPlan)
    }
}

/// Every protocol call a connection received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(Query),
    Prepare { name: String, sql: String },
    Deallocate(String),
    Send(Query),
    Poll(Duration),
    Fetch,
    Cancel,
}

/// A connection whose responses are scripted per method.
///
/// Unscripted calls succeed: `execute` → "ok", `poll` → ready,
/// `fetch_result` → "row". A `poll` of `false` sleeps for the full timeout
/// first, so paused-clock tests see the budget being spent.
#[derive(Debug, Default)]
pub struct FakeConnection {
    pub calls: Vec<Call>,
    pub in_transaction: bool,
    execute: VecDeque<Result<String, FakeError>>,
    poll: VecDeque<Result<bool, FakeError>>,
    fetch: VecDeque<Result<String, FakeError>>,
    cancel: VecDeque<Result<(), FakeError>>,
    latency: Option<Duration>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inside_transaction(mut self) -> Self {
        self.in_transaction = true;
        self
    }

    /// Time each ready `poll` takes, capped at its timeout.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn on_execute(mut self, result: Result<&str, FakeError>) -> Self {
        self.execute.push_back(result.map(str::to_string));
        self
    }

    pub fn on_poll(mut self, result: Result<bool, FakeError>) -> Self {
        self.poll.push_back(result);
        self
    }

    pub fn on_fetch(mut self, result: Result<&str, FakeError>) -> Self {
        self.fetch.push_back(result.map(str::to_string));
        self
    }

    pub fn on_cancel(mut self, result: Result<(), FakeError>) -> Self {
        self.cancel.push_back(result);
        self
    }

    /// Poll never ready, cancel acknowledged, drain raises `QueryCanceled`.
    pub fn slow_query() -> Self {
        Self::new()
            .on_poll(Ok(false))
            .on_fetch(Err(FakeError::QueryCanceled))
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    pub fn sends(&self) -> usize {
        self.count(|call| matches!(call, Call::Send(_)))
    }

    pub fn cancels(&self) -> usize {
        self.count(|call| matches!(call, Call::Cancel))
    }

    pub fn fetches(&self) -> usize {
        self.count(|call| matches!(call, Call::Fetch))
    }

    /// SQL of every `execute` call.
    pub fn executed_sql(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Execute(query) => Some(query.sql().unwrap_or("<prepared>").to_string()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    type Output = String;
    type Error = FakeError;

    async fn execute(&mut self, query: &Query) -> Result<String, FakeError> {
        self.calls.push(Call::Execute(query.clone()));
        self.execute.pop_front().unwrap_or_else(|| Ok("ok".to_string()))
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), FakeError> {
        self.calls.push(Call::Prepare {
            name: name.to_string(),
            sql: sql.to_string(),
        });
        Ok(())
    }

    async fn deallocate(&mut self, name: &str) -> Result<(), FakeError> {
        self.calls.push(Call::Deallocate(name.to_string()));
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[async_trait]
impl AsyncConnection for FakeConnection {
    async fn send(&mut self, query: &Query) -> Result<(), FakeError> {
        self.calls.push(Call::Send(query.clone()));
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<bool, FakeError> {
        self.calls.push(Call::Poll(timeout));
        let result = self.poll.pop_front().unwrap_or(Ok(true));
        match (&result, self.latency) {
            (Ok(false), _) => tokio::time::sleep(timeout).await,
            (Ok(true), Some(latency)) => tokio::time::sleep(latency.min(timeout)).await,
            _ => {}
        }
        result
    }

    async fn fetch_result(&mut self) -> Result<String, FakeError> {
        self.calls.push(Call::Fetch);
        self.fetch.pop_front().unwrap_or_else(|| Ok("row".to_string()))
    }

    async fn cancel(&mut self) -> Result<(), FakeError> {
        self.calls.push(Call::Cancel);
        self.cancel.pop_front().unwrap_or(Ok(()))
    }
}
