//! Connection capabilities consumed by deadline-aware execution.
//!
//! # Responsibilities
//! - Describe a query independent of the backend
//! - Expose the ordinary blocking path (`Connection`)
//! - Expose the non-blocking protocol: send → poll → fetch / cancel
//!   (`AsyncConnection`)
//! - Let backends classify their own errors (`ConnectionError`)
//!
//! # Design Decisions
//! - One query outstanding per connection; every method takes `&mut self`
//! - Params use the text protocol: `None` is SQL NULL

use std::time::Duration;

use async_trait::async_trait;

/// A text-protocol parameter value. `None` is SQL NULL.
pub type Param = Option<String>;

/// A query to run on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Plain SQL without parameters.
    Simple { sql: String },
    /// SQL with positional parameters.
    Params { sql: String, params: Vec<Param> },
    /// Execution of a statement previously prepared under `name`.
    Prepared { name: String, params: Vec<Param> },
}

impl Query {
    pub fn simple(sql: impl Into<String>) -> Self {
        Query::Simple { sql: sql.into() }
    }

    pub fn params(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Query::Params {
            sql: sql.into(),
            params,
        }
    }

    pub fn prepared(name: impl Into<String>, params: Vec<Param>) -> Self {
        Query::Prepared {
            name: name.into(),
            params,
        }
    }

    /// SQL text, if the query carries any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Query::Simple { sql } | Query::Params { sql, .. } => Some(sql),
            Query::Prepared { .. } => None,
        }
    }
}

/// Classification hooks for a backend's error type.
pub trait ConnectionError: std::error::Error + Send + Sync + 'static {
    /// The server aborted the query at our request (e.g. SQLSTATE 57014).
    fn is_query_canceled(&self) -> bool;

    /// A prepared statement's cached plan is no longer valid (e.g. after a
    /// schema change).
    fn is_cached_plan_failure(&self) -> bool {
        false
    }
}

/// Ordinary, blocking query execution.
#[async_trait]
pub trait Connection: Send {
    type Output: Send;
    type Error: ConnectionError;

    /// Run a query to completion.
    async fn execute(&mut self, query: &Query) -> Result<Self::Output, Self::Error>;

    /// Prepare `sql` on the server under `name`.
    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), Self::Error>;

    /// Drop the server-side statement `name`.
    async fn deallocate(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Whether a transaction is open on this connection.
    fn in_transaction(&self) -> bool;
}

/// Non-blocking query protocol.
///
/// After `send`, exactly one of `fetch_result` (when `poll` reported ready)
/// or `cancel` followed by `fetch_result` must run before the connection
/// accepts another query.
#[async_trait]
pub trait AsyncConnection: Connection {
    /// Dispatch the query without waiting for a result.
    async fn send(&mut self, query: &Query) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for a result. `true` when one is ready.
    async fn poll(&mut self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Take the result of the outstanding query, draining the connection.
    async fn fetch_result(&mut self) -> Result<Self::Output, Self::Error>;

    /// Ask the server to abort the outstanding query.
    async fn cancel(&mut self) -> Result<(), Self::Error>;
}
