//! Deadline-aware query execution.
//!
//! # Data Flow
//! ```text
//! DeadlineConnection::execute(query)
//!     → Deadline::current() (unset → connection's blocking path)
//!     → strategy.rs (AsyncCancel by default)
//!         → executor.rs (send → poll(budget) → fetch | cancel → drain)
//!     → Ok(output) | QueryError::{Timeout, Connection}
//!
//! DeadlineConnection::execute_prepared(sql, params)
//!     → retry.rs (ensure_time_left each attempt)
//!         → statements.rs (get or prepare)
//!         → strategy.rs
//!     → stale plan: in transaction → PreparedStatementCacheExpired
//!                   otherwise     → evict, retry once
//! ```
//!
//! # Design Decisions
//! - Backends plug in through `Connection` / `AsyncConnection`; nothing here
//!   is tied to one database driver
//! - Timeouts are typed errors, never partial results
//! - One outstanding query per connection; the wrapper owns the connection
//!   for the whole cancel/drain sequence

pub mod connection;
pub mod deadline_connection;
pub mod error;
pub mod executor;
pub mod retry;
pub mod statements;
pub mod strategy;

pub use connection::{AsyncConnection, Connection, ConnectionError, Param, Query};
pub use deadline_connection::DeadlineConnection;
pub use error::QueryError;
pub use executor::Outcome;
pub use retry::RetryPolicy;
pub use statements::StatementCache;
pub use strategy::{AnyStrategy, AsyncCancel, CheckOnly, DeadlineStrategy, OptimizerHint, StatementTimeout};
