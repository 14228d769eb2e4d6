//! Query error taxonomy.

use crate::deadline::Timeout;
use crate::query::connection::ConnectionError;

/// Error from deadline-aware query execution.
///
/// `Timeout` is the only variant manufactured here; everything else is the
/// backend's own error, passed through.
#[derive(Debug, thiserror::Error)]
pub enum QueryError<E> {
    /// The deadline passed before or during the query.
    #[error(transparent)]
    Timeout(#[from] Timeout),

    /// A cached plan went stale while inside a transaction, where retrying
    /// cannot help.
    #[error("prepared statement cache expired inside a transaction: {0}")]
    PreparedStatementCacheExpired(#[source] E),

    /// Error raised by the underlying connection.
    #[error(transparent)]
    Connection(E),
}

impl<E> QueryError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout(_))
    }

    /// The backend error, if this is not a timeout.
    pub fn connection_error(&self) -> Option<&E> {
        match self {
            QueryError::Timeout(_) => None,
            QueryError::PreparedStatementCacheExpired(e) | QueryError::Connection(e) => Some(e),
        }
    }
}

impl<E: ConnectionError> ConnectionError for QueryError<E> {
    fn is_query_canceled(&self) -> bool {
        match self {
            QueryError::Connection(e) => e.is_query_canceled(),
            _ => false,
        }
    }

    fn is_cached_plan_failure(&self) -> bool {
        match self {
            QueryError::Connection(e) => e.is_cached_plan_failure(),
            _ => false,
        }
    }
}
