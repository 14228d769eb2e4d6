//! Per-connection prepared statement cache.
//!
//! # Responsibilities
//! - Map SQL text to the name it was prepared under
//! - Prepare on first use, reuse afterwards
//! - Evict stale entries and release them on the server
//!
//! # Design Decisions
//! - Names are never reused (`shed_<n>` from a counter), so re-preparing
//!   after an eviction cannot collide with a statement the server still holds
//! - Failure to deallocate is logged, not raised; the entry is gone either way

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::query::connection::Connection;

/// SQL → statement name map for one connection.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: DashMap<String, String>,
    counter: AtomicU64,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name `sql` was prepared under, if cached.
    pub fn get(&self, sql: &str) -> Option<String> {
        self.statements.get(sql).map(|name| name.value().clone())
    }

    /// Return the cached name for `sql`, preparing it first if needed.
    pub async fn prepare<C: Connection>(&self, conn: &mut C, sql: &str) -> Result<String, C::Error> {
        if let Some(name) = self.get(sql) {
            return Ok(name);
        }

        let name = self.next_name();
        conn.prepare(&name, sql).await?;
        tracing::debug!(statement = %name, "Prepared statement");
        self.statements.insert(sql.to_string(), name.clone());
        Ok(name)
    }

    /// Forget `sql` and deallocate its statement on the server.
    pub async fn evict<C: Connection>(&self, conn: &mut C, sql: &str) {
        let Some((_, name)) = self.statements.remove(sql) else {
            return;
        };

        if let Err(e) = conn.deallocate(&name).await {
            tracing::warn!(statement = %name, error = %e, "Failed to deallocate prepared statement");
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Drop every entry without touching the server (e.g. after reconnecting).
    pub fn clear(&self) {
        self.statements.clear();
    }

    fn next_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("shed_{n}")
    }
}
