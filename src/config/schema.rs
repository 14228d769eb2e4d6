//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! gateway and the database integration. All types derive Serde traits
//! for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ShedConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Inbound deadline propagation and load shedding.
    pub propagation: PropagationConfig,

    /// Where the gateway forwards requests.
    pub upstream: UpstreamConfig,

    /// Deadline enforcement for database queries.
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How inbound budgets are established and enforced.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PropagationConfig {
    /// Upper bound applied to every request, in milliseconds.
    pub default_timeout_ms: Option<u64>,

    /// Queue time subtracted from the propagated budget.
    pub queue_delta: QueueDelta,

    /// Status returned when a request is shed.
    pub shed_status: u16,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            queue_delta: QueueDelta::None,
            shed_status: 503,
        }
    }
}

/// Source of the queue-time adjustment.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueDelta {
    /// No adjustment.
    #[default]
    None,
    /// Time since the routing layer's `X-Request-Start` (Unix epoch ms).
    RequestStart,
}

/// Upstream the gateway forwards to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL. Without one the gateway echoes the remaining budget.
    pub url: Option<Url>,

    /// Upper bound for requests that carry no deadline, in milliseconds.
    pub max_timeout_ms: Option<u64>,

    /// Largest request body forwarded, in bytes.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_timeout_ms: None,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Database deadline enforcement.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// How queries are bounded by the deadline.
    pub strategy: DeadlineStrategyKind,

    /// Connection-level statement_timeout to restore after each query (ms).
    pub statement_timeout_restore_ms: Option<u64>,

    /// Retries of a prepared statement whose cached plan expired (0 or 1).
    pub prepared_statement_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            strategy: DeadlineStrategyKind::AsyncCancel,
            statement_timeout_restore_ms: None,
            prepared_statement_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineStrategyKind {
    #[default]
    AsyncCancel,
    StatementTimeout,
    OptimizerHint,
    CheckOnly,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
