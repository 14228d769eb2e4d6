//! Deadline propagation and load shedding for service call chains.
//!
//! A caller advertises how long it will wait (`X-Client-Timeout-Ms`); every
//! hop turns that into an absolute deadline, checks it before doing work,
//! forwards what is left to the next hop, and bounds database queries by it,
//! cancelling them server-side when it passes.

pub mod config;
pub mod deadline;
pub mod http;
pub mod observability;
pub mod query;

pub use config::ShedConfig;
pub use deadline::{Deadline, Timeout};
pub use http::ShedServer;
pub use query::{DeadlineConnection, QueryError};
