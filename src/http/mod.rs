//! HTTP adapters around the deadline core.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request_id.rs (x-request-id)
//!     → propagate.rs default_timeout (upper bound)
//!     → propagate.rs propagate (X-Client-Timeout-Ms − delta.rs queue time)
//!         → shed now if no budget is left
//!     → server.rs handler
//!         → client.rs (min(own timeout, remaining) → X-Client-Timeout-Ms)
//!         → upstream
//!     ← Timeout anywhere below → shed response
//!     ← deadline cleared
//! ```

pub mod client;
pub mod delta;
pub mod header;
pub mod propagate;
pub mod request_id;
pub mod server;

pub use client::{propagate_request, ClientError, DeadlineClient};
pub use header::{parse_timeout, timeout_value, X_CLIENT_TIMEOUT_MS};
pub use propagate::{default_timeout, propagate, LoadShed, SharedPropagation};
pub use request_id::UuidRequestId;
pub use server::{build_router, AppState, ShedServer};
