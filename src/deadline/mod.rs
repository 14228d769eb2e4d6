//! Deadline subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (X-Client-Timeout-Ms, default timeout)
//!     → Deadline::set (tighten only)
//!     → Deadline::scope (task-local for the unit of work)
//!
//! Downstream work:
//!     → deadline::time_left() / ensure_time_left() as the fast gate
//!     → deadline::time_left_ms() as the budget to forward
//!
//! Exit (success, error, timeout):
//!     → ClearGuard drops → Deadline::clear
//! ```
//!
//! # Design Decisions
//! - One absolute deadline per unit of work, on a monotonic clock
//! - Budgets only shrink unless explicitly forced
//! - Reads are lock-free; only the owning unit of work writes
//! - Ambient state is task-local and scoped, never global

pub mod clock;
pub mod context;
pub mod scope;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::{ClearGuard, Deadline, Timeout};
pub use scope::{ensure_time_left, is_set, time_left, time_left_ms};
