//! Queue-time adjustment for propagated budgets.
//!
//! Time a request spent queued in front of this process was already spent
//! from the caller's budget. `RequestStart` measures it from the routing
//! layer's `X-Request-Start` header (Unix epoch milliseconds).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName};

use crate::config::QueueDelta;

pub const X_REQUEST_START: HeaderName = HeaderName::from_static("x-request-start");

impl QueueDelta {
    /// Milliseconds to subtract from the propagated budget, measured now.
    pub fn delta_ms(&self, headers: &HeaderMap) -> u64 {
        match self {
            QueueDelta::None => 0,
            QueueDelta::RequestStart => self.delta_at(headers, epoch_ms()),
        }
    }

    /// `delta_ms` against an explicit wall-clock reading.
    ///
    /// Missing, non-integer, zero and future start times yield 0.
    pub fn delta_at(&self, headers: &HeaderMap, now_ms: u64) -> u64 {
        if *self == QueueDelta::None {
            return 0;
        }
        let started_ms = headers
            .get(&X_REQUEST_START)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);

        if started_ms == 0 || started_ms > now_ms {
            0
        } else {
            now_ms - started_ms
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
