//! Inbound deadline middleware.
//!
//! # Responsibilities
//! - Turn `X-Client-Timeout-Ms` (minus queue time) into the request's deadline
//! - Apply a configured default upper bound
//! - Shed requests that arrive with no budget left
//! - Map `Timeout` raised anywhere below into the shed response
//! - Clear the deadline on every exit path
//!
//! # Design Decisions
//! - Settings are read from an `ArcSwap` per request so reloads apply to the
//!   next request without restarting
//! - A shed response is an empty body with the configured status
//! - Each shed is counted once, by the layer that produced it; enclosing
//!   layers pass an already counted shed through

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::PropagationConfig;
use crate::deadline::{ClearGuard, Deadline, Timeout};
use crate::http::header::parse_timeout;
use crate::observability::metrics;

/// Live propagation settings shared with the config watcher.
pub type SharedPropagation = Arc<ArcSwap<PropagationConfig>>;

/// Response extension marking a response produced by a deadline timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadShed;

/// Set on shed responses whose metric has already been recorded.
#[derive(Debug, Clone, Copy)]
struct Recorded;

impl IntoResponse for Timeout {
    fn into_response(self) -> Response {
        shed_response(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Propagate the caller's budget into the request's deadline.
pub async fn propagate(
    State(settings): State<SharedPropagation>,
    request: Request,
    next: Next,
) -> Response {
    let settings = settings.load_full();
    let guard = enter();
    let deadline = guard.deadline().clone();

    if let Some(timeout_ms) = parse_timeout(request.headers()) {
        let delta_ms = settings.queue_delta.delta_ms(request.headers());
        deadline.set(timeout_ms.saturating_sub(delta_ms));
        tracing::debug!(timeout_ms, delta_ms, "Propagated client timeout");
    }

    if !deadline.time_left() {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Request expired before processing, shedding"
        );
        metrics::record_shed("expired_on_arrival");
        return shed(&settings);
    }

    run_within(deadline, &settings, request, next).await
}

/// Apply the configured default timeout as an upper bound.
pub async fn default_timeout(
    State(settings): State<SharedPropagation>,
    request: Request,
    next: Next,
) -> Response {
    let settings = settings.load_full();
    let Some(timeout_ms) = settings.default_timeout_ms else {
        return next.run(request).await;
    };

    let guard = enter();
    let deadline = guard.deadline().clone();
    deadline.set(timeout_ms);

    run_within(deadline, &settings, request, next).await
}

/// The enclosing deadline, or a fresh one, cleared when the guard drops.
fn enter() -> ClearGuard {
    ClearGuard::new(Deadline::current().unwrap_or_default())
}

async fn run_within(
    deadline: Deadline,
    settings: &PropagationConfig,
    request: Request,
    next: Next,
) -> Response {
    let response = deadline.scope(next.run(request)).await;
    let extensions = response.extensions();
    if extensions.get::<LoadShed>().is_some() && extensions.get::<Recorded>().is_none() {
        tracing::warn!("Deadline exceeded while processing, shedding");
        metrics::record_shed("deadline_exceeded");
        return shed(settings);
    }
    response
}

fn shed(settings: &PropagationConfig) -> Response {
    let status = StatusCode::from_u16(settings.shed_status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let mut response = shed_response(status);
    response.extensions_mut().insert(Recorded);
    response
}

fn shed_response(status: StatusCode) -> Response {
    let mut response = status.into_response();
    response.extensions_mut().insert(LoadShed);
    response
}
