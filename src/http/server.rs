//! Deadline-aware HTTP gateway.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (request ID, tracing, metrics, deadline propagation)
//! - Forward requests to the configured upstream with the remaining budget
//! - Without an upstream, report the remaining budget (useful for probing
//!   a deployment's propagation settings)

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::config::ShedConfig;
use crate::deadline;
use crate::http::client::{ClientError, DeadlineClient};
use crate::http::header::X_CLIENT_TIMEOUT_MS;
use crate::http::propagate::{default_timeout, propagate, SharedPropagation};
use crate::http::request_id::UuidRequestId;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Option<Url>,
    pub client: DeadlineClient,
    pub max_body_bytes: usize,
}

/// The gateway server.
pub struct ShedServer {
    router: Router,
    config: ShedConfig,
    propagation: SharedPropagation,
}

impl ShedServer {
    pub fn new(config: ShedConfig) -> Result<Self, reqwest::Error> {
        let mut client = DeadlineClient::new(reqwest::Client::builder().build()?);
        if let Some(ms) = config.upstream.max_timeout_ms {
            client = client.with_max_timeout(Duration::from_millis(ms));
        }

        let state = AppState {
            upstream: config.upstream.url.clone(),
            client,
            max_body_bytes: config.upstream.max_body_bytes,
        };
        let propagation = Arc::new(ArcSwap::from_pointee(config.propagation.clone()));
        let router = build_router(state, propagation.clone());

        Ok(Self {
            router,
            config,
            propagation,
        })
    }

    /// The live propagation settings; store into it to reconfigure.
    pub fn propagation(&self) -> SharedPropagation {
        self.propagation.clone()
    }

    pub fn config(&self) -> &ShedConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = ?self.config.upstream.url.as_ref().map(Url::as_str),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router. Layers run outermost first: request ID, trace,
/// metrics, default timeout, propagation, handler.
pub fn build_router(state: AppState, propagation: SharedPropagation) -> Router {
    Router::new()
        .route("/", any(gateway_handler))
        .route("/{*path}", any(gateway_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(propagation.clone(), propagate))
        .layer(middleware::from_fn_with_state(propagation, default_timeout))
        .layer(middleware::from_fn(record_metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn gateway_handler(State(state): State<AppState>, request: Request) -> Response {
    match &state.upstream {
        Some(upstream) => match forward(&state, upstream, request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(error = %e, "Upstream ran out of budget");
                } else {
                    tracing::error!(error = %e, "Upstream error");
                }
                e.into_response()
            }
        },
        None => budget_report(),
    }
}

fn budget_report() -> Response {
    if let Err(timeout) = deadline::ensure_time_left() {
        return timeout.into_response();
    }
    Json(json!({ "time_left_ms": deadline::time_left_ms() })).into_response()
}

async fn forward(state: &AppState, upstream: &Url, request: Request) -> Result<Response, ClientError> {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, limit = state.max_body_bytes, "Request body rejected");
            return Ok(StatusCode::PAYLOAD_TOO_LARGE.into_response());
        }
    };

    let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let target = match Url::parse(&format!("{}{}", upstream.as_str().trim_end_matches('/'), path)) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, path, "Unroutable request path");
            return Ok(StatusCode::BAD_REQUEST.into_response());
        }
    };

    let mut outbound = reqwest::Request::new(parts.method, target);
    *outbound.headers_mut() = forwarded_headers(parts.headers);
    *outbound.body_mut() = Some(body.into());

    let response = state.client.execute(outbound).await?;
    let status = response.status();
    let headers = forwarded_headers(response.headers().clone());
    let body = response.bytes().await?;

    Ok((status, headers, Body::from(body)).into_response())
}

/// Strip hop-by-hop headers and any stale propagated budget.
fn forwarded_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in [
        header::HOST,
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        X_CLIENT_TIMEOUT_MS,
    ] {
        headers.remove(name);
    }
    headers
}
