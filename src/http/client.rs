//! Outbound deadline propagation.
//!
//! Every outbound request carries the lesser of its own timeout and the
//! remaining deadline, both as its transport timeout and as
//! `X-Client-Timeout-Ms` for the next hop.

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;

use crate::deadline::{Deadline, Timeout};
use crate::http::header::{timeout_value, X_CLIENT_TIMEOUT_MS};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Timeout(#[from] Timeout),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether the request ran out of time, locally or in transport.
    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Timeout(_) => true,
            ClientError::Http(e) => e.is_timeout(),
        }
    }
}

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        if self.is_timeout() {
            Timeout.into_response()
        } else {
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Bound `request` by `deadline` and advertise the budget downstream.
///
/// Fails with `Timeout`, without touching the request, when the deadline
/// has already passed.
pub fn propagate_request(request: &mut reqwest::Request, deadline: &Deadline) -> Result<(), Timeout> {
    deadline.ensure_time_left()?;

    let budget = match (request.timeout().copied(), deadline.remaining()) {
        (Some(own), Some(left)) => Some(own.min(left)),
        (own, left) => own.or(left),
    };

    if let Some(budget) = budget {
        let ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        *request.timeout_mut() = Some(budget);
        // A sub-millisecond budget would read as "already expired" downstream.
        if ms > 0 {
            request.headers_mut().insert(X_CLIENT_TIMEOUT_MS, timeout_value(ms));
        }
    }
    Ok(())
}

/// A `reqwest::Client` that propagates the current task's deadline.
#[derive(Debug, Clone, Default)]
pub struct DeadlineClient {
    client: reqwest::Client,
    max_timeout: Option<Duration>,
}

impl DeadlineClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_timeout: None,
        }
    }

    /// Timeout for requests that set none of their own.
    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, ClientError> {
        let deadline = Deadline::current().unwrap_or_default();
        self.execute_with(request, &deadline).await
    }

    pub async fn execute_with(
        &self,
        mut request: reqwest::Request,
        deadline: &Deadline,
    ) -> Result<reqwest::Response, ClientError> {
        if request.timeout().is_none() {
            *request.timeout_mut() = self.max_timeout;
        }
        propagate_request(&mut request, deadline)?;

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            timeout = ?request.timeout(),
            "Sending outbound request"
        );
        Ok(self.client.execute(request).await?)
    }
}
