//! Gateway error taxonomy and the JSON error envelope.
//!
//! Every failure a client can observe is one of [`GatewayError`]'s variants.
//! Each variant maps to exactly one HTTP status and a stable error code, and
//! renders into the same body shape:
//!
//! ```text
//! {
//!   "error": { "code": "NO_ROUTE_FOUND", "message": "No matching route found", "details": null },
//!   "timestamp": 1718000000000,
//!   "requestId": "5f0c..."
//! }
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::http::response::GatewayResponse;

/// Low-level failure reported by a backend transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Timeouts, connect failures and I/O errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

/// Errors surfaced to clients by the dispatch pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No matching route found")]
    NoRouteFound,

    #[error("Route is unavailable: {0}")]
    RouteUnavailable(String),

    #[error("No backend configured")]
    NoBackendConfigured,

    #[error("Backend service unavailable: circuit open for {0}")]
    CircuitOpen(String),

    #[error("Cannot connect to backend service")]
    BackendUnreachable(String),

    #[error("Backend service timeout")]
    BackendTimeout(String),

    #[error("Backend service error")]
    BackendError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Filter execution failed: {0}")]
    FilterFault(String),
}

impl GatewayError {
    /// HTTP status carried by this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRouteFound => StatusCode::NOT_FOUND,
            GatewayError::RouteUnavailable(_)
            | GatewayError::NoBackendConfigured
            | GatewayError::CircuitOpen(_)
            | GatewayError::BackendTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendUnreachable(_) | GatewayError::BackendError(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::FilterFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NoRouteFound => "NO_ROUTE_FOUND",
            GatewayError::RouteUnavailable(_) => "ROUTE_UNAVAILABLE",
            GatewayError::NoBackendConfigured => "NO_BACKEND_CONFIGURED",
            GatewayError::CircuitOpen(_) => "CIRCUIT_OPEN",
            GatewayError::BackendUnreachable(_) => "BACKEND_UNREACHABLE",
            GatewayError::BackendTimeout(_) => "BACKEND_TIMEOUT",
            GatewayError::BackendError(_) => "BACKEND_ERROR",
            GatewayError::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            GatewayError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::FilterFault(_) => "FILTER_FAULT",
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            GatewayError::BackendUnreachable(d)
            | GatewayError::BackendTimeout(d)
            | GatewayError::BackendError(d) => Some(d),
            _ => None,
        }
    }

    /// Map a terminal transport failure onto the client-facing taxonomy.
    pub fn from_transport(error: &TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => GatewayError::BackendTimeout(error.to_string()),
            TransportError::Connect(_) => GatewayError::BackendUnreachable(error.to_string()),
            TransportError::Io(_) | TransportError::InvalidRequest(_) => {
                GatewayError::BackendError(error.to_string())
            }
        }
    }

    /// Render this error as a JSON response tagged with the request id.
    pub fn into_response(self, request_id: &str) -> GatewayResponse {
        let body = ErrorBody {
            error: ErrorDetails {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
            timestamp: epoch_millis(),
            request_id,
        };

        let payload = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = GatewayResponse::new(self.status()).with_body(Bytes::from(payload));
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.set_header("x-request-id", request_id);
        response
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetails<'a>,
    timestamp: u64,
    #[serde(rename = "requestId")]
    request_id: &'a str,
}

#[derive(Serialize)]
struct ErrorDetails<'a> {
    code: &'static str,
    message: String,
    details: Option<&'a str>,
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
