//! Resilient backend client.
//!
//! # Responsibilities
//! - Consult the backend's circuit breaker before any network activity
//! - Build the target URI: backend base + rewritten path + original query
//! - Forward method, body and end-to-end headers
//! - Retry transport failures with exponential backoff
//! - Report one outcome per call to the circuit breaker
//! - Map terminal failures onto [`GatewayError`]
//!
//! # Design Decisions
//! - A 5xx backend response counts as a breaker failure but is returned as-is
//! - An open circuit never touches the transport

use std::sync::Arc;

use axum::http::{Request, Uri};
use bytes::Bytes;
use http_body_util::Full;
use url::{Position, Url};

use crate::backend::transport::{BackendTimeouts, Transport};
use crate::config::schema::RetryConfig;
use crate::error::{GatewayError, TransportError};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::retries::RetryPolicy;
use crate::security::headers::strip_hop_by_hop;

/// Per-route forwarding options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyOptions {
    pub timeouts: BackendTimeouts,
    pub max_retries: u32,
}

/// Forwards requests to backends through a [`Transport`].
pub struct BackendClient {
    transport: Arc<dyn Transport>,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryConfig,
}

impl BackendClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        breakers: Arc<CircuitBreakerRegistry>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            breakers,
            retry,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Forward `request` (already carrying the rewritten path) to `backend_url`.
    pub async fn proxy(
        &self,
        request: &GatewayRequest,
        backend_url: &str,
        options: &ProxyOptions,
    ) -> Result<GatewayResponse, GatewayError> {
        let breaker = self.breakers.get_or_create(backend_url);
        if !breaker.allow_request() {
            tracing::warn!(
                request_id = %request.request_id(),
                backend = %backend_url,
                "Circuit open, rejecting request"
            );
            return Err(GatewayError::CircuitOpen(backend_url.to_string()));
        }

        match self.forward_with_retries(request, backend_url, options).await {
            Ok(response) => {
                if response.status.is_server_error() {
                    breaker.record_failure();
                } else {
                    breaker.record_success();
                }
                Ok(response)
            }
            Err(e) => {
                breaker.record_failure();
                tracing::error!(
                    request_id = %request.request_id(),
                    backend = %backend_url,
                    error = %e,
                    "Backend request failed"
                );
                Err(GatewayError::from_transport(&e))
            }
        }
    }

    async fn forward_with_retries(
        &self,
        request: &GatewayRequest,
        backend_url: &str,
        options: &ProxyOptions,
    ) -> Result<GatewayResponse, TransportError> {
        let target = build_target_uri(backend_url, request.uri())?;
        let policy = RetryPolicy::new(&self.retry, options.max_retries);
        let mut attempt = 0;

        loop {
            let outbound = build_outbound(request, &target)?;
            match self.transport.send(outbound, options.timeouts).await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    let mut gateway_response = GatewayResponse::new(parts.status).with_body(body);
                    gateway_response.headers = strip_hop_by_hop(&parts.headers);
                    return Ok(gateway_response);
                }
                Err(e) if policy.should_retry(attempt, &e) => {
                    attempt += 1;
                    let delay = policy.delay_for(attempt);
                    tracing::info!(
                        request_id = %request.request_id(),
                        backend = %backend_url,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Retrying backend request"
                    );
                    metrics::record_retry(backend_url);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `scheme://authority` + backend base path (trailing `/` trimmed) + path + `?query`.
pub fn build_target_uri(backend_url: &str, request_uri: &Uri) -> Result<Uri, TransportError> {
    let base = Url::parse(backend_url)
        .map_err(|e| TransportError::InvalidRequest(format!("backend URL {backend_url}: {e}")))?;
    if base.scheme() != "http" {
        return Err(TransportError::InvalidRequest(format!(
            "unsupported backend scheme: {}",
            base.scheme()
        )));
    }
    if base.host_str().is_none() {
        return Err(TransportError::InvalidRequest(format!(
            "backend URL has no host: {backend_url}"
        )));
    }

    let authority = &base[Position::BeforeHost..Position::AfterPort];
    let base_path = base.path().trim_end_matches('/');
    let mut target = format!("{}://{}{}{}", base.scheme(), authority, base_path, request_uri.path());
    if let Some(query) = request_uri.query() {
        target.push('?');
        target.push_str(query);
    }

    target
        .parse::<Uri>()
        .map_err(|e| TransportError::InvalidRequest(format!("target URI {target}: {e}")))
}

fn build_outbound(request: &GatewayRequest, target: &Uri) -> Result<Request<Full<Bytes>>, TransportError> {
    let mut outbound = Request::builder()
        .method(request.method().clone())
        .uri(target.clone())
        .body(Full::new(request.body().clone()))
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    *outbound.headers_mut() = strip_hop_by_hop(request.headers());
    Ok(outbound)
}
