//! Health endpoint filter.
//!
//! Answers `/health`, `/health/ready` and `/health/live` directly from the
//! gateway. Liveness only reports that the process is serving; overall
//! health and readiness also report open circuits, and readiness is DOWN
//! while every known backend circuit is open.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;

use crate::error::epoch_millis;
use crate::filter::{Filter, FilterContext, FilterError, FilterResult};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;

const HEALTH_PATHS: [&str; 3] = ["/health", "/health/ready", "/health/live"];

/// The `health-check` filter.
pub struct HealthCheckFilter {
    breakers: Arc<CircuitBreakerRegistry>,
    started_at: Instant,
}

impl HealthCheckFilter {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, started_at: Instant) -> Self {
        Self { breakers, started_at }
    }

    fn report(&self, path: &str) -> (bool, serde_json::Value) {
        let uptime_secs = self.started_at.elapsed().as_secs();
        let known = self.breakers.len();
        let open = self.breakers.open_count();

        let (up, checks) = match path {
            "/health/live" => (true, json!({ "process": "UP" })),
            "/health/ready" => (
                known == 0 || open < known,
                json!({ "backends": known, "open_circuits": open }),
            ),
            _ => (true, json!({ "backends": known, "open_circuits": open })),
        };

        let body = json!({
            "status": if up { "UP" } else { "DOWN" },
            "timestamp": epoch_millis(),
            "uptime_secs": uptime_secs,
            "checks": checks,
        });
        (up, body)
    }
}

#[async_trait]
impl Filter for HealthCheckFilter {
    fn name(&self) -> &str {
        "health-check"
    }

    fn should_apply(&self, request: &GatewayRequest) -> bool {
        HEALTH_PATHS.contains(&request.path())
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let (up, body) = self.report(request.path());
        let status = if up {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        tracing::debug!(
            request_id = %ctx.request_id(),
            path = %request.path(),
            status = %status,
            "Health check answered"
        );
        Ok(FilterResult::Respond(GatewayResponse::json(status, &body)))
    }
}
