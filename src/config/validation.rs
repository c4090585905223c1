//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every filter name resolves and its settings parse
//! - Validate value ranges (timeouts > 0, thresholds > 0, addresses parse)
//! - Check route patterns and backend URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::schema::{FilterConfig, GatewayConfig, RouteConfig, RouteType};
use crate::filter::{build_filter, FilterResources};
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreakerRegistry};
use crate::routing::PathPattern;

/// One semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_server(config, &mut errors);
    validate_resilience(config, &mut errors);

    // Filters are compiled against throwaway resources purely to surface build errors.
    let mut resources = FilterResources::new(
        Arc::new(CircuitBreakerRegistry::new(BreakerSettings::default())),
        Instant::now(),
    );
    validate_filters("global_filters", &config.global_filters, &mut resources, &mut errors);

    for (index, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{index}]");
        validate_route(&field, route, &mut errors);
        validate_filters(&format!("{field}.filters"), &route.filters, &mut resources, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_server(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
        }
    }
}

fn validate_resilience(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be greater than 0"));
    }
    if breaker.retry_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.retry_timeout_ms", "must be greater than 0"));
    }

    let retry = &config.retry;
    if retry.base_delay_ms == 0 {
        errors.push(ValidationError::new("retry.base_delay_ms", "must be greater than 0"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            format!("must be at least base_delay_ms ({})", retry.base_delay_ms),
        ));
    }

    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }
}

fn validate_route(field: &str, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    if !route.path.starts_with('/') {
        errors.push(ValidationError::new(
            format!("{field}.path"),
            format!("'{}' must start with '/'", route.path),
        ));
    } else if let Err(e) = PathPattern::parse(&route.path) {
        errors.push(ValidationError::new(
            format!("{field}.path"),
            format!("invalid pattern '{}': {e}", route.path),
        ));
    }

    if route.timeout.connect_ms == 0 {
        errors.push(ValidationError::new(format!("{field}.timeout.connect_ms"), "must be greater than 0"));
    }
    if route.timeout.request_ms == 0 {
        errors.push(ValidationError::new(format!("{field}.timeout.request_ms"), "must be greater than 0"));
    }

    match route.route_type {
        RouteType::Proxy => {
            let backends = route.all_backends();
            if backends.is_empty() && route.enabled {
                errors.push(ValidationError::new(
                    format!("{field}.backends"),
                    "proxy route needs at least one backend",
                ));
            }
            for backend in &backends {
                if let Some(problem) = backend_problem(backend) {
                    errors.push(ValidationError::new(format!("{field}.backends"), problem));
                }
            }
        }
        RouteType::Static => match &route.response {
            None => errors.push(ValidationError::new(
                format!("{field}.response"),
                "static route needs a response section",
            )),
            Some(response) if !(100..=599).contains(&response.status) => errors.push(ValidationError::new(
                format!("{field}.response.status"),
                format!("{} is not a valid HTTP status", response.status),
            )),
            Some(_) => {}
        },
    }
}

fn backend_problem(backend: &str) -> Option<String> {
    match url::Url::parse(backend) {
        Ok(url) if url.scheme() != "http" => Some(format!("'{backend}': only http backends are supported")),
        Ok(url) if url.host_str().is_none() => Some(format!("'{backend}': missing host")),
        Ok(_) => None,
        Err(e) => Some(format!("'{backend}': {e}")),
    }
}

fn validate_filters(
    field: &str,
    filters: &[FilterConfig],
    resources: &mut FilterResources,
    errors: &mut Vec<ValidationError>,
) {
    for (index, filter) in filters.iter().enumerate() {
        if let Err(e) = build_filter(filter, resources) {
            errors.push(ValidationError::new(format!("{field}[{index}]"), e.to_string()));
        }
    }
}
