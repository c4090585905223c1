//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Per-filter settings stay as opaque JSON here and are parsed by the filter
//! that owns them when the route table is compiled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and body-limit settings.
    pub server: ServerConfig,

    /// Ordered route definitions; the first match wins.
    pub routes: Vec<RouteConfig>,

    /// Filters that run before every route's own filters.
    pub global_filters: Vec<FilterConfig>,

    /// Per-backend circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Backoff between backend retry attempts.
    pub retry: RetryConfig,

    /// Rate limiter bucket housekeeping.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum buffered request body size.
    pub max_body_bytes: usize,

    /// Overall deadline for a client request, including retries.
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 120,
            drain_timeout_secs: 30,
        }
    }
}

/// How a route produces its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    #[default]
    Proxy,
    Static,
}

/// Backend selection strategy for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancerKind {
    #[default]
    RoundRobin,
    Random,
}

/// A route mapping a path pattern to a backend set or a static response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern: exact, `/prefix/*`, or a glob containing `*`.
    pub path: String,

    #[serde(rename = "type", default)]
    pub route_type: RouteType,

    /// Single backend URL; merged with `backends`.
    #[serde(default)]
    pub backend: Option<String>,

    #[serde(default)]
    pub backends: Vec<String>,

    #[serde(default)]
    pub strip_prefix: Option<String>,

    #[serde(default)]
    pub add_prefix: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub load_balancer: LoadBalancerKind,

    #[serde(default)]
    pub timeout: RouteTimeoutConfig,

    /// Response served by `type = "static"` routes.
    #[serde(default)]
    pub response: Option<StaticResponseConfig>,

    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

impl RouteConfig {
    /// A proxy route forwarding to `backends`.
    pub fn proxy(path: impl Into<String>, backends: Vec<String>) -> Self {
        Self {
            path: path.into(),
            route_type: RouteType::Proxy,
            backend: None,
            backends,
            strip_prefix: None,
            add_prefix: None,
            enabled: true,
            load_balancer: LoadBalancerKind::default(),
            timeout: RouteTimeoutConfig::default(),
            response: None,
            filters: Vec::new(),
        }
    }

    /// A static route answering with `status` and `body`.
    pub fn static_response(path: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            route_type: RouteType::Static,
            response: Some(StaticResponseConfig {
                status,
                body: body.into(),
                ..StaticResponseConfig::default()
            }),
            ..Self::proxy(path, Vec::new())
        }
    }

    /// All backend URLs: `backend` first, then `backends`, without duplicates.
    pub fn all_backends(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::with_capacity(self.backends.len() + 1);
        for url in self.backend.iter().chain(self.backends.iter()) {
            let url = url.trim();
            if !url.is_empty() && !all.iter().any(|existing| existing == url) {
                all.push(url.to_string());
            }
        }
        all
    }
}

/// Per-route backend timeouts and retry budget.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouteTimeoutConfig {
    pub connect_ms: u64,
    pub request_ms: u64,
    pub max_retries: u32,
}

impl Default for RouteTimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            request_ms: 30_000,
            max_retries: 3,
        }
    }
}

/// Canned response for static routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticResponseConfig {
    pub status: u16,
    pub body: String,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for StaticResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/plain".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

/// A filter reference with its opaque settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Filter kind: logging, authentication, rate-limiting, header-transformer, health-check.
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub config: serde_json::Value,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config,
        }
    }
}

/// Circuit breaker configuration, shared by every backend's breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Accepted for compatibility; failures are not aged out, so the
    /// breaker state machine does not read it.
    pub open_timeout_ms: u64,

    /// Time an open circuit waits before admitting a trial request.
    pub retry_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
            retry_timeout_ms: 10_000,
        }
    }
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        }
    }
}

/// Rate limiter housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Buckets idle and full for longer than this are evicted.
    pub idle_ttl_secs: u64,

    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable text.
    pub json_logs: bool,

    pub metrics_enabled: bool,

    /// Prometheus scrape listener (e.g., "0.0.0.0:9090").
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "dispatch_gateway=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// Bearer key required on every admin request.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: "change-me-admin-key".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}
