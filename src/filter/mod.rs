//! Filter pipeline subsystem.
//!
//! # Responsibilities
//! - Define the [`Filter`] capability every pipeline stage implements
//! - Resolve configured filter names into concrete filters at load time
//! - Run request-phase and response-phase passes over an ordered chain
//!
//! # Data Flow
//! ```text
//! Route resolved
//!     → chain = global filters ++ route filters ++ terminal handler
//!     → chain.rs request phase:
//!         for each filter: should_apply? → process
//!             Respond(r) → stop, r is the response
//!             Proceed + context terminated → stop without a response
//!             fault → 500 naming the filter
//!     → terminal handler (terminal.rs): static body or backend call
//!     → chain.rs response phase: every applicable filter may replace the response
//! ```
//!
//! # Design Decisions
//! - Filter kinds are a closed set resolved once per configuration load
//! - Filters hold no per-request state; shared state (token buckets) lives
//!   behind the filter instance and outlives requests
//! - Header changes produce a new request in the context, never in-place edits
//! - A panic inside a filter is contained and reported like any other fault

pub mod auth;
pub mod chain;
pub mod context;
pub mod headers;
pub mod health;
pub mod logging;
pub mod rate_limit;
pub mod terminal;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::FilterConfig;
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::security::rate_limit::TokenBucketLimiter;

pub use chain::FilterChain;
pub use context::FilterContext;

/// What a filter decided.
#[derive(Debug, Clone)]
pub enum FilterResult {
    /// Continue with the next filter (or keep the current response).
    Proceed,
    /// Stop here with this response (or replace the current response).
    Respond(GatewayResponse),
}

/// Unexpected failure inside a filter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

/// Failure turning a filter configuration into a filter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterBuildError {
    #[error("unknown filter: {0}")]
    Unknown(String),

    #[error("invalid settings for filter '{name}': {message}")]
    InvalidSettings { name: String, message: String },
}

/// One pipeline stage.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this filter runs for `request`.
    fn should_apply(&self, _request: &GatewayRequest) -> bool {
        true
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError>;

    /// Inspect the response on its way out; `Respond` replaces it.
    async fn process_response(
        &self,
        _response: &GatewayResponse,
        _ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        Ok(FilterResult::Proceed)
    }
}

/// The closed set of configurable filter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Logging,
    Authentication,
    RateLimiting,
    HeaderTransformer,
    HealthCheck,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Logging => "logging",
            FilterKind::Authentication => "authentication",
            FilterKind::RateLimiting => "rate-limiting",
            FilterKind::HeaderTransformer => "header-transformer",
            FilterKind::HealthCheck => "health-check",
        }
    }
}

impl FromStr for FilterKind {
    type Err = FilterBuildError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "logging" => Ok(FilterKind::Logging),
            "authentication" | "auth" => Ok(FilterKind::Authentication),
            "rate-limiting" | "rate-limit" => Ok(FilterKind::RateLimiting),
            "header-transformer" | "headers" => Ok(FilterKind::HeaderTransformer),
            "health-check" | "health" => Ok(FilterKind::HealthCheck),
            _ => Err(FilterBuildError::Unknown(name.to_string())),
        }
    }
}

/// A limiter and the position of its filter in the configuration.
///
/// `scope` is the owning route's path (or `<global>`), `ordinal` counts
/// rate-limiting filters within that scope.
#[derive(Debug, Clone)]
pub struct LimiterSlot {
    pub scope: String,
    pub ordinal: usize,
    pub limiter: Arc<TokenBucketLimiter>,
}

/// Shared state handed to filters when they are built.
pub struct FilterResources {
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub started_at: Instant,
    /// Every limiter used by this build, for admin resets and eviction.
    pub limiters: Vec<LimiterSlot>,
    previous: Vec<LimiterSlot>,
    scope: String,
}

impl FilterResources {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, started_at: Instant) -> Self {
        Self {
            breakers,
            started_at,
            limiters: Vec::new(),
            previous: Vec::new(),
            scope: String::new(),
        }
    }

    /// Limiters of the configuration being replaced. A filter at the same
    /// slot with the same rate and burst keeps its buckets.
    pub fn with_previous(mut self, previous: Vec<LimiterSlot>) -> Self {
        self.previous = previous;
        self
    }

    /// Attribute the filters built next to `scope`.
    pub fn enter_scope(&mut self, scope: &str) {
        self.scope = scope.to_string();
    }

    fn limiter_for(&mut self, requests_per_minute: u32, burst: u32) -> Arc<TokenBucketLimiter> {
        let ordinal = self.limiters.iter().filter(|slot| slot.scope == self.scope).count();
        let limiter = self
            .previous
            .iter()
            .find(|slot| {
                slot.scope == self.scope
                    && slot.ordinal == ordinal
                    && slot.limiter.has_rate(requests_per_minute, burst)
            })
            .map(|slot| slot.limiter.clone())
            .unwrap_or_else(|| Arc::new(TokenBucketLimiter::new(requests_per_minute, burst)));

        self.limiters.push(LimiterSlot {
            scope: self.scope.clone(),
            ordinal,
            limiter: limiter.clone(),
        });
        limiter
    }
}

/// Build the filter a configuration entry names.
pub fn build_filter(
    config: &FilterConfig,
    resources: &mut FilterResources,
) -> Result<Arc<dyn Filter>, FilterBuildError> {
    let kind: FilterKind = config.name.parse()?;
    let name = kind.as_str();

    let filter: Arc<dyn Filter> = match kind {
        FilterKind::Logging => Arc::new(logging::LoggingFilter::new(parse_settings(name, &config.config)?)),
        FilterKind::Authentication => {
            Arc::new(auth::AuthenticationFilter::new(parse_settings(name, &config.config)?)?)
        }
        FilterKind::RateLimiting => {
            Arc::new(rate_limit::RateLimitingFilter::with_limiter(
                parse_settings(name, &config.config)?,
                |rpm, burst| resources.limiter_for(rpm, burst),
            )?)
        }
        FilterKind::HeaderTransformer => {
            Arc::new(headers::HeaderTransformerFilter::new(parse_settings(name, &config.config)?)?)
        }
        FilterKind::HealthCheck => Arc::new(health::HealthCheckFilter::new(
            resources.breakers.clone(),
            resources.started_at,
        )),
    };
    Ok(filter)
}

/// Build every enabled filter in `configs`, preserving order.
pub fn build_filters(
    configs: &[FilterConfig],
    resources: &mut FilterResources,
) -> Result<Vec<Arc<dyn Filter>>, FilterBuildError> {
    configs
        .iter()
        .filter(|config| config.enabled)
        .map(|config| build_filter(config, resources))
        .collect()
}

/// Deserialize a filter's settings; a missing section means defaults.
pub(crate) fn parse_settings<T: DeserializeOwned + Default>(
    name: &str,
    value: &serde_json::Value,
) -> Result<T, FilterBuildError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| FilterBuildError::InvalidSettings {
        name: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::BreakerSettings;
    use serde_json::json;

    fn resources() -> FilterResources {
        FilterResources::new(
            Arc::new(CircuitBreakerRegistry::new(BreakerSettings::default())),
            Instant::now(),
        )
    }

    #[test]
    fn test_filter_kind_names() {
        assert_eq!("rate-limiting".parse::<FilterKind>().unwrap(), FilterKind::RateLimiting);
        assert_eq!("Auth".parse::<FilterKind>().unwrap(), FilterKind::Authentication);
        assert_eq!(
            "compression".parse::<FilterKind>().unwrap_err(),
            FilterBuildError::Unknown("compression".into())
        );
    }

    #[test]
    fn test_build_skips_disabled_and_collects_limiters() {
        let mut disabled = FilterConfig::new("logging", json!(null));
        disabled.enabled = false;
        let configs = vec![
            disabled,
            FilterConfig::new("rate-limiting", json!({ "requests_per_minute": 120 })),
            FilterConfig::new("header-transformer", json!(null)),
        ];

        let mut resources = resources();
        let filters = build_filters(&configs, &mut resources).unwrap();
        let names: Vec<&str> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["rate-limiting", "header-transformer"]);
        assert_eq!(resources.limiters.len(), 1);
    }

    #[test]
    fn test_matching_slots_keep_their_limiter() {
        let configs = vec![
            FilterConfig::new("rate-limiting", json!({ "requests_per_minute": 60 })),
            FilterConfig::new("rate-limiting", json!({ "requests_per_minute": 60 })),
        ];
        let mut first = resources();
        first.enter_scope("/api/*");
        build_filters(&configs, &mut first).unwrap();
        assert_eq!(first.limiters[1].ordinal, 1);

        let mut same = resources().with_previous(first.limiters.clone());
        same.enter_scope("/api/*");
        build_filters(&configs, &mut same).unwrap();
        assert!(Arc::ptr_eq(&same.limiters[0].limiter, &first.limiters[0].limiter));
        assert!(Arc::ptr_eq(&same.limiters[1].limiter, &first.limiters[1].limiter));

        let mut moved = resources().with_previous(first.limiters.clone());
        moved.enter_scope("/other");
        build_filters(&configs[..1], &mut moved).unwrap();
        assert!(!Arc::ptr_eq(&moved.limiters[0].limiter, &first.limiters[0].limiter));

        let faster = vec![FilterConfig::new("rate-limiting", json!({ "requests_per_minute": 120 }))];
        let mut changed = resources().with_previous(first.limiters.clone());
        changed.enter_scope("/api/*");
        build_filters(&faster, &mut changed).unwrap();
        assert!(!Arc::ptr_eq(&changed.limiters[0].limiter, &first.limiters[0].limiter));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = FilterConfig::new("rate-limiting", json!({ "requests_per_minute": "lots" }));
        let err = build_filter(&config, &mut resources()).err().unwrap();
        assert!(matches!(err, FilterBuildError::InvalidSettings { .. }));
    }
}
