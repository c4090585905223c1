//! Rate-limiting filter.
//!
//! Derives a key per request (client IP, user id, API key, a header, or a
//! combination), spends one token from that key's bucket, and answers 429
//! with `Retry-After` when the bucket is empty. Allowed requests get the
//! `X-RateLimit-*` headers on their response.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::filter::{Filter, FilterBuildError, FilterContext, FilterError, FilterResult};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::observability::metrics;
use crate::security::rate_limit::{RateLimitDecision, TokenBucketLimiter};

const ATTR_LIMIT: &str = "rate-limit.limit";
const ATTR_REMAINING: &str = "rate-limit.remaining";
const ATTR_RESET: &str = "rate-limit.reset-time";
const ATTR_KEY: &str = "rate-limit.key";

/// How the bucket key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    #[default]
    ClientIp,
    /// `user.id` set by authentication, else client IP.
    UserId,
    /// `X-API-Key` header or `api_key` query parameter, else client IP.
    ApiKey,
    /// The header named by `custom_header`, else client IP.
    Custom,
    /// Join the `composite` key types with `:`.
    Composite,
}

/// Settings for the `rate-limiting` filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst_capacity: u32,
    pub key_type: KeyType,
    pub custom_header: String,
    pub composite: Vec<KeyType>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 10,
            key_type: KeyType::ClientIp,
            custom_header: "X-Client-ID".to_string(),
            composite: Vec::new(),
        }
    }
}

/// Compiled key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExtractor {
    ClientIp,
    UserId,
    ApiKey,
    Header(String),
    Composite(Vec<KeyExtractor>),
}

impl KeyExtractor {
    fn from_settings(settings: &RateLimitSettings) -> Result<Self, FilterBuildError> {
        let single = |key_type: KeyType| -> Result<KeyExtractor, FilterBuildError> {
            Ok(match key_type {
                KeyType::ClientIp => KeyExtractor::ClientIp,
                KeyType::UserId => KeyExtractor::UserId,
                KeyType::ApiKey => KeyExtractor::ApiKey,
                KeyType::Custom => KeyExtractor::Header(settings.custom_header.clone()),
                KeyType::Composite => {
                    return Err(FilterBuildError::InvalidSettings {
                        name: "rate-limiting".into(),
                        message: "composite keys cannot nest".into(),
                    })
                }
            })
        };

        match settings.key_type {
            KeyType::Composite if settings.composite.is_empty() => Err(FilterBuildError::InvalidSettings {
                name: "rate-limiting".into(),
                message: "composite key type needs at least one entry in `composite`".into(),
            }),
            KeyType::Composite => Ok(KeyExtractor::Composite(
                settings
                    .composite
                    .iter()
                    .map(|k| single(*k))
                    .collect::<Result<_, _>>()?,
            )),
            other => single(other),
        }
    }

    pub fn extract(&self, request: &GatewayRequest, ctx: &FilterContext) -> String {
        match self {
            KeyExtractor::ClientIp => request.client_ip(),
            KeyExtractor::UserId => ctx
                .attribute_str("user.id")
                .map(str::to_string)
                .unwrap_or_else(|| request.client_ip()),
            KeyExtractor::ApiKey => request
                .header("x-api-key")
                .or_else(|| request.query_param("api_key"))
                .map(str::to_string)
                .unwrap_or_else(|| request.client_ip()),
            KeyExtractor::Header(name) => request
                .header(name)
                .map(str::to_string)
                .unwrap_or_else(|| request.client_ip()),
            KeyExtractor::Composite(parts) => parts
                .iter()
                .map(|part| part.extract(request, ctx))
                .collect::<Vec<_>>()
                .join(":"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            KeyExtractor::ClientIp => "client-ip",
            KeyExtractor::UserId => "user-id",
            KeyExtractor::ApiKey => "api-key",
            KeyExtractor::Header(_) => "custom",
            KeyExtractor::Composite(_) => "composite",
        }
    }
}

/// The `rate-limiting` filter.
pub struct RateLimitingFilter {
    limiter: Arc<TokenBucketLimiter>,
    extractor: KeyExtractor,
}

impl RateLimitingFilter {
    pub fn new(settings: RateLimitSettings) -> Result<Self, FilterBuildError> {
        Self::with_limiter(settings, |rpm, burst| Arc::new(TokenBucketLimiter::new(rpm, burst)))
    }

    /// Validate `settings`, then take buckets from `limiter_for(rpm, burst)`.
    pub fn with_limiter(
        settings: RateLimitSettings,
        limiter_for: impl FnOnce(u32, u32) -> Arc<TokenBucketLimiter>,
    ) -> Result<Self, FilterBuildError> {
        if settings.requests_per_minute == 0 || settings.burst_capacity == 0 {
            return Err(FilterBuildError::InvalidSettings {
                name: "rate-limiting".into(),
                message: "requests_per_minute and burst_capacity must be positive".into(),
            });
        }
        let extractor = KeyExtractor::from_settings(&settings)?;
        Ok(Self {
            extractor,
            limiter: limiter_for(settings.requests_per_minute, settings.burst_capacity),
        })
    }

    fn too_many_requests(decision: &RateLimitDecision, request_id: &str) -> GatewayResponse {
        let mut response = GatewayError::RateLimitExceeded.into_response(request_id);
        response.set_header("X-RateLimit-Limit", &decision.limit.to_string());
        response.set_header("X-RateLimit-Remaining", "0");
        response.set_header("X-RateLimit-Reset", &decision.reset_at.to_string());
        response.set_header("Retry-After", &decision.retry_after_secs.to_string());
        response
    }
}

#[async_trait]
impl Filter for RateLimitingFilter {
    fn name(&self) -> &str {
        "rate-limiting"
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let key = self.extractor.extract(request, ctx);
        let decision = self.limiter.try_acquire(&key);

        if decision.allowed {
            tracing::debug!(
                request_id = %ctx.request_id(),
                key = %key,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
            ctx.set_attribute(ATTR_KEY, key);
            ctx.set_attribute(ATTR_LIMIT, u64::from(decision.limit));
            ctx.set_attribute(ATTR_REMAINING, decision.remaining);
            ctx.set_attribute(ATTR_RESET, decision.reset_at);
            Ok(FilterResult::Proceed)
        } else {
            tracing::warn!(
                request_id = %ctx.request_id(),
                key = %key,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(self.extractor.label());
            Ok(FilterResult::Respond(Self::too_many_requests(&decision, ctx.request_id())))
        }
    }

    async fn process_response(
        &self,
        response: &GatewayResponse,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let Some(remaining) = ctx.attribute_u64(ATTR_REMAINING) else {
            return Ok(FilterResult::Proceed);
        };

        let mut decorated = response.clone();
        if let Some(limit) = ctx.attribute_u64(ATTR_LIMIT) {
            decorated.set_header("X-RateLimit-Limit", &limit.to_string());
        }
        decorated.set_header("X-RateLimit-Remaining", &remaining.to_string());
        if let Some(reset) = ctx.attribute_u64(ATTR_RESET) {
            decorated.set_header("X-RateLimit-Reset", &reset.to_string());
        }
        Ok(FilterResult::Respond(decorated))
    }
}
