//! Authentication filter and credential providers.
//!
//! # Responsibilities
//! - Extract credentials (Bearer token or API key) from the request
//! - Validate them through a configurable [`AuthProvider`]
//! - Publish the caller's identity as `user.*` context attributes
//! - Reject unauthenticated requests with 401
//!
//! # Design Decisions
//! - Skip paths use the same pattern syntax as routes and are checked in `should_apply`
//! - Providers are synchronous; none of them perform I/O
//! - JWTs are verified with HS256 and a required issuer; `exp` is enforced when present

use std::collections::HashSet;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::filter::{Filter, FilterBuildError, FilterContext, FilterError, FilterResult};
use crate::http::request::GatewayRequest;
use crate::routing::matcher::PathPattern;

/// Which credential the filter demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    #[serde(alias = "bearer")]
    BearerToken,
    #[serde(alias = "apikey")]
    ApiKey,
    /// Delegate the whole request to the provider.
    Custom,
}

/// Which provider validates credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Default,
    Jwt,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "default-secret".to_string(),
            issuer: "dispatch".to_string(),
        }
    }
}

/// Settings for the `authentication` filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub provider: ProviderKind,
    pub skip_paths: Vec<String>,
    /// Bearer tokens accepted by the static provider.
    pub valid_tokens: Vec<String>,
    /// API keys accepted by the static provider.
    pub valid_api_keys: Vec<String>,
    pub jwt: JwtSettings,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_type: AuthType::default(),
            provider: ProviderKind::default(),
            skip_paths: vec!["/health".to_string(), "/public/*".to_string()],
            valid_tokens: Vec::new(),
            valid_api_keys: Vec::new(),
            jwt: JwtSettings::default(),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub provider: &'static str,
}

/// Credential rejection; the message is shown to the client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct AuthError(pub String);

/// Validates credentials.
pub trait AuthProvider: Send + Sync {
    fn validate_bearer_token(&self, token: &str) -> Result<Identity, AuthError>;

    fn validate_api_key(&self, api_key: &str) -> Result<Identity, AuthError>;

    /// Custom mode: inspect the whole request.
    fn authenticate(&self, request: &GatewayRequest) -> Result<Identity, AuthError> {
        if let Some(token) = bearer_token(request) {
            return self.validate_bearer_token(token);
        }
        match api_key(request) {
            Some(key) => self.validate_api_key(key),
            None => Err(AuthError("No authentication credentials provided".into())),
        }
    }
}

fn bearer_token(request: &GatewayRequest) -> Option<&str> {
    request.header("authorization")?.strip_prefix("Bearer ")
}

fn api_key(request: &GatewayRequest) -> Option<&str> {
    request
        .header("x-api-key")
        .or_else(|| request.query_param("api_key"))
}

fn require_non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AuthError(format!("{what} cannot be empty")))
    } else {
        Ok(trimmed)
    }
}

/// Development provider with fixed test credentials.
#[derive(Debug, Default)]
pub struct DefaultAuthProvider;

impl AuthProvider for DefaultAuthProvider {
    fn validate_bearer_token(&self, token: &str) -> Result<Identity, AuthError> {
        match require_non_empty(token, "Token")? {
            "test-token" => Ok(Identity {
                user_id: "test-user-id".into(),
                username: "test-user".into(),
                roles: vec!["user".into()],
                provider: "default",
            }),
            _ => Err(AuthError("Invalid token".into())),
        }
    }

    fn validate_api_key(&self, api_key: &str) -> Result<Identity, AuthError> {
        match require_non_empty(api_key, "API key")? {
            "test-api-key" => Ok(Identity {
                user_id: "api-user-id".into(),
                username: "api-user".into(),
                roles: vec!["api-user".into()],
                provider: "default",
            }),
            _ => Err(AuthError("Invalid API key".into())),
        }
    }

    /// Custom mode with the default provider lets every request through.
    fn authenticate(&self, _request: &GatewayRequest) -> Result<Identity, AuthError> {
        Ok(Identity {
            user_id: "anonymous".into(),
            username: "anonymous".into(),
            roles: Vec::new(),
            provider: "default",
        })
    }
}

/// Fixed allow-lists of tokens and API keys.
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    tokens: HashSet<String>,
    api_keys: HashSet<String>,
}

impl StaticAuthProvider {
    pub fn new(tokens: &[String], api_keys: &[String]) -> Self {
        Self {
            tokens: tokens.iter().cloned().collect(),
            api_keys: api_keys.iter().cloned().collect(),
        }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn validate_bearer_token(&self, token: &str) -> Result<Identity, AuthError> {
        if self.tokens.contains(token) {
            Ok(Identity {
                user_id: format!("static-user-{}", credential_id(token)),
                username: "static-user".into(),
                roles: vec!["user".into()],
                provider: "static",
            })
        } else {
            Err(AuthError("Invalid bearer token".into()))
        }
    }

    fn validate_api_key(&self, api_key: &str) -> Result<Identity, AuthError> {
        if self.api_keys.contains(api_key) {
            Ok(Identity {
                user_id: format!("static-api-{}", credential_id(api_key)),
                username: "static-api-user".into(),
                roles: vec!["api-user".into()],
                provider: "static",
            })
        } else {
            Err(AuthError("Invalid API key".into()))
        }
    }
}

/// Stable, non-reversible id fragment so raw credentials never land in attributes.
fn credential_id(secret: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, secret.as_bytes())
        .simple()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

/// HS256 JWT validation with a fixed issuer.
pub struct JwtAuthProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthProvider {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.set_issuer(&[settings.issuer.as_str()]);
        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }
}

impl AuthProvider for JwtAuthProvider {
    fn validate_bearer_token(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            AuthError("Invalid JWT token".into())
        })?;
        let claims = data.claims;
        Ok(Identity {
            username: claims.name.unwrap_or_else(|| claims.sub.clone()),
            user_id: claims.sub,
            roles: claims.roles,
            provider: "jwt",
        })
    }

    fn validate_api_key(&self, _api_key: &str) -> Result<Identity, AuthError> {
        Err(AuthError("JWT provider does not support API key authentication".into()))
    }

    fn authenticate(&self, request: &GatewayRequest) -> Result<Identity, AuthError> {
        match bearer_token(request) {
            Some(token) => self.validate_bearer_token(token),
            None => Err(AuthError("Missing JWT token".into())),
        }
    }
}

/// The `authentication` filter.
pub struct AuthenticationFilter {
    auth_type: AuthType,
    skip_paths: Vec<PathPattern>,
    provider: Box<dyn AuthProvider>,
}

impl AuthenticationFilter {
    pub fn new(settings: AuthSettings) -> Result<Self, FilterBuildError> {
        let provider: Box<dyn AuthProvider> = match settings.provider {
            ProviderKind::Default => Box::new(DefaultAuthProvider),
            ProviderKind::Static => Box::new(StaticAuthProvider::new(
                &settings.valid_tokens,
                &settings.valid_api_keys,
            )),
            ProviderKind::Jwt => Box::new(JwtAuthProvider::new(&settings.jwt)),
        };
        Self::with_provider(settings.auth_type, &settings.skip_paths, provider)
    }

    pub fn with_provider(
        auth_type: AuthType,
        skip_paths: &[String],
        provider: Box<dyn AuthProvider>,
    ) -> Result<Self, FilterBuildError> {
        let skip_paths = skip_paths
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FilterBuildError::InvalidSettings {
                name: "authentication".into(),
                message: format!("invalid skip path: {e}"),
            })?;
        Ok(Self {
            auth_type,
            skip_paths,
            provider,
        })
    }

    fn authenticate(&self, request: &GatewayRequest) -> Result<Identity, AuthError> {
        match self.auth_type {
            AuthType::BearerToken => match bearer_token(request) {
                Some(token) => self.provider.validate_bearer_token(token),
                None => Err(AuthError("Missing or invalid Authorization header".into())),
            },
            AuthType::ApiKey => match api_key(request) {
                Some(key) => self.provider.validate_api_key(key),
                None => Err(AuthError("Missing API key".into())),
            },
            AuthType::Custom => self.provider.authenticate(request),
        }
    }
}

#[async_trait]
impl Filter for AuthenticationFilter {
    fn name(&self) -> &str {
        "authentication"
    }

    fn should_apply(&self, request: &GatewayRequest) -> bool {
        !self.skip_paths.iter().any(|p| p.matches(request.path()))
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        match self.authenticate(request) {
            Ok(identity) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    user_id = %identity.user_id,
                    provider = identity.provider,
                    "Authenticated"
                );
                ctx.set_attribute("user.id", identity.user_id.clone());
                ctx.set_attribute("user.name", identity.username.clone());
                ctx.set_attribute("user.roles", identity.roles.clone());
                Ok(FilterResult::Proceed)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    method = %request.method(),
                    path = %request.path(),
                    reason = %e,
                    "Authentication failed"
                );
                let error = GatewayError::AuthenticationFailed(e.0);
                Ok(FilterResult::Respond(error.into_response(ctx.request_id())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use crate::filter::parse_settings;
    use crate::http::request::{test_request, test_request_with};

    fn with_header(uri: &str, name: &'static str, value: &str) -> GatewayRequest {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        test_request_with(Method::GET, uri, headers)
    }

    async fn run(filter: &AuthenticationFilter, request: GatewayRequest) -> (FilterResult, FilterContext) {
        let mut ctx = FilterContext::new(request.clone());
        let result = filter.process(&request, &mut ctx).await.unwrap();
        (result, ctx)
    }

    fn respond_status(result: &FilterResult) -> Option<StatusCode> {
        match result {
            FilterResult::Respond(r) => Some(r.status),
            FilterResult::Proceed => None,
        }
    }

    #[tokio::test]
    async fn test_bearer_with_default_provider() {
        let filter = AuthenticationFilter::new(AuthSettings::default()).unwrap();

        let (result, ctx) = run(&filter, with_header("/api", "authorization", "Bearer test-token")).await;
        assert!(matches!(result, FilterResult::Proceed));
        assert_eq!(ctx.attribute_str("user.id"), Some("test-user-id"));
        assert_eq!(ctx.attribute("user.roles").unwrap()[0], "user");

        let (result, _) = run(&filter, with_header("/api", "authorization", "Bearer wrong")).await;
        assert_eq!(respond_status(&result), Some(StatusCode::UNAUTHORIZED));

        let (result, _) = run(&filter, test_request("/api")).await;
        let FilterResult::Respond(response) = result else { panic!("expected 401") };
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"]["code"], "AUTHENTICATION_FAILED");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Missing or invalid Authorization header"));
    }

    #[test]
    fn test_skip_paths() {
        let filter = AuthenticationFilter::new(AuthSettings::default()).unwrap();
        assert!(!filter.should_apply(&test_request("/health")));
        assert!(!filter.should_apply(&test_request("/public/docs/index.html")));
        assert!(filter.should_apply(&test_request("/api/users")));
        assert!(filter.should_apply(&test_request("/healthz")));
    }

    #[tokio::test]
    async fn test_api_key_from_header_or_query() {
        let settings: AuthSettings = parse_settings(
            "authentication",
            &json!({ "type": "api-key", "provider": "static", "valid_api_keys": ["k-1"] }),
        )
        .unwrap();
        let filter = AuthenticationFilter::new(settings).unwrap();

        let (result, ctx) = run(&filter, with_header("/", "x-api-key", "k-1")).await;
        assert!(matches!(result, FilterResult::Proceed));
        let user_id = ctx.attribute_str("user.id").unwrap().to_string();
        assert!(user_id.starts_with("static-api-"));
        assert!(!user_id.contains("k-1"));
        assert_eq!(user_id.len(), "static-api-".len() + 32);

        let (result, ctx) = run(&filter, test_request("/?api_key=k-1")).await;
        assert!(matches!(result, FilterResult::Proceed));
        assert_eq!(ctx.attribute_str("user.id"), Some(user_id.as_str()));

        let (result, _) = run(&filter, test_request("/?api_key=nope")).await;
        assert_eq!(respond_status(&result), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_jwt_provider() {
        let settings: AuthSettings = parse_settings(
            "authentication",
            &json!({ "provider": "jwt", "jwt": { "secret": "s3cret", "issuer": "dispatch" } }),
        )
        .unwrap();
        let filter = AuthenticationFilter::new(settings).unwrap();

        let sign = |claims: serde_json::Value, secret: &str| {
            encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
        };
        let exp = crate::error::epoch_millis() / 1000 + 3600;

        let good = sign(json!({ "sub": "alice", "iss": "dispatch", "exp": exp, "roles": ["admin"] }), "s3cret");
        let (result, ctx) = run(&filter, with_header("/", "authorization", &format!("Bearer {good}"))).await;
        assert!(matches!(result, FilterResult::Proceed));
        assert_eq!(ctx.attribute_str("user.id"), Some("alice"));
        assert_eq!(ctx.attribute("user.roles").unwrap()[0], "admin");

        let wrong_issuer = sign(json!({ "sub": "bob", "iss": "elsewhere", "exp": exp }), "s3cret");
        let (result, _) =
            run(&filter, with_header("/", "authorization", &format!("Bearer {wrong_issuer}"))).await;
        assert_eq!(respond_status(&result), Some(StatusCode::UNAUTHORIZED));

        let expired = sign(json!({ "sub": "carol", "iss": "dispatch", "exp": 1_000 }), "s3cret");
        let (result, _) = run(&filter, with_header("/", "authorization", &format!("Bearer {expired}"))).await;
        assert_eq!(respond_status(&result), Some(StatusCode::UNAUTHORIZED));

        let forged = sign(json!({ "sub": "mallory", "iss": "dispatch", "exp": exp }), "other");
        let (result, _) = run(&filter, with_header("/", "authorization", &format!("Bearer {forged}"))).await;
        assert_eq!(respond_status(&result), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_unknown_auth_type_rejected() {
        let err = parse_settings::<AuthSettings>("authentication", &json!({ "type": "kerberos" }));
        assert!(err.is_err());
    }
}
