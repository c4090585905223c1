//! Header transformer filter.
//!
//! # Responsibilities
//! - Add, remove and case-transform request headers before forwarding
//! - Do the same for response headers on the way back
//! - Append the client address to `X-Forwarded-For` under the default rules

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::filter::{Filter, FilterBuildError, FilterContext, FilterError, FilterResult};
use crate::http::request::{GatewayRequest, X_REQUEST_ID};
use crate::http::response::GatewayResponse;
use crate::security::headers::append_forwarded_for;

/// Case transformation applied to an existing header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseTransform {
    Uppercase,
    Lowercase,
}

impl CaseTransform {
    fn apply(self, value: &str) -> String {
        match self {
            CaseTransform::Uppercase => value.to_uppercase(),
            CaseTransform::Lowercase => value.to_lowercase(),
        }
    }
}

/// One `request` or `response` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeaderRules {
    pub add: BTreeMap<String, String>,
    pub remove: Vec<String>,
    pub transform: BTreeMap<String, CaseTransform>,
}

/// Settings for the `header-transformer` filter.
///
/// With neither section configured the built-in rules apply. Configuring
/// one section leaves the other empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeaderTransformSettings {
    pub request: Option<HeaderRules>,
    pub response: Option<HeaderRules>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderValueSource {
    Fixed(HeaderValue),
    RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transformation {
    Set(HeaderName, HeaderValueSource),
    Remove(HeaderName),
    Transform(HeaderName, CaseTransform),
    AppendForwardedFor,
}

impl Transformation {
    fn apply(&self, headers: &mut HeaderMap, request: &GatewayRequest) {
        match self {
            Transformation::Set(name, HeaderValueSource::Fixed(value)) => {
                headers.insert(name.clone(), value.clone());
            }
            Transformation::Set(name, HeaderValueSource::RequestId) => {
                if let Ok(value) = HeaderValue::from_str(request.request_id()) {
                    headers.insert(name.clone(), value);
                }
            }
            Transformation::Remove(name) => {
                headers.remove(name);
            }
            Transformation::Transform(name, transform) => {
                let updated = headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| transform.apply(v))
                    .and_then(|v| HeaderValue::from_str(&v).ok());
                if let Some(value) = updated {
                    headers.insert(name.clone(), value);
                }
            }
            Transformation::AppendForwardedFor => {
                append_forwarded_for(headers, &request.client_ip());
            }
        }
    }
}

fn compile(rules: &HeaderRules) -> Result<Vec<Transformation>, FilterBuildError> {
    let invalid = |message: String| FilterBuildError::InvalidSettings {
        name: "header-transformer".into(),
        message,
    };
    let header_name = |name: &str| {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid(format!("invalid header name '{name}'")))
    };

    let mut compiled = Vec::new();
    for (name, value) in &rules.add {
        let value =
            HeaderValue::from_str(value).map_err(|_| invalid(format!("invalid value for header '{name}'")))?;
        compiled.push(Transformation::Set(header_name(name)?, HeaderValueSource::Fixed(value)));
    }
    for name in &rules.remove {
        compiled.push(Transformation::Remove(header_name(name)?));
    }
    for (name, transform) in &rules.transform {
        compiled.push(Transformation::Transform(header_name(name)?, *transform));
    }
    Ok(compiled)
}

fn default_request_rules() -> Vec<Transformation> {
    vec![
        Transformation::Set(HeaderName::from_static(X_REQUEST_ID), HeaderValueSource::RequestId),
        Transformation::AppendForwardedFor,
        Transformation::Remove(HeaderName::from_static("x-internal-secret")),
    ]
}

fn default_response_rules() -> Vec<Transformation> {
    vec![
        Transformation::Set(
            HeaderName::from_static("x-powered-by"),
            HeaderValueSource::Fixed(HeaderValue::from_static("Dispatch Gateway")),
        ),
        Transformation::Remove(HeaderName::from_static("server")),
    ]
}

/// The `header-transformer` filter.
pub struct HeaderTransformerFilter {
    request_rules: Vec<Transformation>,
    response_rules: Vec<Transformation>,
}

impl HeaderTransformerFilter {
    pub fn new(settings: HeaderTransformSettings) -> Result<Self, FilterBuildError> {
        let (request_rules, response_rules) = match (&settings.request, &settings.response) {
            (None, None) => (default_request_rules(), default_response_rules()),
            (request, response) => (
                request.as_ref().map(compile).transpose()?.unwrap_or_default(),
                response.as_ref().map(compile).transpose()?.unwrap_or_default(),
            ),
        };
        Ok(Self {
            request_rules,
            response_rules,
        })
    }
}

#[async_trait]
impl Filter for HeaderTransformerFilter {
    fn name(&self) -> &str {
        "header-transformer"
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        if self.request_rules.is_empty() {
            return Ok(FilterResult::Proceed);
        }

        let mut headers = request.headers().clone();
        for rule in &self.request_rules {
            rule.apply(&mut headers, request);
        }
        tracing::debug!(
            request_id = %ctx.request_id(),
            rules = self.request_rules.len(),
            "Applied request header rules"
        );
        ctx.replace_request(request.with_headers(headers));
        Ok(FilterResult::Proceed)
    }

    async fn process_response(
        &self,
        response: &GatewayResponse,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        if self.response_rules.is_empty() {
            return Ok(FilterResult::Proceed);
        }

        let mut rewritten = response.clone();
        let original = ctx.original_request().clone();
        for rule in &self.response_rules {
            rule.apply(&mut rewritten.headers, &original);
        }
        Ok(FilterResult::Respond(rewritten))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::filter::parse_settings;
    use crate::http::request::test_request_with;

    fn filter(config: serde_json::Value) -> HeaderTransformerFilter {
        HeaderTransformerFilter::new(parse_settings("header-transformer", &config).unwrap()).unwrap()
    }

    fn request() -> GatewayRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-secret", HeaderValue::from_static("hunter2"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-tenant", HeaderValue::from_static("Acme"));
        test_request_with(Method::GET, "/api/items", headers)
    }

    #[tokio::test]
    async fn test_default_request_rules() {
        let filter = filter(json!(null));
        let request = request();
        let mut ctx = FilterContext::new(request.clone());

        filter.process(&request, &mut ctx).await.unwrap();

        let forwarded = ctx.request();
        assert!(forwarded.header("x-internal-secret").is_none());
        assert_eq!(forwarded.header("x-request-id"), Some(request.request_id()));
        assert_eq!(forwarded.header("x-forwarded-for"), Some("203.0.113.7, 203.0.113.7"));
        assert_eq!(ctx.original_request().header("x-internal-secret"), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_default_response_rules() {
        let filter = filter(json!(null));
        let mut ctx = FilterContext::new(request());
        let mut upstream = GatewayResponse::new(StatusCode::OK);
        upstream.set_header("Server", "nginx");

        let FilterResult::Respond(rewritten) = filter.process_response(&upstream, &mut ctx).await.unwrap() else {
            panic!("expected rewritten response");
        };
        assert_eq!(rewritten.header("x-powered-by"), Some("Dispatch Gateway"));
        assert!(rewritten.header("server").is_none());
    }

    #[tokio::test]
    async fn test_configured_rules() {
        let filter = filter(json!({
            "request": {
                "add": { "X-Gateway": "dispatch" },
                "remove": ["X-Internal-Secret"],
                "transform": { "X-Tenant": "uppercase" }
            }
        }));
        let request = request();
        let mut ctx = FilterContext::new(request.clone());
        filter.process(&request, &mut ctx).await.unwrap();

        let forwarded = ctx.request();
        assert_eq!(forwarded.header("x-gateway"), Some("dispatch"));
        assert_eq!(forwarded.header("x-tenant"), Some("ACME"));
        assert!(forwarded.header("x-internal-secret").is_none());
        assert_eq!(forwarded.header("x-forwarded-for"), Some("203.0.113.7"));

        let upstream = GatewayResponse::new(StatusCode::OK);
        let result = filter.process_response(&upstream, &mut ctx).await.unwrap();
        assert!(matches!(result, FilterResult::Proceed));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let settings: HeaderTransformSettings =
            parse_settings("header-transformer", &json!({ "response": { "remove": ["bad header"] } })).unwrap();
        assert!(HeaderTransformerFilter::new(settings).is_err());

        let bad_case = json!({ "request": { "transform": { "X-A": "titlecase" } } });
        assert!(parse_settings::<HeaderTransformSettings>("header-transformer", &bad_case).is_err());
    }
}
