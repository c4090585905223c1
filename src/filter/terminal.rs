//! Terminal handlers appended to every route's chain.
//!
//! These are not configurable by name: the dispatcher appends exactly one
//! of them according to the route type.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};

use crate::backend::{BackendClient, BackendTimeouts, ProxyOptions};
use crate::config::schema::StaticResponseConfig;
use crate::error::GatewayError;
use crate::filter::{Filter, FilterBuildError, FilterContext, FilterError, FilterResult};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::routing::Route;

/// Answers with a fixed status, body and headers.
pub struct StaticResponseFilter {
    response: GatewayResponse,
}

impl StaticResponseFilter {
    pub fn new(config: &StaticResponseConfig) -> Result<Self, FilterBuildError> {
        let status = (100..=599)
            .contains(&config.status)
            .then(|| StatusCode::from_u16(config.status).ok())
            .flatten()
            .ok_or_else(|| FilterBuildError::InvalidSettings {
                name: "static-response".into(),
                message: format!("{} is not a valid HTTP status", config.status),
            })?;
        let mut response = GatewayResponse::new(status).with_body(config.body.clone());
        if let Ok(content_type) = HeaderValue::from_str(&config.content_type) {
            response.headers.insert(header::CONTENT_TYPE, content_type);
        }
        for (name, value) in &config.headers {
            if !response.set_header(name, value) {
                tracing::warn!(header = %name, "Skipping invalid static response header");
            }
        }
        Ok(Self { response })
    }
}

#[async_trait]
impl Filter for StaticResponseFilter {
    fn name(&self) -> &str {
        "static-response"
    }

    async fn process(
        &self,
        _request: &GatewayRequest,
        _ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        Ok(FilterResult::Respond(self.response.clone()))
    }
}

/// Forwards the (possibly rewritten) request to one of the route's backends.
pub struct ProxyFilter {
    route: Arc<Route>,
    client: Arc<BackendClient>,
}

impl ProxyFilter {
    pub fn new(route: Arc<Route>, client: Arc<BackendClient>) -> Self {
        Self { route, client }
    }

    fn options(&self) -> ProxyOptions {
        ProxyOptions {
            timeouts: BackendTimeouts {
                connect: self.route.connect_timeout(),
                request: self.route.request_timeout(),
            },
            max_retries: self.route.timeout.max_retries,
        }
    }
}

#[async_trait]
impl Filter for ProxyFilter {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let Some(backend) = self.route.select_backend() else {
            tracing::error!(
                request_id = %ctx.request_id(),
                route = %self.route.path(),
                "No backend configured for proxy route"
            );
            let response = GatewayError::NoBackendConfigured.into_response(ctx.request_id());
            return Ok(FilterResult::Respond(response));
        };

        let target_path = self.route.transform_path(request.path());
        ctx.set_attribute("proxy.backend", backend);
        ctx.set_attribute("proxy.target-path", target_path.as_str());

        tracing::debug!(
            request_id = %ctx.request_id(),
            route = %self.route.path(),
            backend = %backend,
            target_path = %target_path,
            "Proxying request"
        );

        let outbound = request.with_path(&target_path);
        let response = match self.client.proxy(&outbound, backend, &self.options()).await {
            Ok(response) => response,
            Err(error) => error.into_response(ctx.request_id()),
        };
        Ok(FilterResult::Respond(response))
    }
}
