//! The gateway's single request entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::backend::{BackendClient, HyperTransport, Transport};
use crate::config::schema::{GatewayConfig, RouteType};
use crate::error::GatewayError;
use crate::filter::terminal::{ProxyFilter, StaticResponseFilter};
use crate::filter::{
    build_filters, Filter, FilterBuildError, FilterChain, FilterContext, FilterResources, FilterResult, LimiterSlot,
};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;
use crate::lifecycle::InFlightTracker;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerSettings, BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
use crate::routing::{Route, RouteTable};

/// Failure compiling a configuration into pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid route pattern: {0}")]
    Route(#[from] regex::Error),

    #[error("route '{route}': {source}")]
    Filter {
        route: String,
        #[source]
        source: FilterBuildError,
    },
}

/// One compiled configuration: routes plus a ready chain per route.
struct Pipelines {
    table: RouteTable,
    chains: Vec<FilterChain>,
    limiters: Vec<LimiterSlot>,
    config: Arc<GatewayConfig>,
}

impl Pipelines {
    /// `previous` holds the limiters of the configuration being replaced;
    /// unchanged rate-limiting filters keep their buckets.
    fn build(
        config: GatewayConfig,
        breakers: &Arc<CircuitBreakerRegistry>,
        transport: &Arc<dyn Transport>,
        started_at: Instant,
        previous: Vec<LimiterSlot>,
    ) -> Result<Self, PipelineError> {
        let table = RouteTable::from_config(&config.routes)?;
        let client = Arc::new(BackendClient::new(
            transport.clone(),
            breakers.clone(),
            config.retry.clone(),
        ));
        let mut resources = FilterResources::new(breakers.clone(), started_at).with_previous(previous);

        // Global filters are built once so their state (buckets) is shared by every route.
        resources.enter_scope(GLOBAL_SCOPE);
        let global = build_filters(&config.global_filters, &mut resources).map_err(|source| {
            PipelineError::Filter {
                route: GLOBAL_SCOPE.to_string(),
                source,
            }
        })?;

        let mut chains = Vec::with_capacity(table.len());
        for route in table.routes() {
            let route_error = |source: FilterBuildError| PipelineError::Filter {
                route: route.path().to_string(),
                source,
            };
            resources.enter_scope(route.path());
            let mut filters: Vec<Arc<dyn Filter>> = global.clone();
            filters.extend(build_filters(&route.filters, &mut resources).map_err(route_error)?);
            filters.push(terminal_for(route, &client).map_err(route_error)?);
            chains.push(FilterChain::new(filters));
        }

        Ok(Self {
            table,
            chains,
            limiters: resources.limiters,
            config: Arc::new(config),
        })
    }
}

const GLOBAL_SCOPE: &str = "<global>";

fn terminal_for(route: &Arc<Route>, client: &Arc<BackendClient>) -> Result<Arc<dyn Filter>, FilterBuildError> {
    Ok(match route.route_type {
        RouteType::Static => Arc::new(StaticResponseFilter::new(&route.response.clone().unwrap_or_default())?),
        RouteType::Proxy => Arc::new(ProxyFilter::new(route.clone(), client.clone())),
    })
}

/// Resolves routes and runs filter chains.
///
/// The compiled configuration is swapped as a whole on reload; a request
/// keeps the snapshot it started with.
pub struct Dispatcher {
    pipelines: ArcSwap<Pipelines>,
    breakers: Arc<CircuitBreakerRegistry>,
    transport: Arc<dyn Transport>,
    in_flight: InFlightTracker,
    closing: AtomicBool,
    started_at: Instant,
}

impl Dispatcher {
    /// Dispatcher that forwards over real HTTP connections.
    pub fn new(config: GatewayConfig) -> Result<Self, PipelineError> {
        Self::with_transport(config, Arc::new(HyperTransport::new()))
    }

    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self, PipelineError> {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerSettings::from(&config.circuit_breaker)));
        let started_at = Instant::now();
        let pipelines = Pipelines::build(config, &breakers, &transport, started_at, Vec::new())?;

        tracing::info!(
            routes = pipelines.table.len(),
            global_filters = pipelines.config.global_filters.len(),
            "Dispatcher initialized"
        );

        Ok(Self {
            pipelines: ArcSwap::from_pointee(pipelines),
            breakers,
            transport,
            in_flight: InFlightTracker::new(),
            closing: AtomicBool::new(false),
            started_at,
        })
    }

    /// Replace the active configuration. On error the current one stays active.
    pub fn reload(&self, config: GatewayConfig) -> Result<(), PipelineError> {
        let previous = self.pipelines.load().limiters.clone();
        let pipelines = Pipelines::build(config, &self.breakers, &self.transport, self.started_at, previous)?;

        self.breakers
            .update_settings(BreakerSettings::from(&pipelines.config.circuit_breaker));

        let backends: Vec<String> = pipelines
            .table
            .routes()
            .iter()
            .flat_map(|route| route.backends.iter().cloned())
            .collect();
        self.breakers.retain_backends(&backends);

        tracing::info!(routes = pipelines.table.len(), "Configuration reloaded");
        self.pipelines.store(Arc::new(pipelines));
        Ok(())
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> Arc<GatewayConfig> {
        self.pipelines.load().config.clone()
    }

    /// Run one request through the pipeline. Always produces a response.
    pub async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
        let start = Instant::now();
        let method = request.method().to_string();

        // Registered before the closing check so a drain never misses it.
        let _in_flight = self.in_flight.enter();
        if self.closing.load(Ordering::SeqCst) {
            let error = GatewayError::RouteUnavailable("gateway is shutting down".to_string());
            return error.into_response(request.request_id());
        }

        let pipelines = self.pipelines.load_full();
        let Some(index) = pipelines.table.position(request.path()) else {
            tracing::debug!(
                request_id = %request.request_id(),
                path = %request.path(),
                "No route matched"
            );
            metrics::record_request("none", &method, 404, start);
            return GatewayError::NoRouteFound.into_response(request.request_id());
        };

        let route = &pipelines.table.routes()[index];
        if !route.enabled {
            tracing::warn!(
                request_id = %request.request_id(),
                route = %route.path(),
                "Route is disabled"
            );
            metrics::record_request(route.path(), &method, 503, start);
            return GatewayError::RouteUnavailable(route.path().to_string()).into_response(request.request_id());
        }

        let chain = &pipelines.chains[index];
        let mut ctx = FilterContext::new(request);
        ctx.set_attribute("route.path", route.path());

        let response = match chain.execute(&mut ctx).await {
            FilterResult::Respond(response) => response,
            FilterResult::Proceed => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    route = %route.path(),
                    "Filter chain finished without a response"
                );
                GatewayError::RouteUnavailable(route.path().to_string()).into_response(ctx.request_id())
            }
        };
        let response = chain.execute_response(response, &mut ctx).await;

        metrics::record_request(route.path(), &method, response.status.as_u16(), start);
        response
    }

    pub fn reset_circuit_breaker(&self, backend: &str) -> bool {
        let reset = self.breakers.reset(backend);
        if reset {
            tracing::info!(backend = %backend, "Circuit breaker reset");
        }
        reset
    }

    pub fn circuit_breaker_state(&self, backend: &str) -> CircuitState {
        self.breakers.state(backend)
    }

    pub fn circuit_breakers(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshot()
    }

    /// Forget `key` in every rate limiter. Returns true if any bucket existed.
    pub fn reset_rate_limit(&self, key: &str) -> bool {
        let pipelines = self.pipelines.load();
        pipelines
            .limiters
            .iter()
            .fold(false, |found, slot| slot.limiter.reset(key) || found)
    }

    pub fn reset_all_rate_limits(&self) {
        for slot in &self.pipelines.load().limiters {
            slot.limiter.reset_all();
        }
        tracing::info!("All rate limit buckets reset");
    }

    /// Drop buckets idle for at least `ttl`. Returns how many were removed.
    pub fn evict_idle_buckets(&self, ttl: Duration) -> usize {
        self.pipelines
            .load()
            .limiters
            .iter()
            .map(|slot| slot.limiter.evict_idle(ttl))
            .sum()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Stop accepting requests, drain in-flight ones, then release shared state.
    ///
    /// Returns true when every request finished within `drain_timeout`.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        self.closing.store(true, Ordering::SeqCst);
        tracing::info!(in_flight = self.in_flight(), "Draining in-flight requests");

        let drained = self.in_flight.wait_idle(drain_timeout).await;
        if !drained {
            tracing::warn!(
                remaining = self.in_flight(),
                timeout = ?drain_timeout,
                "Drain timeout reached"
            );
        }

        self.breakers.clear();
        for slot in &self.pipelines.load().limiters {
            slot.limiter.reset_all();
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use serde_json::json;

    use crate::backend::transport::mock::ScriptedTransport;
    use crate::config::schema::{FilterConfig, RouteConfig};
    use crate::http::request::{test_request, test_request_with};

    fn dispatcher(config: GatewayConfig) -> (Dispatcher, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::with_transport(config, transport.clone()).unwrap();
        (dispatcher, transport)
    }

    fn error_code(response: &GatewayResponse) -> String {
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        body["error"]["code"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/health", 200, "ok"));
        let (dispatcher, _) = dispatcher(config);

        let response = dispatcher.dispatch(test_request("/nowhere")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(error_code(&response), "NO_ROUTE_FOUND");

        let exact_only = dispatcher.dispatch(test_request("/health/x")).await;
        assert_eq!(exact_only.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disabled_route_fails_fast() {
        let mut disabled = RouteConfig::proxy("/api/*", vec!["http://a:1".into()]);
        disabled.enabled = false;
        let mut config = GatewayConfig::default();
        config.routes.push(disabled);
        config.routes.push(RouteConfig::static_response("/api/*", 200, "fallback"));
        let (dispatcher, transport) = dispatcher(config);

        let response = dispatcher.dispatch(test_request("/api/users")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_code(&response), "ROUTE_UNAVAILABLE");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_static_route() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/ping", 200, "pong"));
        let (dispatcher, _) = dispatcher(config);

        let response = dispatcher.dispatch(test_request("/ping")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"pong");
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_backend() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::proxy("/orders/*", vec!["http://orders:8080".into()]));
        let (dispatcher, transport) = dispatcher(config);

        let breaker = dispatcher.breakers.get_or_create("http://orders:8080");
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(dispatcher.circuit_breaker_state("http://orders:8080"), CircuitState::Open);

        let response = dispatcher.dispatch(test_request("/orders/1")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_code(&response), "CIRCUIT_OPEN");
        assert_eq!(transport.calls(), 0);

        assert!(dispatcher.reset_circuit_breaker("http://orders:8080"));
        let response = dispatcher.dispatch(test_request("/orders/1")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_global_then_route_filters() {
        let mut route = RouteConfig::proxy("/secure/*", vec!["http://svc:8080".into()]);
        route.filters.push(FilterConfig::new("authentication", json!(null)));
        let mut config = GatewayConfig::default();
        config.global_filters.push(FilterConfig::new(
            "rate-limiting",
            json!({ "requests_per_minute": 60, "burst_capacity": 1 }),
        ));
        config.global_filters.push(FilterConfig::new("header-transformer", json!(null)));
        config.routes.push(route);
        let (dispatcher, transport) = dispatcher(config);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer test-token"));
        headers.insert("x-internal-secret", HeaderValue::from_static("s"));
        let response = dispatcher
            .dispatch(test_request_with(Method::GET, "/secure/data", headers))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("x-powered-by"), Some("Dispatch Gateway"));
        assert_eq!(response.header("x-ratelimit-remaining"), Some("0"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].headers.get("x-internal-secret").is_none());
        assert_eq!(sent[0].uri, "http://svc:8080/data");

        // Rate limiting runs first, so the second request never reaches authentication.
        let denied = dispatcher.dispatch(test_request("/secure/data")).await;
        assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.header("x-powered-by"), Some("Dispatch Gateway"));

        assert!(dispatcher.reset_rate_limit("10.0.0.1"));
        let unauthenticated = dispatcher.dispatch(test_request("/secure/data")).await;
        assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_swaps_routes_and_prunes_breakers() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::proxy("/old/*", vec!["http://old:8080".into()]));
        let (dispatcher, _) = dispatcher(config);
        dispatcher.dispatch(test_request("/old/a")).await;
        assert_eq!(dispatcher.circuit_breakers().len(), 1);

        let mut next = GatewayConfig::default();
        next.routes.push(RouteConfig::static_response("/new", 200, "fresh"));
        dispatcher.reload(next).unwrap();

        assert_eq!(dispatcher.dispatch(test_request("/old/a")).await.status, StatusCode::NOT_FOUND);
        assert_eq!(dispatcher.dispatch(test_request("/new")).await.status, StatusCode::OK);
        assert!(dispatcher.circuit_breakers().is_empty());
        assert_eq!(dispatcher.config().routes.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_config() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/keep", 200, "kept"));
        let (dispatcher, _) = dispatcher(config);

        let mut broken = GatewayConfig::default();
        broken.global_filters.push(FilterConfig::new("compression", json!(null)));
        assert!(dispatcher.reload(broken).is_err());
        assert_eq!(dispatcher.dispatch(test_request("/keep")).await.status, StatusCode::OK);
    }

    fn rate_limited_ping(burst: u32) -> GatewayConfig {
        let mut route = RouteConfig::static_response("/ping", 200, "pong");
        route.filters.push(FilterConfig::new(
            "rate-limiting",
            json!({ "requests_per_minute": 1, "burst_capacity": burst }),
        ));
        let mut config = GatewayConfig::default();
        config.routes.push(route);
        config
    }

    #[tokio::test]
    async fn test_reload_keeps_unchanged_rate_limit_buckets() {
        let (dispatcher, _) = dispatcher(rate_limited_ping(1));
        assert_eq!(dispatcher.dispatch(test_request("/ping")).await.status, StatusCode::OK);
        assert_eq!(
            dispatcher.dispatch(test_request("/ping")).await.status,
            StatusCode::TOO_MANY_REQUESTS
        );

        dispatcher.reload(rate_limited_ping(1)).unwrap();
        assert_eq!(
            dispatcher.dispatch(test_request("/ping")).await.status,
            StatusCode::TOO_MANY_REQUESTS
        );

        dispatcher.reload(rate_limited_ping(2)).unwrap();
        assert_eq!(dispatcher.dispatch(test_request("/ping")).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reload_updates_existing_breakers() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::proxy("/orders/*", vec!["http://orders:8080".into()]));
        let (dispatcher, _) = dispatcher(config.clone());
        let breaker = dispatcher.breakers.get_or_create("http://orders:8080");

        config.circuit_breaker.failure_threshold = 1;
        dispatcher.reload(config).unwrap();

        breaker.record_failure();
        assert_eq!(dispatcher.circuit_breaker_state("http://orders:8080"), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_invalid_static_status_fails_build() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/teapot", 1000, "short and stout"));
        let transport = Arc::new(ScriptedTransport::default());

        let err = Dispatcher::with_transport(config, transport).err().unwrap();
        assert!(matches!(err, PipelineError::Filter { ref route, .. } if route == "/teapot"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_request_reaches_backend_after_drain() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::proxy("/work/*", vec!["http://work:8080".into()]));
        let (dispatcher, transport) = dispatcher(config);
        let dispatcher = Arc::new(dispatcher);

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(test_request(&format!("/work/{i}"))).await })
            })
            .collect();

        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);
        let served_before_drain = transport.calls();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(transport.calls(), served_before_drain);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_requests() {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig::static_response("/ping", 200, "pong"));
        let (dispatcher, _) = dispatcher(config);

        assert!(dispatcher.shutdown(Duration::from_millis(50)).await);
        assert!(dispatcher.is_closing());
        let response = dispatcher.dispatch(test_request("/ping")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
