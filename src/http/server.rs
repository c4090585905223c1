//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Buffer inbound bodies and hand requests to the [`Dispatcher`]
//! - Run background tasks: config reload, idle bucket sweep
//! - Drain the dispatcher on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::GatewayConfig;
use crate::dispatch::{Dispatcher, PipelineError};
use crate::error::GatewayError;
use crate::http::request::{GatewayRequest, X_REQUEST_ID};
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    config: GatewayConfig,
    config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
}

impl HttpServer {
    /// Create a server forwarding over real HTTP connections.
    pub fn new(config: GatewayConfig) -> Result<Self, PipelineError> {
        let dispatcher = Arc::new(Dispatcher::new(config.clone())?);
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    pub fn with_dispatcher(config: GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            config,
            config_updates: None,
        }
    }

    /// Apply every configuration received on `updates` while running.
    pub fn with_config_updates(mut self, updates: mpsc::UnboundedReceiver<GatewayConfig>) -> Self {
        self.config_updates = Some(updates);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            max_body_bytes: self.config.server.max_body_bytes,
        };

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.server.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(mut self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = self.config_updates.take() {
            tokio::spawn(apply_config_updates(self.dispatcher.clone(), updates));
        }
        tokio::spawn(sweep_idle_buckets(self.dispatcher.clone(), shutdown.subscribe()));

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let dispatcher = self.dispatcher.clone();
        let drain_timeout = Duration::from_secs(self.config.server.drain_timeout_secs);
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
                dispatcher.shutdown(drain_timeout).await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: buffer the body, dispatch, convert back.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let request_id = parts
                .headers
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request body");
            let error = GatewayError::InvalidRequest(format!("request body rejected: {e}"));
            return error.into_response(request_id).into_response();
        }
    };

    let request = GatewayRequest::new(parts.method, parts.uri, parts.headers, body, remote_addr);
    state.dispatcher.dispatch(request).await.into_response()
}

async fn apply_config_updates(dispatcher: Arc<Dispatcher>, mut updates: mpsc::UnboundedReceiver<GatewayConfig>) {
    while let Some(config) = updates.recv().await {
        if let Err(e) = dispatcher.reload(config) {
            tracing::error!(error = %e, "Failed to apply configuration, keeping current configuration");
        }
    }
}

/// Periodically drop idle buckets. Interval and TTL are read from the live
/// configuration, so reloads take effect from the next sweep.
async fn sweep_idle_buckets(dispatcher: Arc<Dispatcher>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let period = Duration::from_secs(dispatcher.config().rate_limit.sweep_interval_secs.max(1));

        tokio::select! {
            _ = tokio::time::sleep(period) => {
                let ttl = Duration::from_secs(dispatcher.config().rate_limit.idle_ttl_secs);
                let evicted = dispatcher.evict_idle_buckets(ttl);
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted idle rate limit buckets");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
