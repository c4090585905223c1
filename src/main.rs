//! Dispatch Gateway
//!
//! An API gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────────▶ http::server (axum, request id, body buffering)
//!                              │
//!                              ▼
//!                        dispatch::Dispatcher ──▶ routing::RouteTable
//!                              │
//!                              ▼
//!                        filter::FilterChain
//!                          global filters ─▶ route filters ─▶ terminal
//!                          (auth, rate limit,                 static | proxy
//!                           headers, logging)                     │
//!                                                                 ▼
//!                                          load_balancer ─▶ backend::BackendClient
//!                                                             circuit breaker + retries
//!                                                                 │
//!     Client Response                                             ▼
//!     ◀───────────────── response filters ◀──────────────── Backend Server
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dispatch_gateway::admin::setup_admin_router;
use dispatch_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use dispatch_gateway::lifecycle::{shutdown_signal, Shutdown};
use dispatch_gateway::observability::{logging, metrics};
use dispatch_gateway::{Dispatcher, HttpServer};

#[derive(Parser)]
#[command(name = "dispatch-gateway", version, about = "API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatch-gateway starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        routes = config.routes.len(),
        global_filters = config.global_filters.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(config.clone())?);
    let shutdown = Shutdown::new();
    let mut server = HttpServer::with_dispatcher(config.clone(), dispatcher.clone());

    // The watcher must stay alive for reloads to keep arriving.
    let _watcher = match (&args.config, args.no_watch) {
        (Some(path), false) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            server = server.with_config_updates(updates);
            Some(watcher.run()?)
        }
        _ => None,
    };

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(dispatcher.clone(), &config.admin.api_key);
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = Arc::new(shutdown);
    let trigger = signal_shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, &signal_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
