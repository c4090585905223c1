//! Dispatch Gateway Library
//!
//! Route resolution, ordered filter chains and resilient backend proxying
//! behind a single entry point, [`Dispatcher::dispatch`].

// Core pipeline
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod http;
pub mod routing;

// Traffic management
pub mod backend;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::GatewayConfig;
pub use dispatch::Dispatcher;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
