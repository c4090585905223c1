//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! GatewayRequest (from http/server.rs)
//!     → dispatcher.rs:
//!         closing? → 503
//!         RouteTable::position(path)
//!             none → 404 NO_ROUTE_FOUND
//!             disabled → 503 ROUTE_UNAVAILABLE (no fall-through)
//!         chain for route = global ++ route filters ++ terminal
//!         FilterChain::execute → response (or 503 if none produced)
//!         FilterChain::execute_response
//!     → GatewayResponse
//! ```
//!
//! # Design Decisions
//! - Chains are assembled once per configuration load, not per request
//! - Reload swaps routes, chains and limiters together through `arc-swap`
//! - Breakers outlive reloads; entries for removed backends are pruned

pub mod dispatcher;

pub use dispatcher::{Dispatcher, PipelineError};
