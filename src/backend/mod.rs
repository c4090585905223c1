//! Backend forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyFilter picks a backend URL
//!     → client.rs
//!         → circuit breaker check (fail fast when open)
//!         → build target URI (backend base + rewritten path + query)
//!         → strip hop-by-hop headers
//!         → transport.rs (hyper client, connect/request timeouts)
//!         → retry transport failures with backoff
//!         → report outcome to the breaker
//!     → GatewayResponse or GatewayError
//! ```
//!
//! # Design Decisions
//! - The transport is a trait so the retry loop can be exercised without sockets
//! - Request bodies are buffered, so every attempt resends the same bytes
//! - One hyper client per distinct connect timeout, reused across requests

pub mod client;
pub mod transport;

pub use client::{BackendClient, ProxyOptions};
pub use transport::{BackendTimeouts, HyperTransport, Transport};
