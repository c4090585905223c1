//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body buffering)
//!     → request.rs (immutable GatewayRequest: id, client IP, query)
//!     → Dispatcher (routing, filters, backend call)
//!     → response.rs (GatewayResponse → axum Response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{GatewayRequest, X_REQUEST_ID};
pub use response::GatewayResponse;
pub use server::HttpServer;
