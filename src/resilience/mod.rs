//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (fail fast if the backend's circuit is open)
//!     → transport call bounded by connect/request timeouts
//!     → On transport failure: retries.rs (retryable? budget left?)
//!         → backoff.rs (exponential delay, capped)
//!     → Final outcome reported to the circuit breaker
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One breaker per backend URL, created lazily
//! - Breaker sees one outcome per client request, after retries
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use retries::RetryPolicy;
