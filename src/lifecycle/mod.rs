//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Dispatcher stops resolving routes (503)
//!     → in-flight chains drain (bounded by drain timeout)
//!     → breaker and bucket maps released → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: drain waits at most `server.drain_timeout_secs`
//! - Config reload is driven by the file watcher, not by signals

pub mod shutdown;
pub mod signals;

pub use shutdown::{InFlightGuard, InFlightTracker, Shutdown};
pub use signals::shutdown_signal;
