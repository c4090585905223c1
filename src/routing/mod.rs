//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered route scan)
//!     → matcher.rs (exact / prefix / glob pattern)
//!     → Return: matched Route (possibly disabled) or None
//!
//! Route Compilation (at load/reload):
//!     RouteConfig[]
//!     → Compile patterns (globs to anchored regex)
//!     → Build one load balancer per route
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load time, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{Route, RouteTable};
