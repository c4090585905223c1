//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → candidate backend URLs identified
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - random.rs (uniform pick)
//!     → Return selected backend URL, or None for an empty set
//! ```
//!
//! # Design Decisions
//! - One balancer instance per route, built when the route table is compiled
//! - Selection never blocks; round-robin state is a single atomic counter
//! - Backend health is the circuit breaker's concern, not the balancer's

pub mod random;
pub mod round_robin;

use crate::config::schema::LoadBalancerKind;

pub use random::RandomBalancer;
pub use round_robin::RoundRobin;

/// Strategy for choosing one backend from a route's candidate set.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick a backend. Returns `None` only when `candidates` is empty.
    fn select_backend<'a>(&self, candidates: &'a [String]) -> Option<&'a str>;
}

/// Build the balancer named by a route's configuration.
pub fn build(kind: LoadBalancerKind) -> Box<dyn LoadBalancer> {
    match kind {
        LoadBalancerKind::RoundRobin => Box::new(RoundRobin::new()),
        LoadBalancerKind::Random => Box::new(RandomBalancer),
    }
}
