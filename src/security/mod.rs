//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Rate-limiting filter:
//!     → rate_limit.rs (token bucket per client key)
//! Backend client:
//!     → headers.rs (strip hop-by-hop, both directions)
//! Header-transformer filter:
//!     → headers.rs (append X-Forwarded-For)
//! ```
//!
//! # Design Decisions
//! - Limits are enforced per filter instance, not globally
//! - No trust in client input: hop-by-hop headers never cross the gateway

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{RateLimitDecision, TokenBucketLimiter};
