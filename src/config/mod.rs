//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, filter settings compiled once)
//!     → GatewayConfig (validated, immutable)
//!     → Dispatcher compiles routes and filter chains
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Dispatcher::reload swaps the compiled pipelines atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A config that fails to load or validate never replaces the running one

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, FilterConfig, GatewayConfig, LoadBalancerKind, ObservabilityConfig,
    RateLimitConfig, RetryConfig, RouteConfig, RouteTimeoutConfig, RouteType, ServerConfig, StaticResponseConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
