//! Route lookup and path rewriting.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first route whose pattern matches a path
//! - Rewrite the request path for forwarding (strip, add, wildcard suffix)
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) ordered scan (acceptable for typical route counts)
//! - Disabled routes still match; the dispatcher decides how to answer them
//! - Explicit `None` rather than a silent default route

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{RouteConfig, RouteTimeoutConfig, RouteType, StaticResponseConfig};
use crate::config::FilterConfig;
use crate::load_balancer::{self, LoadBalancer};
use crate::routing::matcher::PathPattern;

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub pattern: PathPattern,
    pub route_type: RouteType,
    pub backends: Vec<String>,
    pub strip_prefix: Option<String>,
    pub add_prefix: Option<String>,
    pub enabled: bool,
    pub filters: Vec<FilterConfig>,
    pub balancer: Box<dyn LoadBalancer>,
    pub timeout: RouteTimeoutConfig,
    pub response: Option<StaticResponseConfig>,
}

impl Route {
    /// Compile a route from its configuration.
    pub fn from_config(config: &RouteConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: PathPattern::parse(&config.path)?,
            route_type: config.route_type,
            backends: config.all_backends(),
            strip_prefix: non_empty(&config.strip_prefix),
            add_prefix: non_empty(&config.add_prefix),
            enabled: config.enabled,
            filters: config.filters.clone(),
            balancer: load_balancer::build(config.load_balancer),
            timeout: config.timeout,
            response: config.response.clone(),
        })
    }

    /// The path pattern as configured.
    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    /// Pick a backend for one request.
    pub fn select_backend(&self) -> Option<&str> {
        self.balancer.select_backend(&self.backends)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.connect_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.request_ms)
    }

    /// Rewrite `original` for the backend.
    ///
    /// Applied in order: strip prefix, add prefix, then for `/prefix/*`
    /// patterns the wildcard suffix replaces the whole result.
    pub fn transform_path(&self, original: &str) -> String {
        let mut path = original.to_string();

        if let Some(strip) = &self.strip_prefix {
            if let Some(rest) = path.strip_prefix(strip.as_str()) {
                path = leading_slash(rest);
            }
        }

        if let Some(add) = &self.add_prefix {
            let prefix = leading_slash(add);
            path = format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                path.trim_start_matches('/')
            );
        }

        if let Some(prefix) = self.pattern.wildcard_prefix() {
            if let Some(suffix) = original.strip_prefix(prefix) {
                path = leading_slash(suffix);
            }
        }

        path
    }
}

fn leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Ordered collection of compiled routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Compile all routes, preserving declaration order.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, regex::Error> {
        let routes = configs
            .iter()
            .map(|config| Route::from_config(config).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// Index of the first route matching `path`, enabled or not.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.routes.iter().position(|route| route.matches(path))
    }

    /// First route matching `path`, enabled or not.
    pub fn resolve(&self, path: &str) -> Option<&Arc<Route>> {
        self.position(path).map(|index| &self.routes[index])
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
