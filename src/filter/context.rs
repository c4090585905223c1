//! Per-request filter context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::http::request::GatewayRequest;

/// Mutable state owned by one request while it moves through the chain.
///
/// Holds the original request, the request as rewritten by earlier filters,
/// free-form attributes filters use to talk to each other, and the
/// termination flag.
#[derive(Debug)]
pub struct FilterContext {
    original: Arc<GatewayRequest>,
    current: Arc<GatewayRequest>,
    attributes: HashMap<String, Value>,
    start: Instant,
    terminated: bool,
}

impl FilterContext {
    pub fn new(request: GatewayRequest) -> Self {
        let original = Arc::new(request);
        Self {
            current: original.clone(),
            original,
            attributes: HashMap::new(),
            start: Instant::now(),
            terminated: false,
        }
    }

    /// The request exactly as received.
    pub fn original_request(&self) -> &Arc<GatewayRequest> {
        &self.original
    }

    /// The request later filters and the backend see.
    pub fn request(&self) -> &Arc<GatewayRequest> {
        &self.current
    }

    /// Replace the request seen by the rest of the chain.
    pub fn replace_request(&mut self, request: GatewayRequest) {
        self.current = Arc::new(request);
    }

    pub fn request_id(&self) -> &str {
        self.original.request_id()
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(Value::as_u64)
    }

    /// Stop the chain after the current filter.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
