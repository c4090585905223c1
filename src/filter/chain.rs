//! Ordered filter chain execution.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::error::GatewayError;
use crate::filter::{Filter, FilterContext, FilterError, FilterResult};
use crate::http::response::GatewayResponse;
use crate::observability::metrics;

/// An ordered list of filters assembled for one request.
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Request phase.
    ///
    /// Returns the first `Respond`. Returns `Proceed` when the chain ran out
    /// or a filter terminated it without responding; callers treat that as
    /// "no response produced".
    pub async fn execute(&self, ctx: &mut FilterContext) -> FilterResult {
        for filter in &self.filters {
            let request = ctx.request().clone();
            if !filter.should_apply(&request) {
                continue;
            }

            let outcome = AssertUnwindSafe(filter.process(&request, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FilterError(panic_message(panic.as_ref()))));

            match outcome {
                Ok(FilterResult::Respond(response)) => return FilterResult::Respond(response),
                Ok(FilterResult::Proceed) => {
                    if ctx.is_terminated() {
                        tracing::debug!(
                            request_id = %ctx.request_id(),
                            filter = %filter.name(),
                            "Chain terminated without a response"
                        );
                        return FilterResult::Proceed;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        filter = %filter.name(),
                        error = %e,
                        "Filter failed"
                    );
                    metrics::record_filter_fault(filter.name());
                    let error = GatewayError::FilterFault(filter.name().to_string());
                    return FilterResult::Respond(error.into_response(ctx.request_id()));
                }
            }
        }
        FilterResult::Proceed
    }

    /// Response phase.
    ///
    /// Every filter applicable to the original request may replace the
    /// response. A failing filter leaves the last good response in place.
    pub async fn execute_response(
        &self,
        mut response: GatewayResponse,
        ctx: &mut FilterContext,
    ) -> GatewayResponse {
        let original = ctx.original_request().clone();
        for filter in &self.filters {
            if !filter.should_apply(&original) {
                continue;
            }

            let outcome = AssertUnwindSafe(filter.process_response(&response, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(FilterError(panic_message(panic.as_ref()))));

            match outcome {
                Ok(FilterResult::Respond(replacement)) => response = replacement,
                Ok(FilterResult::Proceed) => {}
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        filter = %filter.name(),
                        error = %e,
                        "Response filter failed, keeping previous response"
                    );
                    metrics::record_filter_fault(filter.name());
                }
            }
        }
        response
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
