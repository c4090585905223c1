//! Request/response access logging filter.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::filter::{Filter, FilterContext, FilterError, FilterResult};
use crate::http::request::GatewayRequest;
use crate::http::response::GatewayResponse;

const BODY_PREVIEW_BYTES: usize = 1000;

/// Level the access events are emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Settings for the `logging` filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub include_headers: bool,
    pub include_body: bool,
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warn => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// The `logging` filter: one `REQUEST` and one `RESPONSE` event per request.
pub struct LoggingFilter {
    settings: LoggingSettings,
}

impl LoggingFilter {
    pub fn new(settings: LoggingSettings) -> Self {
        Self { settings }
    }

    fn headers(&self, headers: &HeaderMap) -> Option<String> {
        self.settings.include_headers.then(|| format_headers(headers))
    }

    fn body(&self, body: &[u8]) -> Option<String> {
        (self.settings.include_body && !body.is_empty()).then(|| body_preview(body))
    }
}

#[async_trait]
impl Filter for LoggingFilter {
    fn name(&self) -> &str {
        "logging"
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let headers = self.headers(request.headers());
        let body = self.body(request.body());
        log_at!(
            self.settings.level,
            request_id = %ctx.request_id(),
            client_ip = %request.client_ip(),
            method = %request.method(),
            path = %request.path(),
            user_agent = request.header("user-agent").unwrap_or("-"),
            headers = headers.as_deref(),
            body = body.as_deref(),
            "REQUEST"
        );
        Ok(FilterResult::Proceed)
    }

    async fn process_response(
        &self,
        response: &GatewayResponse,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let original = ctx.original_request();
        let headers = self.headers(&response.headers);
        let body = self.body(&response.body);
        log_at!(
            self.settings.level,
            request_id = %ctx.request_id(),
            client_ip = %original.client_ip(),
            method = %original.method(),
            path = %original.path(),
            status = response.status.as_u16(),
            duration_ms = ctx.elapsed().as_millis() as u64,
            headers = headers.as_deref(),
            body = body.as_deref(),
            "RESPONSE"
        );
        Ok(FilterResult::Proceed)
    }
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}={}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lossy UTF-8 preview of at most [`BODY_PREVIEW_BYTES`] bytes.
fn body_preview(body: &[u8]) -> String {
    if body.len() <= BODY_PREVIEW_BYTES {
        return String::from_utf8_lossy(body).into_owned();
    }
    format!(
        "{}... (truncated)",
        String::from_utf8_lossy(&body[..BODY_PREVIEW_BYTES])
    )
}
