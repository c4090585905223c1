//! Gateway request model.
//!
//! # Responsibilities
//! - Capture the inbound request as an immutable value (method, URI, headers, body)
//! - Carry the request ID assigned at the edge
//! - Parse query parameters once
//! - Resolve the client IP from forwarding headers
//!
//! # Design Decisions
//! - Body is buffered as `Bytes` so retries can resend it cheaply
//! - Header mutation never happens in place; `with_*` builders return a new value
//! - Original request preserved for logging; modified copy forwarded

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;

/// Header carrying the correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An immutable inbound request as seen by filters and the backend client.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    query: HashMap<String, Vec<String>>,
    remote_addr: SocketAddr,
    request_id: String,
}

impl GatewayRequest {
    /// Build a request. The request id comes from `x-request-id` when present.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: SocketAddr,
    ) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let query = parse_query(uri.query());

        Self {
            method,
            uri,
            headers,
            body,
            query,
            remote_addr,
            request_id,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
        if let Some(real_ip) = self.header("x-real-ip").map(str::trim).filter(|s| !s.is_empty()) {
            return real_ip.to_string();
        }
        self.remote_addr.ip().to_string()
    }

    /// Copy of this request with a replaced header map.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    /// Copy of this request targeting `path`, keeping the original query string.
    pub fn with_path(&self, path: &str) -> Self {
        let path_and_query = match self.uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        let uri = path_and_query.parse::<Uri>().unwrap_or_else(|_| self.uri.clone());
        Self {
            uri,
            ..self.clone()
        }
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    params
}

/// Build a GET request for unit tests.
#[cfg(test)]
pub(crate) fn test_request(uri: &str) -> GatewayRequest {
    test_request_with(Method::GET, uri, HeaderMap::new())
}

#[cfg(test)]
pub(crate) fn test_request_with(method: Method, uri: &str, headers: HeaderMap) -> GatewayRequest {
    GatewayRequest::new(
        method,
        uri.parse().unwrap(),
        headers,
        Bytes::new(),
        "10.0.0.1:40000".parse().unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_query_parsing() {
        let req = test_request("/search?q=rust&tag=a&tag=b&api_key=k%201");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_param("q"), Some("rust"));
        assert_eq!(req.query_param("tag"), Some("a"));
        assert_eq!(req.query_param("api_key"), Some("k 1"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_client_ip_resolution() {
        let req = test_request("/");
        assert_eq!(req.client_ip(), "10.0.0.1");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.9"));
        let req = test_request_with(Method::GET, "/", headers.clone());
        assert_eq!(req.client_ip(), "192.168.1.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.1.1.1"));
        let req = test_request_with(Method::GET, "/", headers);
        assert_eq!(req.client_ip(), "203.0.113.7");
    }

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        let req = test_request_with(Method::GET, "/", headers);
        assert_eq!(req.request_id(), "abc-123");

        let generated = test_request("/");
        assert_eq!(generated.request_id().len(), 36);
    }

    #[test]
    fn test_with_path_keeps_query_and_original() {
        let req = test_request("/api/users?page=2");
        let forwarded = req.with_path("/users");
        assert_eq!(forwarded.uri().to_string(), "/users?page=2");
        assert_eq!(req.path(), "/api/users");
        assert_eq!(forwarded.request_id(), req.request_id());
    }
}
