//! Outbound HTTP transport.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Request, Response};
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::TransportError;

/// Deadlines for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(30),
        }
    }
}

/// Sends one fully buffered request and returns the fully buffered response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        timeouts: BackendTimeouts,
    ) -> Result<Response<Bytes>, TransportError>;
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Hyper-backed transport with pooled connections.
#[derive(Default)]
pub struct HyperTransport {
    clients: DashMap<Duration, HttpClient>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, connect_timeout: Duration) -> HttpClient {
        self.clients
            .entry(connect_timeout)
            .or_insert_with(|| {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(connect_timeout));
                connector.set_nodelay(true);
                Client::builder(TokioExecutor::new()).build(connector)
            })
            .clone()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        timeouts: BackendTimeouts,
    ) -> Result<Response<Bytes>, TransportError> {
        let client = self.client(timeouts.connect);
        let connect_timeout = timeouts.connect;

        let exchange = async move {
            let response = client
                .request(request)
                .await
                .map_err(|e| classify(&e, connect_timeout))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?
                .to_bytes();
            Ok::<_, TransportError>(Response::from_parts(parts, body))
        };

        match tokio::time::timeout(timeouts.request, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeouts.request)),
        }
    }
}

fn classify(error: &hyper_util::client::legacy::Error, connect_timeout: Duration) -> TransportError {
    if caused_by_timeout(error) {
        TransportError::Timeout(connect_timeout)
    } else if error.is_connect() {
        TransportError::Connect(error_chain(error))
    } else {
        TransportError::Io(error_chain(error))
    }
}

fn caused_by_timeout(error: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return true;
            }
            // io::Error::source skips its own payload, so inspect it directly.
            if let Some(inner) = io_err.get_ref() {
                if caused_by_timeout(inner) {
                    return true;
                }
            }
        }
        source = err.source();
    }
    false
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
