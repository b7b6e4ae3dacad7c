//! Hyper-based HTTP transport.
//!
//! [`HyperTransport`] carries Connect calls over HTTP/1.1 using hyper_util's
//! pooled legacy client. Dropping a response body returns its connection to
//! the pool, which is how this transport implements slot release.

use std::time::Duration;

use futures::TryStreamExt;
use http_body_util::BodyExt;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::body::TransportBody;
use super::{BoxByteStream, Transport, TransportFuture};
use crate::ClientError;

type HyperClient = Client<HttpConnector, TransportBody>;

/// HTTP/1.1 transport using hyper_util's legacy client.
///
/// Provides connection pooling and keep-alive. The client half-duplexes
/// streaming calls by construction: the request body is fully written before
/// response bytes are read.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a new transport with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: http::Request<TransportBody>) -> TransportFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .request(request)
                .await
                .map_err(|e| ClientError::Transport(format!("request failed: {}", e)))?;

            Ok(response.map(|body| {
                let stream = body
                    .into_data_stream()
                    .map_err(|e| ClientError::Transport(format!("body read failed: {}", e)));
                Box::pin(stream) as BoxByteStream
            }))
        })
    }
}

/// Builder for [`HyperTransport`].
///
/// # Example
///
/// ```ignore
/// use connect_wire_client::transport::HyperTransportBuilder;
/// use std::time::Duration;
///
/// let transport = HyperTransportBuilder::new()
///     .pool_idle_timeout(Duration::from_secs(90))
///     .build();
/// ```
pub struct HyperTransportBuilder {
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the transport.
    pub fn build(self) -> HyperTransport {
        let mut connector = HttpConnector::new();
        connector.enforce_http(true);

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }

        HyperTransport {
            client: builder.build(connector),
        }
    }
}
