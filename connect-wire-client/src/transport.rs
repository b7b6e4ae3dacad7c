//! HTTP transport seam.
//!
//! The call paths talk to HTTP through the [`Transport`] trait: submit a
//! request, get back status, headers, and a streaming body. The bundled
//! implementation is [`HyperTransport`]; tests supply their own.
//!
//! A response body owns one transport slot (a pooled connection for the
//! bundled transport). Dropping the body releases the slot; the runtime
//! guarantees that happens exactly once per call, on every exit path.

mod body;
mod hyper;
#[cfg(test)]
pub(crate) mod mock;

pub use body::TransportBody;
pub use hyper::{HyperTransport, HyperTransportBuilder};

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::ClientError;

/// A boxed response body byte stream.
///
/// Dropping the stream releases the transport slot backing the response.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send + 'static>>;

/// Future resolved at response-headers receipt.
pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<BoxByteStream>, ClientError>> + Send>>;

/// An HTTP client capable of carrying Connect calls.
///
/// The transport is shared across calls (typically behind an `Arc`) and is
/// never closed by the runtime; connection pooling is its own concern.
pub trait Transport: Send + Sync + 'static {
    /// Submit a request. The future resolves once response status and
    /// headers are available; the body streams afterwards.
    fn send(&self, request: http::Request<TransportBody>) -> TransportFuture;
}
