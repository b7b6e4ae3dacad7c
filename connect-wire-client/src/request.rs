//! Request-side types: message stream normalization and envelope encoding.

mod encoder;

pub use encoder::FrameEncoder;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

/// A normalized stream of request messages.
///
/// Client-streaming and bidi calls accept their input through this type so
/// that eager collections and lazy async producers go through one shape:
///
/// ```ignore
/// client.call_client_stream("svc/Method", RequestStream::from_iter(msgs), options).await;
/// client.call_bidi_stream("svc/Method", RequestStream::from_stream(rx_stream), options).await;
/// ```
pub struct RequestStream<T> {
    inner: Pin<Box<dyn Stream<Item = T> + Send + 'static>>,
}

impl<T: Send + 'static> RequestStream<T> {
    /// Wrap an async message producer.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Wrap a synchronous collection of messages.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(futures::stream::iter(iter))
    }

    /// A stream carrying exactly one message.
    pub fn once(message: T) -> Self {
        Self::from_stream(futures::stream::once(std::future::ready(message)))
    }

    /// A stream carrying no messages.
    pub fn empty() -> Self {
        Self::from_stream(futures::stream::empty())
    }
}

impl<T: Send + 'static> From<Vec<T>> for RequestStream<T> {
    fn from(messages: Vec<T>) -> Self {
        Self::from_iter(messages)
    }
}

impl<T> Stream for RequestStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for RequestStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestStream")
    }
}
