//! Request body types for the HTTP transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::ClientError;

pin_project! {
    /// A request body for Connect RPC calls.
    ///
    /// This type can represent:
    /// - Empty bodies (empty unary requests)
    /// - Full bodies (unary and server-stream requests with a complete message)
    /// - Streaming bodies (client/bidi streaming requests)
    #[project = TransportBodyProj]
    pub enum TransportBody {
        /// Empty request body.
        Empty,
        /// Full request body with all data available.
        Full {
            data: Option<Bytes>,
        },
        /// Streaming request body from an async stream.
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>,
        },
    }
}

impl TransportBody {
    /// Create an empty body.
    pub fn empty() -> Self {
        TransportBody::Empty
    }

    /// Create a body with the given data.
    pub fn full(data: Bytes) -> Self {
        TransportBody::Full { data: Some(data) }
    }

    /// Create a streaming body from the given stream.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Empty => Poll::Ready(None),
            TransportBodyProj::Full { data } => {
                let result = data.take().map(|d| Ok(Frame::data(d)));
                Poll::Ready(result)
            }
            TransportBodyProj::Streaming { stream } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Empty => true,
            TransportBody::Full { data } => data.is_none(),
            TransportBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            TransportBody::Empty => http_body::SizeHint::with_exact(0),
            TransportBody::Full { data } => match data {
                Some(d) => http_body::SizeHint::with_exact(d.len() as u64),
                None => http_body::SizeHint::with_exact(0),
            },
            TransportBody::Streaming { .. } => http_body::SizeHint::default(),
        }
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        TransportBody::Empty
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Empty => write!(f, "TransportBody::Empty"),
            TransportBody::Full { data } => f
                .debug_struct("TransportBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            TransportBody::Streaming { .. } => write!(f, "TransportBody::Streaming"),
        }
    }
}
