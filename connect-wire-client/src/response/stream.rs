//! Streaming response handle.
//!
//! [`StreamOutput`] owns one transport slot from open to close. It yields
//! decoded messages, captures trailers from the end-stream envelope, records
//! a sticky error, and guarantees the slot is released exactly once on every
//! exit path: normal exhaustion, early `close()`, `cancel()`, deadline
//! expiry, or drop.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use connect_wire_core::{Code, Metadata};
use futures::Stream;
use prost::Message;
use serde::de::DeserializeOwned;

use super::decoder::FrameDecoder;
use crate::ClientError;
use crate::transport::BoxByteStream;

/// Lifecycle states of a streaming response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    /// Response headers received, nothing consumed yet.
    Open,
    /// Iteration has started.
    Draining,
    /// Terminal: transport slot released, trailers/error settled.
    Closed,
}

/// Handle for a streaming RPC response.
///
/// Implements [`futures::Stream`] yielding `Result<T, ClientError>`.
/// Iteration is single-consumer. A trailing or transport error is yielded
/// once through the stream and then remains readable via
/// [`error`](Self::error); iteration after that terminates.
///
/// Dropping the handle is the scope-based release: the transport slot is
/// returned on every exit path, including panics and early `break`s in the
/// consuming loop.
pub struct StreamOutput<T> {
    /// Decoder over the response body; `None` once the slot is released.
    decoder: Option<FrameDecoder<BoxByteStream, T>>,
    headers: Metadata,
    trailers: Option<Metadata>,
    error: Option<ClientError>,
    error_yielded: bool,
    state: StreamState,
    /// Local deadline; expiry closes the stream with `deadline_exceeded`.
    deadline: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl<T> StreamOutput<T> {
    /// An open stream over a response body.
    pub(crate) fn open(
        decoder: FrameDecoder<BoxByteStream, T>,
        headers: Metadata,
        deadline: Option<tokio::time::Instant>,
    ) -> Self {
        Self {
            decoder: Some(decoder),
            headers,
            trailers: None,
            error: None,
            error_yielded: false,
            state: StreamState::Open,
            deadline: deadline.map(|at| Box::pin(tokio::time::sleep_until(at))),
        }
    }

    /// A stream that failed before (or at) open. Iteration yields the error
    /// once; no transport slot is held.
    pub(crate) fn failed(error: ClientError, headers: Metadata) -> Self {
        Self {
            decoder: None,
            headers,
            trailers: None,
            error: Some(error),
            error_yielded: false,
            state: StreamState::Closed,
            deadline: None,
        }
    }

    /// Leading response metadata, available from open onwards.
    pub fn response_headers(&self) -> &Metadata {
        &self.headers
    }

    /// Trailing metadata from the end-stream envelope.
    ///
    /// Defined once the stream is closed: populated from the end-stream
    /// envelope, or empty when the stream terminated with an error before
    /// the envelope arrived. Before close, and after an early clean
    /// [`close`](Self::close), this fails with `failed_precondition`.
    pub fn response_trailers(&self) -> Result<&Metadata, ClientError> {
        self.trailers.as_ref().ok_or_else(|| {
            ClientError::new(
                Code::FailedPrecondition,
                "trailers are not available until the stream is fully drained",
            )
        })
    }

    /// The sticky error, if the stream terminated abnormally.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Whether the stream reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Release the transport slot. Idempotent.
    ///
    /// Closing an incompletely drained stream drops any queued envelopes;
    /// trailers stay unavailable in that case.
    pub fn close(&mut self) {
        self.decoder = None;
        self.deadline = None;
        self.state = StreamState::Closed;
    }

    /// Cancel the stream: release the transport slot and record a sticky
    /// `canceled` error if no terminal state was already reached.
    pub fn cancel(&mut self) {
        if self.state != StreamState::Closed {
            self.close();
            self.error = Some(ClientError::canceled("canceled by client"));
            if self.trailers.is_none() {
                self.trailers = Some(Metadata::empty());
            }
        }
    }

    /// Pull trailers out of the decoder if the terminator was consumed.
    fn capture_trailers(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            if decoder.end_stream_received() {
                self.trailers = Some(decoder.take_trailers().unwrap_or_default());
            }
        }
    }

    /// Enter the terminal state, releasing the slot.
    ///
    /// A stream closed with an error leaves trailers readable (empty when
    /// the end-stream envelope never arrived).
    fn finish_with(&mut self, error: Option<ClientError>) {
        self.capture_trailers();
        self.decoder = None;
        self.deadline = None;
        self.state = StreamState::Closed;
        if self.error.is_none() {
            self.error = error;
        }
        if self.error.is_some() && self.trailers.is_none() {
            self.trailers = Some(Metadata::empty());
        }
    }
}

impl<T> StreamOutput<T>
where
    T: Message + DeserializeOwned + Default,
{
    /// Consume all remaining messages, making trailers available.
    ///
    /// Returns the number of messages drained (not counting the trailing
    /// error, if any).
    pub async fn drain(&mut self) -> usize {
        use futures::StreamExt;
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }
}

impl<T> Unpin for StreamOutput<T> {}

impl<T> Stream for StreamOutput<T>
where
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.state == StreamState::Closed {
                if !this.error_yielded {
                    if let Some(error) = this.error.clone() {
                        this.error_yielded = true;
                        return Poll::Ready(Some(Err(error)));
                    }
                }
                return Poll::Ready(None);
            }
            this.state = StreamState::Draining;

            if let Some(sleep) = this.deadline.as_mut() {
                if sleep.as_mut().poll(cx).is_ready() {
                    this.finish_with(Some(ClientError::deadline_exceeded("deadline exceeded")));
                    continue;
                }
            }

            let Some(decoder) = this.decoder.as_mut() else {
                // Slot already released without a terminal transition.
                this.state = StreamState::Closed;
                continue;
            };

            match Pin::new(decoder).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(Ok(message))),
                Poll::Ready(Some(Err(error))) => {
                    this.finish_with(Some(error));
                    // The Closed arm yields it exactly once.
                    continue;
                }
                Poll::Ready(None) => {
                    this.finish_with(None);
                    continue;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> std::fmt::Debug for StreamOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutput")
            .field("state", &self.state)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestMessage, concat_frames, make_frame};
    use bytes::Bytes;
    use futures::StreamExt;

    fn output_over(chunks: Vec<Bytes>) -> StreamOutput<TestMessage> {
        let items: Vec<Result<Bytes, ClientError>> = chunks.into_iter().map(Ok).collect();
        let stream: BoxByteStream = Box::pin(futures::stream::iter(items));
        let decoder = FrameDecoder::new(stream, false, None);
        StreamOutput::open(decoder, Metadata::empty(), None)
    }

    #[tokio::test]
    async fn test_stream_yields_messages_then_trailers() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x00, br#"{"value":"b"}"#),
            make_frame(0x02, br#"{"metadata":{"x":["1"]}}"#),
        ]);
        let mut output = output_over(vec![body]);

        assert!(output.response_trailers().is_err());

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");
        assert_eq!(output.next().await.unwrap().unwrap().value, "b");
        assert!(output.next().await.is_none());

        assert!(output.is_closed());
        assert!(output.error().is_none());
        let values: Vec<_> = output.response_trailers().unwrap().get_all("x").collect();
        assert_eq!(values, vec!["1"]);
    }

    #[tokio::test]
    async fn test_stream_trailing_error_is_sticky() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x02, br#"{"error":{"code":"aborted","message":"stop"}}"#),
        ]);
        let mut output = output_over(vec![body]);

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");

        let err = output.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Aborted);

        // Terminated, error stays readable, trailers are defined (empty).
        assert!(output.next().await.is_none());
        assert_eq!(output.error().unwrap().code(), Code::Aborted);
        assert!(output.response_trailers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trailers_before_drain_fail_precondition() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x02, b"{}"),
        ]);
        let mut output = output_over(vec![body]);

        let err = output.response_trailers().unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);

        // Still failed mid-drain
        let _ = output.next().await;
        assert!(output.response_trailers().is_err());

        let _ = output.next().await;
        assert!(output.response_trailers().is_ok());
    }

    #[tokio::test]
    async fn test_close_before_drain_drops_queued_messages() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x00, br#"{"value":"b"}"#),
            make_frame(0x02, b"{}"),
        ]);
        let mut output = output_over(vec![body]);

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");

        output.close();
        output.close(); // idempotent

        assert!(output.is_closed());
        assert!(output.next().await.is_none());
        assert!(output.error().is_none());
        assert_eq!(
            output.response_trailers().unwrap_err().code(),
            Code::FailedPrecondition
        );
    }

    #[tokio::test]
    async fn test_cancel_sets_sticky_canceled() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x02, b"{}"),
        ]);
        let mut output = output_over(vec![body]);

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");
        output.cancel();

        let err = output.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
        assert!(output.next().await.is_none());
        assert_eq!(output.error().unwrap().code(), Code::Canceled);
        assert!(output.response_trailers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_terminal_state_keeps_first_error() {
        let body = concat_frames(&[make_frame(0x02, b"{}")]);
        let mut output = output_over(vec![body]);

        assert!(output.next().await.is_none());
        output.cancel(); // already closed, no-op

        assert!(output.error().is_none());
        assert!(output.response_trailers().is_ok());
    }

    #[tokio::test]
    async fn test_failed_output_yields_error_once() {
        let mut output: StreamOutput<TestMessage> =
            StreamOutput::failed(ClientError::unavailable("gone"), Metadata::empty());

        let err = output.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(output.next().await.is_none());
        assert_eq!(output.error().unwrap().code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let items: Vec<Result<Bytes, ClientError>> = vec![
            Ok(make_frame(0x00, br#"{"value":"a"}"#)),
            Err(ClientError::Transport("connection reset".into())),
        ];
        let stream: BoxByteStream = Box::pin(futures::stream::iter(items));
        let decoder = FrameDecoder::new(stream, false, None);
        let mut output: StreamOutput<TestMessage> = StreamOutput::open(decoder, Metadata::empty(), None);

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");

        let err = output.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(output.is_closed());
        assert!(output.response_trailers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_expiry_yields_deadline_exceeded() {
        // Body never produces the terminator; the local deadline must fire.
        let pending = futures::stream::pending::<Result<Bytes, ClientError>>();
        let stream: BoxByteStream = Box::pin(pending);
        let decoder = FrameDecoder::new(stream, false, None);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(50);
        let mut output: StreamOutput<TestMessage> =
            StreamOutput::open(decoder, Metadata::empty(), Some(deadline));

        let err = output.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(output.is_closed());
    }

    #[tokio::test]
    async fn test_drain_counts_remaining_messages() {
        let body = concat_frames(&[
            make_frame(0x00, br#"{"value":"a"}"#),
            make_frame(0x00, br#"{"value":"b"}"#),
            make_frame(0x00, br#"{"value":"c"}"#),
            make_frame(0x02, b"{}"),
        ]);
        let mut output = output_over(vec![body]);

        assert_eq!(output.next().await.unwrap().unwrap().value, "a");
        assert_eq!(output.drain().await, 2);
        assert!(output.response_trailers().is_ok());
    }
}
