//! Connect streaming envelope encoding for request bodies.
//!
//! [`FrameEncoder`] adapts a stream of messages into a stream of envelope
//! bytes suitable for a streaming request body. The client side of a Connect
//! stream ends with plain EOF; no end-stream envelope is ever emitted here
//! (the end-stream envelope is a server-to-client construct).

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use connect_wire_core::{
    BoxedCodec, CompressionConfig, compress_payload, envelope_flags, wrap_envelope,
};

use crate::ClientError;
use futures::Stream;
use prost::Message;
use serde::Serialize;

/// Stream adapter that encodes messages into Connect envelopes.
///
/// Each message becomes one envelope: `[flags:1][length:4][payload]`, with
/// the payload compressed (flag 0x01) when a codec is configured and the
/// serialized message meets the size threshold.
pub struct FrameEncoder<S, T> {
    /// The underlying message stream.
    stream: S,
    /// Use protobuf (true) or JSON (false) encoding.
    use_proto: bool,
    /// Per-envelope compression codec, `None` for identity.
    codec: Option<BoxedCodec>,
    /// Compression threshold configuration.
    compression: CompressionConfig,
    /// Set once the inner stream is exhausted or an error was yielded.
    done: bool,
    /// Type marker for the message type.
    _marker: PhantomData<T>,
}

impl<S, T> FrameEncoder<S, T> {
    /// Create a new frame encoder.
    pub fn new(
        stream: S,
        use_proto: bool,
        codec: Option<BoxedCodec>,
        compression: CompressionConfig,
    ) -> Self {
        Self {
            stream,
            use_proto,
            codec,
            compression,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Check if the encoder has finished.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Encode a message to bytes.
    fn encode_message(&self, msg: &T) -> Result<Bytes, ClientError>
    where
        T: Message + Serialize,
    {
        if self.use_proto {
            Ok(Bytes::from(msg.encode_to_vec()))
        } else {
            serde_json::to_vec(msg)
                .map(Bytes::from)
                .map_err(|e| ClientError::Encode(format!("JSON encoding failed: {}", e)))
        }
    }

    /// Encode a message into a framed envelope.
    fn encode_frame(&self, msg: &T) -> Result<Bytes, ClientError>
    where
        T: Message + Serialize,
    {
        let payload = self.encode_message(msg)?;

        let codec = if !self.compression.is_disabled() && payload.len() >= self.compression.min_bytes
        {
            self.codec.as_ref()
        } else {
            None
        };

        let (payload, compressed) = compress_payload(payload, codec)?;
        let flags = if compressed {
            envelope_flags::COMPRESSED
        } else {
            envelope_flags::MESSAGE
        };

        Ok(Bytes::from(wrap_envelope(&payload, flags)))
    }
}

impl<S, T> Unpin for FrameEncoder<S, T> where S: Unpin {}

impl<S, T> Stream for FrameEncoder<S, T>
where
    S: Stream<Item = T> + Unpin,
    T: Message + Serialize,
{
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(msg)) => match this.encode_frame(&msg) {
                Ok(frame) => Poll::Ready(Some(Ok(frame))),
                Err(e) => {
                    this.done = true;
                    Poll::Ready(Some(Err(e)))
                }
            },
            Poll::Ready(None) => {
                // Clean EOF terminates the request body; the server treats it
                // as end of the client's message stream.
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
