//! Connect streaming envelope decoding.
//!
//! [`FrameDecoder`] adapts a response byte stream into a stream of typed
//! messages, buffering partial envelopes and routing the end-stream envelope
//! to the trailer/error decoder.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use connect_wire_core::{
    BoxedCodec, ENVELOPE_HEADER_SIZE, ErrorPayload, Metadata, Status, envelope_flags,
    parse_envelope_header, process_envelope_payload,
};

use crate::ClientError;
use futures::Stream;
use prost::Message;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Decoded streaming frame result.
enum DecodedFrame<T> {
    /// A message envelope containing a decoded message.
    Message(T),
    /// End of stream (trailers are stored in the decoder).
    EndStream,
}

/// Stream adapter that decodes Connect envelope frames.
///
/// Wraps a byte stream and yields decoded protobuf or JSON messages. After
/// the end-stream envelope has been consumed, trailers (and the trailing
/// error, if any) are available on the decoder; the stream on the wire
/// carries exactly one end-stream envelope and it is the last one — anything
/// after it is ignored.
pub struct FrameDecoder<S, T> {
    /// The underlying byte stream.
    stream: S,
    /// Buffer for incomplete frames.
    buffer: BytesMut,
    /// Use protobuf (true) or JSON (false) decoding.
    use_proto: bool,
    /// Per-envelope decompression codec, `None` for identity.
    codec: Option<BoxedCodec>,
    /// Stored trailers from the end-stream envelope.
    trailers: Option<Metadata>,
    /// Whether the stream has finished (end-stream or error).
    finished: bool,
    /// Whether the end-stream envelope was actually consumed.
    end_stream_received: bool,
    /// Error from the end-stream envelope, yielded on the next poll.
    end_stream_error: Option<ClientError>,
    /// Type marker for the message type.
    _marker: PhantomData<T>,
}

impl<S, T> FrameDecoder<S, T> {
    /// Create a new frame decoder.
    pub fn new(stream: S, use_proto: bool, codec: Option<BoxedCodec>) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            use_proto,
            codec,
            trailers: None,
            finished: false,
            end_stream_received: false,
            end_stream_error: None,
            _marker: PhantomData,
        }
    }

    /// Trailers from the end-stream envelope.
    ///
    /// `None` until the end-stream envelope has been consumed; empty trailers
    /// decode to an empty map, not `None`.
    pub fn trailers(&self) -> Option<&Metadata> {
        self.trailers.as_ref()
    }

    /// Take the trailers, leaving `None` in place.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        self.trailers.take()
    }

    /// Whether the stream has finished (end-stream consumed or failed).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the end-stream envelope was consumed.
    pub fn end_stream_received(&self) -> bool {
        self.end_stream_received
    }

    /// Decode a message from bytes.
    fn decode_message(&self, bytes: &[u8]) -> Result<T, ClientError>
    where
        T: Message + DeserializeOwned + Default,
    {
        if self.use_proto {
            T::decode(bytes)
                .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e)))
        } else {
            serde_json::from_slice(bytes)
                .map_err(|e| ClientError::Decode(format!("JSON decoding failed: {}", e)))
        }
    }

    /// Try to parse a complete frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if there was a parsing error
    fn try_parse_frame(&mut self) -> Result<Option<DecodedFrame<T>>, ClientError>
    where
        T: Message + DeserializeOwned + Default,
    {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let frame_size = ENVELOPE_HEADER_SIZE + length as usize;

        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let frame_bytes = self.buffer.split_to(frame_size);
        let payload = Bytes::copy_from_slice(&frame_bytes[ENVELOPE_HEADER_SIZE..]);

        if flags & envelope_flags::END_STREAM != 0 {
            let (error, trailers) = parse_end_stream(&payload)?;

            self.trailers = Some(trailers);
            self.finished = true;
            self.end_stream_received = true;

            if let Some(err) = error {
                // Yielded on the next poll, after any preceding messages.
                self.end_stream_error = Some(err);
            }

            return Ok(Some(DecodedFrame::EndStream));
        }

        let decompressed = process_envelope_payload(flags, payload, self.codec.as_ref())?
            .ok_or_else(|| ClientError::Protocol("unexpected terminator flag".into()))?;

        // Zero-length payloads are legal and decode as an empty message.
        let message = self.decode_message(&decompressed)?;

        Ok(Some(DecodedFrame::Message(message)))
    }
}

impl<S, T> Unpin for FrameDecoder<S, T> where S: Unpin {}

impl<S, T> Stream for FrameDecoder<S, T>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Surface the trailing error exactly once, after all messages.
            if let Some(err) = this.end_stream_error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(DecodedFrame::Message(msg))) => {
                    return Poll::Ready(Some(Ok(msg)));
                }
                Ok(Some(DecodedFrame::EndStream)) => {
                    if let Some(err) = this.end_stream_error.take() {
                        return Poll::Ready(Some(Err(err)));
                    }
                    return Poll::Ready(None);
                }
                Ok(None) => {
                    // Need more data, poll the underlying stream.
                }
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                    // Loop back to try parsing again.
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if this.buffer.is_empty() {
                        // EOF between envelopes, but the terminator never came.
                        return Poll::Ready(Some(Err(ClientError::Protocol(
                            "missing end-of-stream".into(),
                        ))));
                    }
                    let message = if this.buffer.len() < ENVELOPE_HEADER_SIZE {
                        "truncated envelope header"
                    } else {
                        "truncated envelope body"
                    };
                    return Poll::Ready(Some(Err(ClientError::Protocol(message.into()))));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// End-stream envelope JSON structure.
#[derive(Deserialize)]
struct EndStreamJson {
    #[serde(default)]
    error: Option<ErrorPayload>,
    #[serde(default)]
    metadata: Option<HashMap<String, Vec<String>>>,
}

/// Parse an end-stream envelope payload.
///
/// Returns the trailing error (if any) and the trailers (empty when the
/// `metadata` field is absent).
fn parse_end_stream(payload: &[u8]) -> Result<(Option<ClientError>, Metadata), ClientError> {
    // An empty payload is valid: no error, no trailers.
    if payload.is_empty() || payload == b"{}" {
        return Ok((None, Metadata::empty()));
    }

    let end_stream: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| ClientError::Protocol(format!("invalid end-of-stream JSON: {}", e)))?;

    let error = end_stream
        .error
        .map(|payload| ClientError::Rpc(Status::from_payload(payload)));

    let trailers = end_stream
        .metadata
        .map(Metadata::from_wire_map)
        .unwrap_or_else(Metadata::empty);

    Ok((error, trailers))
}
