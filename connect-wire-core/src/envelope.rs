//! Connect streaming envelope framing.
//!
//! Streaming bodies are a sequence of envelopes:
//!
//! ```text
//! [flags:1][length:4 BE][payload:length]
//! ```
//!
//! Bit 0 of the flags marks a compressed payload, bit 1 marks the end-stream
//! envelope; the remaining bits are reserved and must be zero.

use bytes::Bytes;

use crate::codec::BoxedCodec;

/// Connect streaming envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
    /// Reserved bits, which must never be set.
    pub const RESERVED_MASK: u8 = !(COMPRESSED | END_STREAM);
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Errors produced while framing or unframing envelopes.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Fewer bytes than an envelope header requires.
    #[error("truncated envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Flags with reserved bits set.
    #[error("invalid envelope flags: 0x{0:02x}")]
    ReservedFlags(u8),

    /// Compressed envelope on a stream whose codec is identity.
    #[error("compressed envelope on an identity-encoded stream")]
    CompressedWithoutCodec,

    /// The codec failed to compress a payload.
    #[error("compression failed: {0}")]
    Compression(String),

    /// The codec failed to decompress a payload.
    #[error("decompression failed: {0}")]
    Decompression(String),
}

/// Wrap payload bytes in an envelope.
///
/// `flags` is one of the [`envelope_flags`] values; the length field is the
/// exact byte count of `payload` (compression, if any, happens before this).
pub fn wrap_envelope(payload: &[u8], flags: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse an envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
///
/// # Errors
/// Fails if fewer than [`ENVELOPE_HEADER_SIZE`] bytes are available or if
/// reserved flag bits are set.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    if flags & envelope_flags::RESERVED_MASK != 0 {
        return Err(EnvelopeError::ReservedFlags(flags));
    }

    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Process an envelope payload based on flags, with optional decompression.
///
/// # Returns
/// - `Ok(Some(payload))` for message envelopes (decompressed when bit 0 is set)
/// - `Ok(None)` for end-stream envelopes, whose payload the caller interprets
///
/// # Errors
/// Fails on reserved flag bits, on a compressed envelope when `codec` is
/// `None` (identity stream), and on codec failures.
pub fn process_envelope_payload(
    flags: u8,
    payload: Bytes,
    codec: Option<&BoxedCodec>,
) -> Result<Option<Bytes>, EnvelopeError> {
    if flags & envelope_flags::RESERVED_MASK != 0 {
        return Err(EnvelopeError::ReservedFlags(flags));
    }

    // End-stream payloads are never message-compressed on this path; the
    // caller parses them as JSON.
    if flags & envelope_flags::END_STREAM != 0 {
        return Ok(None);
    }

    if flags & envelope_flags::COMPRESSED != 0 {
        let Some(codec) = codec else {
            return Err(EnvelopeError::CompressedWithoutCodec);
        };
        let payload = codec
            .decompress(&payload)
            .map_err(|e| EnvelopeError::Decompression(e.to_string()))?;
        return Ok(Some(payload));
    }

    Ok(Some(payload))
}

/// Compress payload bytes for the emit side.
///
/// Returns `(bytes, was_compressed)`; identity (`None`) passes through.
pub fn compress_payload(
    payload: Bytes,
    codec: Option<&BoxedCodec>,
) -> Result<(Bytes, bool), EnvelopeError> {
    let Some(codec) = codec else {
        return Ok((payload, false));
    };

    let compressed = codec
        .compress(&payload)
        .map_err(|e| EnvelopeError::Compression(e.to_string()))?;

    Ok((compressed, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, GzipCodec};

    #[test]
    fn test_wrap_envelope_message() {
        let frame = wrap_envelope(b"hello", envelope_flags::MESSAGE);

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_wrap_envelope_end_stream() {
        let frame = wrap_envelope(b"{}", envelope_flags::END_STREAM);

        assert_eq!(frame[0], envelope_flags::END_STREAM);
        assert_eq!(&frame[5..], b"{}");
    }

    #[test]
    fn test_wrap_envelope_empty_payload() {
        let frame = wrap_envelope(b"", envelope_flags::MESSAGE);
        assert_eq!(frame.len(), ENVELOPE_HEADER_SIZE);
        assert_eq!(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]), 0);
    }

    #[test]
    fn test_parse_envelope_header() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (flags, length) = parse_envelope_header(&data).unwrap();

        assert_eq!(flags, envelope_flags::MESSAGE);
        assert_eq!(length, 5);
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let data = [0x00, 0x00, 0x00]; // only 3 bytes
        let result = parse_envelope_header(&data);

        assert!(matches!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_parse_envelope_header_reserved_flags() {
        let data = [0x04, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            parse_envelope_header(&data),
            Err(EnvelopeError::ReservedFlags(0x04))
        ));

        let data = [0xFF, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            parse_envelope_header(&data),
            Err(EnvelopeError::ReservedFlags(0xFF))
        ));
    }

    #[test]
    fn test_process_envelope_payload_message() {
        let payload = Bytes::from_static(b"hello");
        let result =
            process_envelope_payload(envelope_flags::MESSAGE, payload.clone(), None).unwrap();

        assert_eq!(result, Some(payload));
    }

    #[test]
    fn test_process_envelope_payload_end_stream() {
        let payload = Bytes::from_static(b"{}");
        let result = process_envelope_payload(envelope_flags::END_STREAM, payload, None).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_process_envelope_payload_reserved_flags() {
        let payload = Bytes::from_static(b"hello");
        let result = process_envelope_payload(0xFF, payload, None);

        assert!(matches!(result, Err(EnvelopeError::ReservedFlags(0xFF))));
    }

    #[test]
    fn test_process_envelope_payload_compressed_without_codec() {
        let payload = Bytes::from_static(b"hello");
        let result = process_envelope_payload(envelope_flags::COMPRESSED, payload, None);

        assert!(matches!(result, Err(EnvelopeError::CompressedWithoutCodec)));
    }

    #[test]
    fn test_compress_and_process_round_trip() {
        let codec = crate::codec::BoxedCodec::new(GzipCodec::default());
        let original = Bytes::from_static(b"a message large enough to shrink when compressed");

        let (compressed, was_compressed) =
            compress_payload(original.clone(), Some(&codec)).unwrap();
        assert!(was_compressed);

        let restored =
            process_envelope_payload(envelope_flags::COMPRESSED, compressed, Some(&codec))
                .unwrap()
                .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_compress_payload_identity() {
        let payload = Bytes::from_static(b"hello");
        let (result, compressed) = compress_payload(payload.clone(), None).unwrap();

        assert_eq!(result, payload);
        assert!(!compressed);
    }

    #[test]
    fn test_process_envelope_payload_bad_compressed_data() {
        let codec = crate::codec::BoxedCodec::new(GzipCodec::default());
        let payload = Bytes::from_static(b"definitely not gzip");
        let result = process_envelope_payload(envelope_flags::COMPRESSED, payload, Some(&codec));

        assert!(matches!(result, Err(EnvelopeError::Decompression(_))));
    }

    #[test]
    fn test_codec_round_trip_via_trait() {
        let codec = GzipCodec::default();
        let data = b"payload bytes";
        let out = codec.decompress(&codec.compress(data).unwrap()).unwrap();
        assert_eq!(&out[..], data);
    }
}
