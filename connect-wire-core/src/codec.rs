//! Compression codecs and the codec registry.
//!
//! Streaming Connect RPCs compress individual envelopes; unary RPCs compress
//! whole bodies. Both paths consume codecs through the [`Codec`] trait and
//! look them up by wire name in a [`CodecRegistry`].

use bytes::Bytes;
use std::io;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression as GzipLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Wire name of the no-op encoding. Always supported, never registered.
pub const IDENTITY: &str = "identity";

/// Codec trait for message compression.
///
/// Implementations must be cheap to clone behind [`BoxedCodec`] and safe to
/// share across concurrent calls.
pub trait Codec: Send + Sync + 'static {
    /// The encoding name carried in HTTP headers (e.g., "gzip", "zstd", "br").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;
}

/// A boxed codec for type-erased storage.
#[derive(Clone)]
pub struct BoxedCodec(Arc<dyn Codec>);

impl BoxedCodec {
    /// Create a new boxed codec.
    pub fn new<C: Codec>(codec: C) -> Self {
        BoxedCodec(Arc::new(codec))
    }

    /// Get the codec name for HTTP headers.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }
}

impl std::fmt::Debug for BoxedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedCodec").field(&self.name()).finish()
    }
}

/// Ordered table of registered compression codecs.
///
/// The registry decides which codec names a client accepts and which codec
/// serves a given `Content-Encoding` / `Connect-Content-Encoding` value.
/// `identity` is always supported and is represented by the absence of a
/// codec rather than an entry.
///
/// The default registry carries gzip, br, and zstd. Tests (or embedders with
/// unusual needs) can start from [`CodecRegistry::empty`] and register their
/// own.
#[derive(Clone, Debug)]
pub struct CodecRegistry {
    codecs: Vec<BoxedCodec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CodecRegistry {
    /// Registry with the standard codecs: gzip, br, zstd.
    pub fn standard() -> Self {
        Self::empty()
            .register(GzipCodec::default())
            .register(BrotliCodec::default())
            .register(ZstdCodec::default())
    }

    /// Registry with no compression codecs (identity only).
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Register a codec, replacing any existing codec with the same name.
    pub fn register<C: Codec>(mut self, codec: C) -> Self {
        let boxed = BoxedCodec::new(codec);
        if let Some(existing) = self.codecs.iter_mut().find(|c| c.name() == boxed.name()) {
            *existing = boxed;
        } else {
            self.codecs.push(boxed);
        }
        self
    }

    /// Look up a compressing codec by wire name.
    ///
    /// Returns `None` for `identity` and for unregistered names; use
    /// [`is_supported`](Self::is_supported) to tell the two apart.
    pub fn get(&self, name: &str) -> Option<&BoxedCodec> {
        self.codecs.iter().find(|c| c.name() == name)
    }

    /// Whether a wire name is acceptable on this registry.
    ///
    /// `identity` (and the empty string) are always supported.
    pub fn is_supported(&self, name: &str) -> bool {
        name.is_empty() || name == IDENTITY || self.get(name).is_some()
    }

    /// Names of the registered codecs, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.codecs.iter().map(|c| c.name())
    }

    /// Comma-separated accept header value listing the loaded codecs.
    ///
    /// Only registered codecs are advertised; `identity` closes the list.
    pub fn accept_header(&self) -> String {
        let mut value = String::new();
        for name in self.names() {
            value.push_str(name);
            value.push_str(", ");
        }
        value.push_str(IDENTITY);
        value
    }
}

/// Gzip codec using flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    /// Create a new GzipCodec with the specified compression level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::new(self.level));
        encoder.write_all(data)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }
}

/// Identity codec (no compression).
///
/// Exists for embedders that need a `Codec` value; the call paths represent
/// identity as the absence of a codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &'static str {
        IDENTITY
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Brotli codec.
#[derive(Debug, Clone, Copy)]
pub struct BrotliCodec {
    /// Compression quality (0-11). Default is 4.
    pub quality: u32,
}

impl Default for BrotliCodec {
    fn default() -> Self {
        Self { quality: 4 }
    }
}

impl BrotliCodec {
    /// Create a new BrotliCodec with the specified quality level (0-11).
    pub fn with_quality(quality: u32) -> Self {
        Self {
            quality: quality.min(11),
        }
    }
}

impl Codec for BrotliCodec {
    fn name(&self) -> &'static str {
        "br"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        use brotli::enc::BrotliEncoderParams;
        let mut output = Vec::new();
        let params = BrotliEncoderParams {
            quality: self.quality as i32,
            ..Default::default()
        };
        brotli::enc::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
        Ok(Bytes::from(output))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut output = Vec::new();
        brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut output)?;
        Ok(Bytes::from(output))
    }
}

/// Zstd codec.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    /// Compression level (1-22). Default is 3.
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    /// Create a new ZstdCodec with the specified compression level (1-22).
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let compressed = zstd::bulk::compress(data, self.level).map_err(io::Error::other)?;
        Ok(Bytes::from(compressed))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut decoder = zstd::Decoder::new(data)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }
}

/// Compression configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// Minimum bytes before compression is applied.
    /// Messages smaller than this threshold are sent uncompressed.
    pub min_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { min_bytes: 0 }
    }
}

impl CompressionConfig {
    /// Create a new compression config with the specified minimum bytes threshold.
    pub fn new(min_bytes: usize) -> Self {
        Self { min_bytes }
    }

    /// Disable compression by setting the threshold to usize::MAX.
    pub fn disabled() -> Self {
        Self {
            min_bytes: usize::MAX,
        }
    }

    /// Check if compression is effectively disabled.
    pub fn is_disabled(&self) -> bool {
        self.min_bytes == usize::MAX
    }
}
