//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`ConnectClient`].

use std::sync::Arc;
use std::time::Duration;

use connect_wire_core::{BoxedCodec, CodecRegistry, CompressionConfig, IDENTITY};
use http::HeaderValue;

use crate::client::ConnectClient;
use crate::transport::{HyperTransport, Transport};

/// Builder for creating a [`ConnectClient`].
///
/// # Example
///
/// ```ignore
/// use connect_wire_client::ClientBuilder;
///
/// let client = ClientBuilder::new("http://localhost:3000")
///     .use_proto() // protobuf encoding (default is JSON)
///     .request_encoding("gzip")
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Base URL for the service (e.g., "http://localhost:3000"), no trailing slash.
    base_url: String,
    /// Transport override; defaults to [`HyperTransport`].
    transport: Option<Arc<dyn Transport>>,
    /// Use protobuf encoding (true) or JSON encoding (false).
    use_proto: bool,
    /// Codec registry for compression negotiation.
    registry: CodecRegistry,
    /// Wire name of the request compression codec.
    request_encoding: Option<String>,
    /// Compression threshold configuration.
    compression: CompressionConfig,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
    /// User-Agent header value.
    user_agent: String,
}

/// Errors produced while building a client.
///
/// These are caller errors and surface synchronously, unlike the
/// protocol-level errors recorded on call outputs.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The requested compression codec is not in the registry.
    #[error("unsupported request encoding: {0}")]
    UnsupportedEncoding(String),

    /// The configured user agent is not a valid header value.
    #[error("invalid user agent: {0}")]
    InvalidUserAgent(String),
}

impl ClientBuilder {
    /// Create a new builder with the given base URL.
    ///
    /// The base URL should include scheme and host, without a trailing slash.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            transport: None,
            use_proto: false, // JSON default for broader compatibility
            registry: CodecRegistry::standard(),
            request_encoding: None,
            compression: CompressionConfig::default(),
            default_timeout: None,
            user_agent: concat!("connect-wire/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Use protobuf encoding for messages.
    pub fn use_proto(mut self) -> Self {
        self.use_proto = true;
        self
    }

    /// Use JSON encoding for messages (the default).
    pub fn use_json(mut self) -> Self {
        self.use_proto = false;
        self
    }

    /// Supply a custom transport.
    ///
    /// The transport is shared across calls and never closed by the client.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the codec registry.
    ///
    /// The registry controls which codecs are advertised in accept headers
    /// and which response encodings can be decoded.
    pub fn codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Compress request bodies (unary) and envelopes (streaming) with the
    /// named codec. The name must be loaded in the registry.
    pub fn request_encoding<S: Into<String>>(mut self, name: S) -> Self {
        self.request_encoding = Some(name.into());
        self
    }

    /// Set the compression threshold configuration.
    pub fn compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Set the default timeout applied to every call without a per-call
    /// override.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client.
    ///
    /// Fails synchronously on caller errors: an unsupported request encoding
    /// or an invalid user agent.
    pub fn build(self) -> Result<ConnectClient, ClientBuildError> {
        let request_codec: Option<BoxedCodec> = match self.request_encoding.as_deref() {
            None | Some(IDENTITY) | Some("") => None,
            Some(name) => Some(
                self.registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ClientBuildError::UnsupportedEncoding(name.to_string()))?,
            ),
        };

        let user_agent = HeaderValue::try_from(self.user_agent.as_str())
            .map_err(|_| ClientBuildError::InvalidUserAgent(self.user_agent.clone()))?;

        // Codec names must be valid header tokens to appear in encoding
        // headers at all.
        let accept_encoding = HeaderValue::try_from(self.registry.accept_header())
            .expect("codec names form a valid accept header");

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new()));

        Ok(ConnectClient::new(
            transport,
            self.base_url,
            self.use_proto,
            Arc::new(self.registry),
            request_codec,
            self.compression,
            self.default_timeout,
            user_agent,
            accept_encoding,
        ))
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport.is_some())
            .field("use_proto", &self.use_proto)
            .field("request_encoding", &self.request_encoding)
            .field("default_timeout", &self.default_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_json() {
        let client = ClientBuilder::new("http://localhost:3000").build().unwrap();
        assert!(!client.is_proto());
    }

    #[test]
    fn test_builder_use_proto() {
        let client = ClientBuilder::new("http://localhost:3000")
            .use_proto()
            .build()
            .unwrap();
        assert!(client.is_proto());
    }

    #[test]
    fn test_builder_rejects_unknown_encoding() {
        let result = ClientBuilder::new("http://localhost:3000")
            .request_encoding("lz4")
            .build();

        assert!(matches!(
            result,
            Err(ClientBuildError::UnsupportedEncoding(name)) if name == "lz4"
        ));
    }

    #[test]
    fn test_builder_identity_encoding_is_no_compression() {
        let client = ClientBuilder::new("http://localhost:3000")
            .request_encoding("identity")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_builder_encoding_respects_injected_registry() {
        // An empty registry supports only identity; gzip becomes a caller error.
        let result = ClientBuilder::new("http://localhost:3000")
            .codec_registry(CodecRegistry::empty())
            .request_encoding("gzip")
            .build();

        assert!(matches!(
            result,
            Err(ClientBuildError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_user_agent() {
        let result = ClientBuilder::new("http://localhost:3000")
            .user_agent("bad\nagent")
            .build();

        assert!(matches!(result, Err(ClientBuildError::InvalidUserAgent(_))));
    }
}
