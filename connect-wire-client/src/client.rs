//! Connect RPC client.
//!
//! [`ConnectClient`] turns typed calls into Connect-protocol HTTP/1.1
//! exchanges. Each RPC shape has two entry points:
//!
//! - `call_*` primitives never raise on protocol, transport, timeout, or
//!   server errors; the error is recorded on the returned
//!   [`UnaryOutput`]/[`StreamOutput`].
//! - The facade methods ([`unary`](ConnectClient::unary),
//!   [`server_stream`](ConnectClient::server_stream), ...) raise.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use connect_wire_core::{
    BoxedCodec, CodecRegistry, CompressionConfig, IDENTITY, Metadata, compress_payload,
    envelope_flags, split_unary_trailers, wrap_envelope,
};
use futures::StreamExt;
use http::{HeaderValue, Method, StatusCode, header};
use prost::Message;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Instrument, info_span};

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::options::{CallOptions, duration_to_timeout_header};
use crate::request::{FrameEncoder, RequestStream};
use crate::response::error_parser::parse_error_body;
use crate::response::{ConnectResponse, FrameDecoder, StreamOutput, UnaryOutput};
use crate::transport::{BoxByteStream, Transport, TransportBody};

/// Header name for the Connect protocol version.
const CONNECT_PROTOCOL_VERSION_HEADER: &str = "connect-protocol-version";

/// Connect protocol version.
const CONNECT_PROTOCOL_VERSION: &str = "1";

/// Header name for the Connect timeout in milliseconds.
const CONNECT_TIMEOUT_HEADER: &str = "connect-timeout-ms";

/// Header name for streaming request envelope compression.
const CONNECT_CONTENT_ENCODING: &str = "connect-content-encoding";

/// Header name for streaming response compression negotiation.
const CONNECT_ACCEPT_ENCODING: &str = "connect-accept-encoding";

/// Connect RPC client.
///
/// Cheap to clone; the transport and codec registry are shared.
///
/// # Example
///
/// ```ignore
/// use connect_wire_client::ConnectClient;
///
/// let client = ConnectClient::builder("http://localhost:3000")
///     .use_proto()
///     .build()?;
///
/// let response = client
///     .unary::<SayRequest, SayResponse>("eliza.v1.ElizaService/Say", &request, Default::default())
///     .await?;
/// ```
#[derive(Clone)]
pub struct ConnectClient {
    /// Shared HTTP transport; the client never closes it.
    transport: Arc<dyn Transport>,
    /// Base URL for the service.
    base_url: String,
    /// Use protobuf encoding (true) or JSON encoding (false).
    use_proto: bool,
    /// Codec registry for compression negotiation.
    registry: Arc<CodecRegistry>,
    /// Request compression codec, `None` for identity.
    request_codec: Option<BoxedCodec>,
    /// Compression threshold configuration.
    compression: CompressionConfig,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
    /// User-Agent header value.
    user_agent: HeaderValue,
    /// Precomputed accept header listing the loaded codecs.
    accept_encoding: HeaderValue,
}

impl ConnectClient {
    /// Create a new [`ClientBuilder`] with the given base URL.
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Called by [`ClientBuilder::build`]. Prefer the builder API.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        base_url: String,
        use_proto: bool,
        registry: Arc<CodecRegistry>,
        request_codec: Option<BoxedCodec>,
        compression: CompressionConfig,
        default_timeout: Option<Duration>,
        user_agent: HeaderValue,
        accept_encoding: HeaderValue,
    ) -> Self {
        Self {
            transport,
            base_url,
            use_proto,
            registry,
            request_codec,
            compression,
            default_timeout,
            user_agent,
            accept_encoding,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if protobuf encoding is enabled.
    pub fn is_proto(&self) -> bool {
        self.use_proto
    }

    fn encoding_name(&self) -> &'static str {
        if self.use_proto { "proto" } else { "json" }
    }

    fn unary_content_type(&self) -> &'static str {
        if self.use_proto {
            "application/proto"
        } else {
            "application/json"
        }
    }

    fn streaming_content_type(&self) -> &'static str {
        if self.use_proto {
            "application/connect+proto"
        } else {
            "application/connect+json"
        }
    }

    fn effective_timeout(&self, options: &CallOptions) -> Option<Duration> {
        options.timeout.or(self.default_timeout)
    }

    /// Encode a message for sending.
    fn encode_message<T>(&self, msg: &T) -> Result<Bytes, ClientError>
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

    /// Decode a message from response bytes.
    fn decode_message<T>(&self, bytes: &[u8]) -> Result<T, ClientError>
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

    /// The request codec, when compression is enabled and the payload meets
    /// the size threshold.
    fn request_codec_for(&self, payload_len: usize) -> Option<&BoxedCodec> {
        if self.compression.is_disabled() || payload_len < self.compression.min_bytes {
            return None;
        }
        self.request_codec.as_ref()
    }

    /// The request codec for envelope streams, independent of any single
    /// payload's size (the per-envelope threshold applies inside the encoder).
    fn stream_request_codec(&self) -> Option<BoxedCodec> {
        if self.compression.is_disabled() {
            return None;
        }
        self.request_codec.clone()
    }

    /// Resolve a response `Content-Encoding` / `Connect-Content-Encoding`
    /// value against the registry. Unknown names fail with `internal`.
    fn response_codec(&self, name: Option<&str>) -> Result<Option<BoxedCodec>, ClientError> {
        let Some(name) = name else { return Ok(None) };
        if name.is_empty() || name == IDENTITY {
            return Ok(None);
        }
        self.registry
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| ClientError::internal(format!("unknown response encoding: {}", name)))
    }

    /// Assemble the common parts of a request: method, URL, protocol
    /// version, content type, user agent, timeout header, caller headers.
    fn build_request(
        &self,
        procedure: &str,
        content_type: &'static str,
        timeout: Option<Duration>,
        options: &CallOptions,
        body: TransportBody,
    ) -> Result<http::Request<TransportBody>, ClientError> {
        let url = format!("{}/{}", self.base_url, procedure);
        let mut builder = http::Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(CONNECT_PROTOCOL_VERSION_HEADER, CONNECT_PROTOCOL_VERSION)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::USER_AGENT, self.user_agent.clone());

        if let Some(timeout) = timeout {
            if let Some(timeout_ms) = duration_to_timeout_header(timeout) {
                builder = builder.header(CONNECT_TIMEOUT_HEADER, timeout_ms);
            }
        }

        let mut request = builder
            .body(body)
            .map_err(|e| ClientError::invalid_argument(format!("invalid request: {}", e)))?;

        for (name, value) in options.headers.iter() {
            request.headers_mut().append(name.clone(), value.clone());
        }

        Ok(request)
    }

    /// Make a unary RPC call; errors are recorded on the output.
    ///
    /// # Arguments
    ///
    /// * `procedure` - The full procedure path (e.g., "my.pkg.MyService/MyMethod")
    /// * `request` - The request message
    /// * `options` - Per-call timeout and headers
    pub async fn call_unary<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> UnaryOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "unary",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        );

        let timeout = self.effective_timeout(&options);
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        async {
            match with_deadline(deadline, self.unary_exchange(procedure, request, timeout, &options))
                .await
            {
                Ok(output) => output,
                Err(e) => UnaryOutput::failure(e, Metadata::empty()),
            }
        }
        .instrument(span)
        .await
    }

    async fn unary_exchange<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        timeout: Option<Duration>,
        options: &CallOptions,
    ) -> Result<UnaryOutput<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let payload = self.encode_message(request)?;
        let codec = self.request_codec_for(payload.len());
        let codec_name = codec.map(|c| c.name());
        let (payload, compressed) = compress_payload(payload, codec)?;

        let mut req = self.build_request(
            procedure,
            self.unary_content_type(),
            timeout,
            options,
            TransportBody::full(payload),
        )?;
        if compressed {
            if let Some(name) = codec_name {
                req.headers_mut()
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static(name));
            }
        }
        req.headers_mut()
            .insert(header::ACCEPT_ENCODING, self.accept_encoding.clone());

        let response = self.transport.send(req).await?;
        let (parts, body) = response.into_parts();

        if parts.status != StatusCode::OK {
            let bytes = collect_body(body).await?;
            return Ok(UnaryOutput::failure(
                parse_error_body(parts.status, &bytes),
                Metadata::new(parts.headers),
            ));
        }

        match self.read_unary_message::<Res>(&parts.headers, body).await {
            Ok(message) => {
                let (leading, trailers) = split_unary_trailers(&parts.headers);
                Ok(UnaryOutput::success(message, leading, trailers))
            }
            Err(e) => Ok(UnaryOutput::failure(e, Metadata::new(parts.headers))),
        }
    }

    /// Decompress and decode a unary response body.
    async fn read_unary_message<Res>(
        &self,
        headers: &http::HeaderMap,
        body: BoxByteStream,
    ) -> Result<Res, ClientError>
    where
        Res: Message + DeserializeOwned + Default,
    {
        let encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let codec = self.response_codec(encoding)?;

        let bytes = collect_body(body).await?;
        let bytes = match codec {
            Some(codec) => codec
                .decompress(&bytes)
                .map_err(|e| ClientError::Decode(format!("decompression failed: {}", e)))?,
            None => bytes,
        };

        self.decode_message(&bytes)
    }

    /// Make a server-streaming RPC call; errors are recorded on the output.
    ///
    /// The request body is a single envelope carrying the serialized request.
    /// The returned [`StreamOutput`] yields response messages lazily; after
    /// it is drained, trailers from the end-stream envelope are available.
    pub async fn call_server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "server_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        );

        let timeout = self.effective_timeout(&options);
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        async {
            let open = async {
                let payload = self.encode_message(request)?;
                let codec = self.request_codec_for(payload.len());
                let codec_name = codec.map(|c| c.name());
                let (payload, compressed) = compress_payload(payload, codec)?;
                let flags = if compressed {
                    envelope_flags::COMPRESSED
                } else {
                    envelope_flags::MESSAGE
                };
                let body = Bytes::from(wrap_envelope(&payload, flags));

                let mut req = self.build_request(
                    procedure,
                    self.streaming_content_type(),
                    timeout,
                    &options,
                    TransportBody::full(body),
                )?;
                if compressed {
                    if let Some(name) = codec_name {
                        req.headers_mut()
                            .insert(CONNECT_CONTENT_ENCODING, HeaderValue::from_static(name));
                    }
                }
                req.headers_mut()
                    .insert(CONNECT_ACCEPT_ENCODING, self.accept_encoding.clone());

                self.open_stream(req, deadline).await
            };

            match with_deadline(deadline, open).await {
                Ok(output) => output,
                Err(e) => StreamOutput::failed(e, Metadata::empty()),
            }
        }
        .instrument(span)
        .await
    }

    /// Make a client-streaming RPC call; errors are recorded on the output.
    ///
    /// One envelope is sent per request message, ending with plain EOF. The
    /// server replies with exactly one message; a second message yields
    /// `internal`. Trailers from the end-stream envelope become the output's
    /// trailers.
    pub async fn call_client_stream<Req, Res>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        options: CallOptions,
    ) -> UnaryOutput<Res>
    where
        Req: Message + Serialize + Send + 'static,
        Res: Message + DeserializeOwned + Default,
    {
        let span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "client_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        );

        let timeout = self.effective_timeout(&options);
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        async {
            match with_deadline(
                deadline,
                self.client_stream_exchange(procedure, requests, timeout, &options),
            )
            .await
            {
                Ok(output) => output,
                Err(e) => UnaryOutput::failure(e, Metadata::empty()),
            }
        }
        .instrument(span)
        .await
    }

    async fn client_stream_exchange<Req, Res>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        timeout: Option<Duration>,
        options: &CallOptions,
    ) -> Result<UnaryOutput<Res>, ClientError>
    where
        Req: Message + Serialize + Send + 'static,
        Res: Message + DeserializeOwned + Default,
    {
        let req = self.build_streaming_request(procedure, requests, timeout, options)?;

        let response = self.transport.send(req).await?;
        let (parts, body) = response.into_parts();

        if parts.status != StatusCode::OK {
            let bytes = collect_body(body).await?;
            return Ok(UnaryOutput::failure(
                parse_error_body(parts.status, &bytes),
                Metadata::new(parts.headers),
            ));
        }

        let headers = Metadata::new(parts.headers);
        let encoding = headers.get(CONNECT_CONTENT_ENCODING);
        let codec = match self.response_codec(encoding) {
            Ok(codec) => codec,
            Err(e) => return Ok(UnaryOutput::failure(e, headers)),
        };

        let mut decoder = FrameDecoder::<_, Res>::new(body, self.use_proto, codec);
        let mut first: Option<Res> = None;

        while let Some(item) = decoder.next().await {
            match item {
                Ok(message) => {
                    if first.is_some() {
                        return Ok(UnaryOutput::failure(
                            ClientError::internal("received more than one response message"),
                            headers,
                        ));
                    }
                    first = Some(message);
                }
                Err(e) => {
                    let trailers = decoder.take_trailers().unwrap_or_default();
                    return Ok(UnaryOutput::failure_with_trailers(e, headers, trailers));
                }
            }
        }

        let trailers = decoder.take_trailers().unwrap_or_default();
        match first {
            Some(message) => Ok(UnaryOutput::success(message, headers, trailers)),
            None => Ok(UnaryOutput::failure_with_trailers(
                ClientError::Protocol("expected response message but stream ended".into()),
                headers,
                trailers,
            )),
        }
    }

    /// Make a half-duplex bidirectional streaming RPC call; errors are
    /// recorded on the output.
    ///
    /// The request body is fully sent before response iteration begins;
    /// HTTP/1.1 enforces that ordering.
    pub async fn call_bidi_stream<Req, Res>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        options: CallOptions,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize + Send + 'static,
        Res: Message + DeserializeOwned + Default,
    {
        let span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "bidi_stream",
            rpc.encoding = %self.encoding_name(),
            otel.kind = "client",
        );

        let timeout = self.effective_timeout(&options);
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        async {
            let open = async {
                let req = self.build_streaming_request(procedure, requests, timeout, &options)?;
                self.open_stream(req, deadline).await
            };
            match with_deadline(deadline, open).await {
                Ok(output) => output,
                Err(e) => StreamOutput::failed(e, Metadata::empty()),
            }
        }
        .instrument(span)
        .await
    }

    /// Build a request whose body is an envelope-encoded message stream.
    fn build_streaming_request<Req>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        timeout: Option<Duration>,
        options: &CallOptions,
    ) -> Result<http::Request<TransportBody>, ClientError>
    where
        Req: Message + Serialize + Send + 'static,
    {
        let codec = self.stream_request_codec();
        let codec_name = codec.as_ref().map(|c| c.name());
        let encoder = FrameEncoder::new(requests, self.use_proto, codec, self.compression);

        let mut req = self.build_request(
            procedure,
            self.streaming_content_type(),
            timeout,
            options,
            TransportBody::streaming(encoder),
        )?;
        if let Some(name) = codec_name {
            req.headers_mut()
                .insert(CONNECT_CONTENT_ENCODING, HeaderValue::from_static(name));
        }
        req.headers_mut()
            .insert(CONNECT_ACCEPT_ENCODING, self.accept_encoding.clone());

        Ok(req)
    }

    /// Open a streaming response: interpret status, negotiate the envelope
    /// codec, and hand the body to a [`StreamOutput`].
    async fn open_stream<Res>(
        &self,
        request: http::Request<TransportBody>,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Res: Message + DeserializeOwned + Default,
    {
        let response = self.transport.send(request).await?;
        let (parts, body) = response.into_parts();

        if parts.status != StatusCode::OK {
            let bytes = collect_body(body).await?;
            return Ok(StreamOutput::failed(
                parse_error_body(parts.status, &bytes),
                Metadata::new(parts.headers),
            ));
        }

        let headers = Metadata::new(parts.headers);
        let encoding = headers.get(CONNECT_CONTENT_ENCODING);
        let codec = match self.response_codec(encoding) {
            Ok(codec) => codec,
            Err(e) => return Ok(StreamOutput::failed(e, headers)),
        };

        let decoder = FrameDecoder::new(body, self.use_proto, codec);
        Ok(StreamOutput::open(decoder, headers, deadline))
    }

    // Raising facade methods.

    /// Make a unary RPC call, raising on any error.
    pub async fn unary<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<ConnectResponse<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_unary(procedure, request, options)
            .await
            .into_result()
    }

    /// Make a server-streaming RPC call, raising on immediate failure.
    ///
    /// Failures after open surface through iteration of the returned stream.
    pub async fn server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let output = self.call_server_stream(procedure, request, options).await;
        match output.error() {
            Some(e) => Err(e.clone()),
            None => Ok(output),
        }
    }

    /// Make a client-streaming RPC call, raising on any error.
    pub async fn client_stream<Req, Res>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        options: CallOptions,
    ) -> Result<ConnectResponse<Res>, ClientError>
    where
        Req: Message + Serialize + Send + 'static,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_client_stream(procedure, requests, options)
            .await
            .into_result()
    }

    /// Make a half-duplex bidi streaming RPC call, raising on immediate
    /// failure.
    pub async fn bidi_stream<Req, Res>(
        &self,
        procedure: &str,
        requests: RequestStream<Req>,
        options: CallOptions,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize + Send + 'static,
        Res: Message + DeserializeOwned + Default,
    {
        let output = self.call_bidi_stream(procedure, requests, options).await;
        match output.error() {
            Some(e) => Err(e.clone()),
            None => Ok(output),
        }
    }
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("base_url", &self.base_url)
            .field("use_proto", &self.use_proto)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Read an entire response body.
async fn collect_body(mut body: BoxByteStream) -> Result<Bytes, ClientError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Bound a future by the call deadline; expiry yields `deadline_exceeded`.
async fn with_deadline<F, O>(
    deadline: Option<tokio::time::Instant>,
    fut: F,
) -> Result<O, ClientError>
where
    F: std::future::Future<Output = Result<O, ClientError>>,
{
    match deadline {
        Some(at) => match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::deadline_exceeded("deadline exceeded")),
        },
        None => fut.await,
    }
}
