//! Connect protocol client runtime for Rust.
//!
//! This crate turns typed remote procedure calls into Connect-protocol
//! HTTP/1.1 exchanges: unary, client-streaming, server-streaming, and
//! half-duplex bidirectional.
//!
//! ## Features
//!
//! - Unary RPC calls (request-response, raw body)
//! - Server / client / half-duplex bidi streaming (envelope-framed bodies)
//! - Both protobuf and JSON message encoding
//! - Per-envelope and whole-body compression (gzip, br, zstd) through an
//!   injectable codec registry
//! - Non-raising `call_*` primitives that record errors on their outputs,
//!   plus raising facade methods
//! - `Connect-Timeout-Ms` propagation with local deadline enforcement
//!
//! ## Example
//!
//! ```ignore
//! use connect_wire_client::{CallOptions, ConnectClient};
//!
//! let client = ConnectClient::builder("http://localhost:3000")
//!     .use_proto()
//!     .build()?;
//!
//! let response = client
//!     .unary::<SayRequest, SayResponse>(
//!         "eliza.v1.ElizaService/Say",
//!         &SayRequest { sentence: "Hello".into() },
//!         CallOptions::new(),
//!     )
//!     .await?;
//! println!("{}", response.message().sentence);
//! ```
//!
//! ## Streaming
//!
//! Streaming calls return a [`StreamOutput`]: an async iterator over the
//! response messages that also owns the transport slot. Trailers become
//! available once the stream is fully drained; a trailing or transport
//! error is yielded once through iteration and stays readable via
//! [`StreamOutput::error`].
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut stream = client
//!     .server_stream::<IntroduceRequest, IntroduceResponse>(
//!         "eliza.v1.ElizaService/Introduce",
//!         &request,
//!         CallOptions::new(),
//!     )
//!     .await?;
//!
//! while let Some(result) = stream.next().await {
//!     println!("{:?}", result?);
//! }
//! let trailers = stream.response_trailers()?;
//! ```
//!
//! Dropping a [`StreamOutput`] releases its connection on every exit path;
//! [`StreamOutput::close`] does the same explicitly, and
//! [`StreamOutput::cancel`] additionally records a sticky `canceled` error.
//!
//! ## Transports
//!
//! HTTP is consumed through the [`Transport`] trait. The bundled
//! [`HyperTransport`] speaks plain HTTP/1.1 with connection pooling; custom
//! transports (TLS, proxies, test doubles) plug in via
//! [`ClientBuilder::transport`].

mod builder;
mod client;
mod error;
mod options;
pub mod request;
pub mod response;
#[cfg(test)]
mod testing;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder};
pub use client::ConnectClient;
pub use error::ClientError;
pub use options::CallOptions;

// Re-export from request module
pub use request::{FrameEncoder, RequestStream};

// Re-export from response module
pub use response::{ConnectResponse, FrameDecoder, StreamOutput, UnaryOutput};

// Re-export transport types at the top level for convenience
pub use transport::{HyperTransport, HyperTransportBuilder, Transport, TransportBody};

// Re-export core types that users need
pub use connect_wire_core::{
    Code, CodecRegistry, CompressionConfig, ErrorDetail, Metadata, Status,
};

// Re-export for generated streaming code
pub use bytes::Bytes;
