//! Client-side Connect protocol error types.

use connect_wire_core::{Code, EnvelopeError, ErrorDetail, Status};

/// Client-side Connect protocol error variants.
///
/// This enum represents the different kinds of failure an RPC can produce:
/// server-signaled statuses, transport failures, message codec failures, and
/// wire-protocol violations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// RPC status error, either signaled by the server or synthesized
    /// locally (timeouts, cancellation).
    #[error("{0}")]
    Rpc(Status),

    /// Transport-level error (connection failed, unexpected EOF, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol error (malformed envelopes, missing terminator, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Create a new status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Rpc(Status::new(code, message))
    }

    /// Create a new status error with just a code.
    pub fn from_code(code: Code) -> Self {
        ClientError::Rpc(Status::from_code(code))
    }

    /// Get the error code.
    ///
    /// For non-Rpc variants, returns the code class of the failure:
    /// - Transport: `Unavailable`
    /// - Encode/Decode: `Internal`
    /// - Protocol: `InvalidArgument`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Rpc(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Encode(_) | ClientError::Decode(_) => Code::Internal,
            ClientError::Protocol(_) => Code::InvalidArgument,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Rpc(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg) => Some(msg),
        }
    }

    /// Get the error details (only for Rpc variant).
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ClientError::Rpc(status) => status.details(),
            _ => &[],
        }
    }

    /// Get the inner Status if this is an Rpc error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    /// Convert into the inner Status if this is an Rpc error.
    pub fn into_status(self) -> Option<Status> {
        match self {
            ClientError::Rpc(status) => Some(status),
            _ => None,
        }
    }

    /// Create a canceled error.
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::canceled(message))
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::deadline_exceeded(message))
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::internal(message))
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::invalid_argument(message))
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::unavailable(message))
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        ClientError::Rpc(Status::not_found(message))
    }

    /// Returns whether this error indicates a transient condition that may
    /// be resolved by retrying.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Rpc(status)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::IncompleteHeader { .. }
            | EnvelopeError::ReservedFlags(_)
            | EnvelopeError::CompressedWithoutCodec => ClientError::Protocol(err.to_string()),
            EnvelopeError::Decompression(msg) => {
                ClientError::Decode(format!("decompression failed: {}", msg))
            }
            EnvelopeError::Compression(msg) => {
                ClientError::Encode(format!("compression failed: {}", msg))
            }
        }
    }
}
