//! Unary result carriers.
//!
//! [`UnaryOutput`] is the non-raising result of a unary-shaped call: it
//! always carries response headers and trailers, and either a message or an
//! error. [`ConnectResponse`] is the success value the raising facade
//! methods return.

use connect_wire_core::Metadata;

use crate::ClientError;

/// Result of a unary-shaped RPC, populated once before return.
///
/// Protocol, transport, timeout, and server errors are recorded here rather
/// than raised; callers that want raising semantics use
/// [`into_result`](Self::into_result) or the client's facade methods.
/// When [`error`](Self::error) is set, there is no message to read.
#[derive(Debug)]
pub struct UnaryOutput<T> {
    message: Option<T>,
    headers: Metadata,
    trailers: Metadata,
    error: Option<ClientError>,
}

impl<T> UnaryOutput<T> {
    /// A successful output.
    pub(crate) fn success(message: T, headers: Metadata, trailers: Metadata) -> Self {
        Self {
            message: Some(message),
            headers,
            trailers,
            error: None,
        }
    }

    /// A failed output with whatever headers were received before failure.
    pub(crate) fn failure(error: ClientError, headers: Metadata) -> Self {
        Self {
            message: None,
            headers,
            trailers: Metadata::empty(),
            error: Some(error),
        }
    }

    /// A failed output that still observed trailers (client-stream calls
    /// whose end-stream envelope carried an error).
    pub(crate) fn failure_with_trailers(
        error: ClientError,
        headers: Metadata,
        trailers: Metadata,
    ) -> Self {
        Self {
            message: None,
            headers,
            trailers,
            error: Some(error),
        }
    }

    /// The response message, absent when the call failed.
    pub fn message(&self) -> Option<&T> {
        self.message.as_ref()
    }

    /// Consume the output and return the message, if any.
    pub fn into_message(self) -> Option<T> {
        self.message
    }

    /// Leading response metadata (HTTP headers).
    pub fn response_headers(&self) -> &Metadata {
        &self.headers
    }

    /// Trailing response metadata.
    ///
    /// For unary calls these come from `trailer-`-prefixed HTTP headers; for
    /// client-stream calls, from the end-stream envelope.
    pub fn response_trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// The recorded error, if the call failed.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Whether the call failed.
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into a raising result.
    pub fn into_result(self) -> Result<ConnectResponse<T>, ClientError> {
        match self.error {
            Some(error) => Err(error),
            None => {
                let message = self.message.ok_or_else(|| {
                    ClientError::internal("unary output carried neither message nor error")
                })?;
                Ok(ConnectResponse {
                    message,
                    metadata: self.headers,
                    trailers: self.trailers,
                })
            }
        }
    }
}

/// A successful unary-shaped response: message plus metadata.
#[derive(Debug)]
pub struct ConnectResponse<T> {
    message: T,
    metadata: Metadata,
    trailers: Metadata,
}

impl<T> ConnectResponse<T> {
    /// Create a response from its parts.
    pub fn new(message: T, metadata: Metadata, trailers: Metadata) -> Self {
        Self {
            message,
            metadata,
            trailers,
        }
    }

    /// Borrow the response message.
    pub fn message(&self) -> &T {
        &self.message
    }

    /// Leading response metadata (HTTP headers).
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Trailing response metadata.
    pub fn trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// Consume the response and return the message.
    pub fn into_inner(self) -> T {
        self.message
    }

    /// Consume the response and return all parts.
    pub fn into_parts(self) -> (T, Metadata, Metadata) {
        (self.message, self.metadata, self.trailers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_wire_core::Code;

    #[test]
    fn test_unary_output_success() {
        let mut trailers = Metadata::empty();
        trailers.append("x-checksum", "abc");

        let output = UnaryOutput::success("reply", Metadata::empty(), trailers);

        assert_eq!(output.message(), Some(&"reply"));
        assert!(output.error().is_none());
        assert!(!output.is_err());
        assert_eq!(output.response_trailers().get("x-checksum"), Some("abc"));

        let response = output.into_result().unwrap();
        assert_eq!(*response.message(), "reply");
        assert_eq!(response.trailers().get("x-checksum"), Some("abc"));
    }

    #[test]
    fn test_unary_output_failure() {
        let output: UnaryOutput<String> =
            UnaryOutput::failure(ClientError::not_found("no"), Metadata::empty());

        assert!(output.message().is_none());
        assert!(output.is_err());
        assert_eq!(output.error().unwrap().code(), Code::NotFound);

        let err = output.into_result().unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[test]
    fn test_connect_response_into_parts() {
        let mut metadata = Metadata::empty();
        metadata.append("content-type", "application/proto");

        let response = ConnectResponse::new(7u32, metadata, Metadata::empty());
        let (message, metadata, trailers) = response.into_parts();

        assert_eq!(message, 7);
        assert_eq!(metadata.get("content-type"), Some("application/proto"));
        assert!(trailers.is_empty());
    }
}
