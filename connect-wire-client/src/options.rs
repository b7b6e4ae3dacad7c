//! Per-call options.
//!
//! [`CallOptions`] configures an individual RPC with a timeout and extra
//! headers without touching the client-wide defaults.

use connect_wire_core::{encode_binary_value, is_binary_key};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```ignore
/// use connect_wire_client::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("authorization", "Bearer token123");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for this specific call; overrides the client default.
    pub(crate) timeout: Option<Duration>,
    /// Custom headers for this specific call.
    pub(crate) headers: HeaderMap,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The timeout is sent to the server via the `Connect-Timeout-Ms` header
    /// and also enforced locally; local expiry produces a
    /// `deadline_exceeded` error.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Add a custom header for this call.
    ///
    /// Header names are lowercased on the wire. Names ending in `-bin` should
    /// be added through [`binary_header`](Self::binary_header) instead, which
    /// applies the base64url encoding.
    ///
    /// Headers beginning with "Connect-" are reserved for the protocol.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.append(name, value);
        self
    }

    /// Add a binary metadata header (`-bin` key) for this call.
    ///
    /// The value is base64url-encoded without padding, per the binary
    /// metadata rules.
    ///
    /// # Panics
    ///
    /// Panics if the header name is invalid or does not end in `-bin`.
    pub fn binary_header<K>(mut self, name: K, value: &[u8]) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        assert!(
            is_binary_key(name.as_str()),
            "binary metadata keys must end in -bin"
        );
        self.headers.append(name, encode_binary_value(value));
        self
    }

    /// Try to add a custom header; returns `None` if name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.append(name, value);
        Some(self)
    }

    /// Get a reference to the custom headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the custom headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// Maximum timeout value in milliseconds (10 digits), per the Connect
/// protocol. Larger values are treated as no timeout.
pub(crate) const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Convert a timeout to the `Connect-Timeout-Ms` header value.
///
/// Sub-millisecond remainders round up, so the header never understates the
/// caller's budget. Returns `None` for zero and for values beyond the
/// protocol maximum.
pub(crate) fn duration_to_timeout_header(duration: Duration) -> Option<String> {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        return None;
    }
    Some(millis.to_string())
}
