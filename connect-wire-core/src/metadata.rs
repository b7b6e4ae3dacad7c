//! Header and trailer metadata model.
//!
//! Connect metadata is a case-insensitive, ordered, multi-valued mapping from
//! ASCII header names to string values. Keys ending in `-bin` carry binary
//! values, base64url-encoded without padding on the wire.

use base64::Engine;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Suffix marking binary metadata keys.
pub const BINARY_SUFFIX: &str = "-bin";

/// Prefix carried by unary response trailers in HTTP headers.
pub const TRAILER_PREFIX: &str = "trailer-";

/// Whether a metadata key carries a binary (base64url) value.
pub fn is_binary_key(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(BINARY_SUFFIX)
}

/// Encode binary metadata bytes into their wire header value.
pub fn encode_binary_value(value: &[u8]) -> HeaderValue {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value);
    // base64url output is always a valid header value
    HeaderValue::from_str(&encoded).expect("base64 produced invalid header value")
}

/// Decode a binary metadata header value.
///
/// The wire form is base64url without padding; padded input is accepted for
/// interoperability.
pub fn decode_binary_value(value: &HeaderValue) -> Option<Vec<u8>> {
    let s = value.to_str().ok()?;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(s))
        .ok()
}

/// Case-insensitive, ordered, multi-valued metadata map.
///
/// Thin wrapper over [`http::HeaderMap`] that adds the Connect binary
/// metadata rules. Output metadata handed to callers is immutable by
/// construction: accessors borrow, and the call paths never mutate a map
/// after returning it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Wrap an existing header map.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// An empty metadata map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the first value for a key as a string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get all values for a key, in insertion order.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Get and decode a binary (`-bin`) value.
    pub fn get_binary(&self, name: &str) -> Option<Vec<u8>> {
        self.headers.get(name).and_then(decode_binary_value)
    }

    /// Append a string value.
    ///
    /// Returns `false` (leaving the map unchanged) if the name or value is
    /// not valid header material.
    pub fn append(&mut self, name: &str, value: &str) -> bool {
        let Ok(name) = HeaderName::try_from(name) else {
            return false;
        };
        let Ok(value) = HeaderValue::try_from(value) else {
            return false;
        };
        self.headers.append(name, value);
        true
    }

    /// Append a binary value under a `-bin` key, encoding it for the wire.
    ///
    /// Returns `false` if the key does not end in `-bin` or is invalid.
    pub fn append_binary(&mut self, name: &str, value: &[u8]) -> bool {
        if !is_binary_key(name) {
            return false;
        }
        let Ok(name) = HeaderName::try_from(name) else {
            return false;
        };
        self.headers.append(name, encode_binary_value(value));
        true
    }

    /// Whether any value exists for a key.
    pub fn contains_key(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Number of values (not keys) in the map.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all (name, value) pairs, names repeated per value.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    /// Borrow the underlying header map.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the wrapper and return the underlying header map.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Build metadata from the JSON wire map of an end-stream envelope.
    ///
    /// Entries with invalid names or values are dropped.
    pub fn from_wire_map(map: HashMap<String, Vec<String>>) -> Self {
        let mut headers = HeaderMap::new();
        for (key, values) in map {
            if let Ok(name) = HeaderName::try_from(&key) {
                for value in values {
                    if let Ok(hv) = HeaderValue::try_from(&value) {
                        headers.append(name.clone(), hv);
                    }
                }
            }
        }
        Self { headers }
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

/// Split unary response headers into leading metadata and trailers.
///
/// Keys prefixed with `trailer-` form the trailer set, with the prefix
/// stripped; everything else is leading metadata.
pub fn split_unary_trailers(headers: &HeaderMap) -> (Metadata, Metadata) {
    let mut leading = HeaderMap::new();
    let mut trailers = HeaderMap::new();

    for (name, value) in headers {
        match name.as_str().strip_prefix(TRAILER_PREFIX) {
            Some(stripped) => {
                if let Ok(stripped) = HeaderName::try_from(stripped) {
                    trailers.append(stripped, value.clone());
                }
            }
            None => {
                leading.append(name.clone(), value.clone());
            }
        }
    }

    (Metadata::new(leading), Metadata::new(trailers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_case_insensitive_lookup() {
        let mut meta = Metadata::empty();
        assert!(meta.append("X-Request-Id", "abc"));

        assert_eq!(meta.get("x-request-id"), Some("abc"));
        assert_eq!(meta.get("X-REQUEST-ID"), Some("abc"));
    }

    #[test]
    fn test_metadata_multi_value_order() {
        let mut meta = Metadata::empty();
        meta.append("x-multi", "one");
        meta.append("x-multi", "two");
        meta.append("x-multi", "three");

        let values: Vec<_> = meta.get_all("x-multi").collect();
        assert_eq!(values, vec!["one", "two", "three"]);
        assert_eq!(meta.get("x-multi"), Some("one"));
        assert_eq!(meta.len(), 3);
    }

    #[test]
    fn test_metadata_append_invalid() {
        let mut meta = Metadata::empty();
        assert!(!meta.append("bad\0name", "value"));
        assert!(!meta.append("x-ok", "bad\nvalue"));
        assert!(meta.is_empty());
    }

    #[test]
    fn test_binary_metadata_round_trip() {
        let mut meta = Metadata::empty();
        assert!(meta.append_binary("x-token-bin", &[0xDE, 0xAD, 0xBE, 0xEF]));

        // wire value is base64url without padding
        assert_eq!(meta.get("x-token-bin"), Some("3q2-7w"));
        assert_eq!(meta.get_binary("x-token-bin"), Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn test_binary_metadata_requires_bin_suffix() {
        let mut meta = Metadata::empty();
        assert!(!meta.append_binary("x-token", b"raw"));
        assert!(meta.is_empty());
    }

    #[test]
    fn test_binary_metadata_accepts_padded_input() {
        let mut meta = Metadata::empty();
        meta.append("x-token-bin", "3q2-7w=="); // padded variant of the same bytes
        assert_eq!(meta.get_binary("x-token-bin"), Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn test_is_binary_key() {
        assert!(is_binary_key("x-token-bin"));
        assert!(is_binary_key("X-Token-BIN"));
        assert!(!is_binary_key("x-token"));
    }

    #[test]
    fn test_from_wire_map() {
        let mut map = HashMap::new();
        map.insert("x-a".to_string(), vec!["1".to_string(), "2".to_string()]);
        map.insert("bad\0key".to_string(), vec!["x".to_string()]);

        let meta = Metadata::from_wire_map(map);
        let values: Vec<_> = meta.get_all("x-a").collect();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn test_split_unary_trailers() {
        let mut headers = HeaderMap::new();
        headers.append("content-type", "application/proto".parse().unwrap());
        headers.append("trailer-x-checksum", "abc".parse().unwrap());
        headers.append("trailer-x-checksum", "def".parse().unwrap());
        headers.append("x-request-id", "42".parse().unwrap());

        let (leading, trailers) = split_unary_trailers(&headers);

        assert_eq!(leading.get("content-type"), Some("application/proto"));
        assert_eq!(leading.get("x-request-id"), Some("42"));
        assert!(!leading.contains_key("trailer-x-checksum"));

        let values: Vec<_> = trailers.get_all("x-checksum").collect();
        assert_eq!(values, vec!["abc", "def"]);
        assert_eq!(trailers.len(), 2);
    }
}
