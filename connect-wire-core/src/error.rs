//! Connect protocol error codes and error values.
//!
//! This module provides:
//! - [`Code`]: the closed set of protocol status codes
//! - [`Status`]: an immutable error value (code, message, details)
//! - [`ErrorDetail`]: self-describing typed error details
//! - [`ErrorPayload`]: the JSON wire form of an error

use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};

/// Connect RPC error codes, matching the codes defined in the Connect protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Parse a code from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "canceled" | "cancelled" => Some(Code::Canceled),
            "unknown" => Some(Code::Unknown),
            "invalid_argument" => Some(Code::InvalidArgument),
            "deadline_exceeded" => Some(Code::DeadlineExceeded),
            "not_found" => Some(Code::NotFound),
            "already_exists" => Some(Code::AlreadyExists),
            "permission_denied" => Some(Code::PermissionDenied),
            "resource_exhausted" => Some(Code::ResourceExhausted),
            "failed_precondition" => Some(Code::FailedPrecondition),
            "aborted" => Some(Code::Aborted),
            "out_of_range" => Some(Code::OutOfRange),
            "unimplemented" => Some(Code::Unimplemented),
            "internal" => Some(Code::Internal),
            "unavailable" => Some(Code::Unavailable),
            "data_loss" => Some(Code::DataLoss),
            "unauthenticated" => Some(Code::Unauthenticated),
            _ => None,
        }
    }

    /// The HTTP status a server reports for this code on a unary response.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Canceled => 499,
            Code::Unknown => 500,
            Code::InvalidArgument => 400,
            Code::DeadlineExceeded => 504,
            Code::NotFound => 404,
            Code::AlreadyExists => 409,
            Code::PermissionDenied => 403,
            Code::ResourceExhausted => 429,
            Code::FailedPrecondition => 400,
            Code::Aborted => 409,
            Code::OutOfRange => 400,
            Code::Unimplemented => 501,
            Code::Internal => 500,
            Code::Unavailable => 503,
            Code::DataLoss => 500,
            Code::Unauthenticated => 401,
        }
    }

    /// Derive a code from a bare HTTP status.
    ///
    /// Used only when a non-200 response body does not carry a
    /// Connect-formatted error. Statuses that several codes share map to the
    /// most general of them.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            408 => Code::DeadlineExceeded,
            409 => Code::AlreadyExists,
            412 => Code::FailedPrecondition,
            416 => Code::OutOfRange,
            429 => Code::ResourceExhausted,
            499 => Code::Canceled, // Client Closed Request (nginx)
            501 => Code::Unimplemented,
            502 | 503 => Code::Unavailable,
            504 => Code::DeadlineExceeded,
            _ => Code::Unknown,
        }
    }

    /// Returns whether this error code indicates a transient condition that
    /// may be resolved by retrying.
    ///
    /// For safe retries the RPC should also be idempotent; retrying a
    /// non-idempotent operation may cause unintended side effects.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Code::Unavailable | Code::ResourceExhausted | Code::Aborted
        )
    }
}

impl std::str::FromStr for Code {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Code::from_str(s).ok_or(UnknownCode)
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode;

impl std::fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unknown error code")
    }
}

impl std::error::Error for UnknownCode {}

/// A self-describing error detail following the Connect protocol.
///
/// Error details are structured Protobuf messages attached to errors. This
/// maps to `google.protobuf.Any` on the wire.
///
/// # Wire Format
///
/// Details are serialized as JSON objects with `type` and `value` fields:
/// ```json
/// {"type": "google.rpc.RetryInfo", "value": "base64-encoded-protobuf"}
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Fully-qualified type name (e.g., "google.rpc.RetryInfo").
    type_url: String,
    /// Protobuf-encoded message bytes.
    value: Vec<u8>,
}

impl ErrorDetail {
    /// Create a new error detail with a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Get the fully-qualified type name.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Get the protobuf-encoded value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl Serialize for ErrorDetail {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("ErrorDetail", 2)?;

        // Strip "type.googleapis.com/" prefix if present (Connect uses short type names)
        let type_name = self
            .type_url
            .strip_prefix("type.googleapis.com/")
            .unwrap_or(&self.type_url);
        s.serialize_field("type", type_name)?;

        // Connect protocol uses raw base64 (no padding)
        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&self.value);
        s.serialize_field("value", &encoded)?;

        s.end()
    }
}

/// An immutable Connect error value: code, message, and typed details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
    details: Vec<ErrorDetail>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: vec![],
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
            details: vec![],
        }
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Add an error detail with type URL and protobuf-encoded bytes.
    pub fn add_detail<S: Into<String>>(mut self, type_url: S, value: Vec<u8>) -> Self {
        self.details.push(ErrorDetail::new(type_url, value));
        self
    }

    /// Add a pre-constructed ErrorDetail.
    pub fn add_error_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    // Convenience constructors

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a not found status.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a permission denied status.
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    /// Create an unauthenticated status.
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create a resource exhausted status.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create a canceled status.
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Build a status from its JSON wire form.
    ///
    /// Unknown code strings map to [`Code::Unknown`]; details with undecodable
    /// base64 values are dropped.
    pub fn from_payload(payload: ErrorPayload) -> Self {
        let code = payload.code.parse().unwrap_or(Code::Unknown);
        let mut status = match payload.message {
            Some(message) => Status::new(code, message),
            None => Status::from_code(code),
        };
        for detail in payload.details {
            if let Some(parsed) = detail.into_detail() {
                status = status.add_error_detail(parsed);
            }
        }
        status
    }

    /// The JSON wire form of this status.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code.as_str().to_string(),
            message: self.message.clone(),
            details: self
                .details
                .iter()
                .map(|d| ErrorDetailPayload {
                    type_url: d
                        .type_url
                        .strip_prefix("type.googleapis.com/")
                        .unwrap_or(&d.type_url)
                        .to_string(),
                    value: base64::engine::general_purpose::STANDARD_NO_PAD.encode(&d.value),
                })
                .collect(),
        }
    }

    /// Returns whether this status indicates a transient condition.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => f.write_str(self.code.as_str()),
        }
    }
}

/// JSON wire form of a Connect error.
///
/// This shape appears both as the body of a non-200 unary response and inside
/// the `error` field of an end-stream envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetailPayload>,
}

/// JSON wire form of a single error detail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetailPayload {
    #[serde(rename = "type")]
    pub type_url: String,
    #[serde(default)]
    pub value: String,
}

impl ErrorDetailPayload {
    /// Decode into an [`ErrorDetail`], or `None` if the value is not base64.
    ///
    /// Connect uses standard base64 without padding, but padded input is
    /// accepted for interoperability.
    pub fn into_detail(self) -> Option<ErrorDetail> {
        let value = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(&self.value)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&self.value))
            .ok()?;
        Some(ErrorDetail::new(self.type_url, value))
    }
}
