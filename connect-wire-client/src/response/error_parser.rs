//! Error decoding for non-200 responses.
//!
//! A non-200 Connect response carries a JSON error body. When the body is
//! absent or not Connect-shaped, an error is synthesized from the HTTP
//! status instead.

use connect_wire_core::{Code, ErrorPayload, Status};
use http::StatusCode;

use crate::ClientError;

/// How much of a non-JSON error body is preserved as the error message.
const BODY_EXCERPT_LIMIT: usize = 256;

/// Decode an error from a non-200 response status and body.
///
/// Connect error bodies have the form:
/// ```json
/// {"code": "not_found", "message": "no", "details": [{"type": "...", "value": "base64"}]}
/// ```
///
/// Unknown code strings map to `unknown`. Bodies that are not Connect-shaped
/// fall back to the HTTP status table, with the reason phrase (or a body
/// excerpt) as the message.
pub(crate) fn parse_error_body(status: StatusCode, body: &[u8]) -> ClientError {
    if !body.is_empty() {
        if let Ok(payload) = serde_json::from_slice::<ErrorPayload>(body) {
            return ClientError::Rpc(Status::from_payload(payload));
        }
    }

    let code = Code::from_http_status(status.as_u16());
    let message = match std::str::from_utf8(body) {
        Ok(text) if !text.is_empty() => {
            let mut end = text.len().min(BODY_EXCERPT_LIMIT);
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text[..end].to_string()
        }
        _ => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };

    ClientError::new(code, message)
}
