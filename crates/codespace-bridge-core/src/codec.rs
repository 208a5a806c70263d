//! Base64 codec for binary-safe file transfer over the remote shell.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Encode raw bytes for transfer.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode transferred data.
///
/// Remote `base64` wraps its output at 76 columns, so all ASCII whitespace
/// is dropped before decoding.
///
/// # Errors
/// Returns error if the payload is not valid base64.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}
