//! Inbound frame decoding.
//!
//! Frames carry bare JSON values with no envelope. When the server has
//! several broadcasts queued for a client it writes them into one frame,
//! separated by `\n`, so a frame decodes to a list of values.

use serde_json::Value;

use crate::error::PayloadError;

/// Decodes a text frame into its JSON values.
///
/// # Errors
///
/// Returns [`PayloadError::Empty`] for a blank frame and
/// [`PayloadError::Malformed`] if any part of the frame is not JSON. A frame
/// is decoded all-or-nothing.
pub fn decode_text(text: &str) -> Result<Vec<Value>, PayloadError> {
    if text.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .map(|value| value.map_err(PayloadError::from))
        .collect()
}

/// Decodes a binary frame holding UTF-8 JSON text.
///
/// # Errors
///
/// Returns [`PayloadError::NotUtf8`] for non-UTF-8 bytes, otherwise the
/// same errors as [`decode_text`].
pub fn decode_binary(bytes: &[u8]) -> Result<Vec<Value>, PayloadError> {
    let text = std::str::from_utf8(bytes).map_err(|_| PayloadError::NotUtf8)?;
    decode_text(text)
}
