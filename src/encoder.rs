//! Base64 encoding for image payloads

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Encodes raw bytes as standard, padded base64
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Builds a `data:` URL embedding an already-encoded payload
pub fn data_url(mime: &str, base64_payload: &str) -> String {
    format!("data:{};base64,{}", mime, base64_payload)
}
