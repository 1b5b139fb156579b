//! Text encodings used by the transport: base64url and PEM armor

use crate::error::TrustError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Line width of PEM bodies
const PEM_LINE: usize = 64;

pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_decode(text: &str) -> Result<Vec<u8>, TrustError> {
    URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|e| TrustError::MalformedPayload(format!("invalid base64url: {}", e)))
}

/// Wrap bytes in a `-----BEGIN <label>-----` block
pub fn pem_encode(label: &str, bytes: &[u8]) -> String {
    let body = STANDARD.encode(bytes);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(PEM_LINE) {
        // chunks of an ASCII string are valid UTF-8
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// True if `text` looks like a PEM block
pub fn is_pem(text: &str) -> bool {
    text.trim_start().starts_with("-----BEGIN ")
}

/// Decode the body of a PEM block, whatever its label
pub fn pem_decode(text: &str) -> Result<Vec<u8>, TrustError> {
    let text = text.trim();
    let begin_end = text
        .find("-----BEGIN ")
        .and_then(|start| text[start + 11..].find("-----").map(|i| start + 11 + i + 5))
        .ok_or_else(|| TrustError::MalformedPayload("missing PEM header".to_string()))?;
    let end_start = text
        .rfind("-----END ")
        .filter(|&i| i >= begin_end)
        .ok_or_else(|| TrustError::MalformedPayload("missing PEM footer".to_string()))?;

    let body: String = text[begin_end..end_start]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD
        .decode(body.as_bytes())
        .or_else(|_| URL_SAFE_NO_PAD.decode(body.trim_end_matches('=').as_bytes()))
        .map_err(|e| TrustError::MalformedPayload(format!("invalid PEM body: {}", e)))
}
