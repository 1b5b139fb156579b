//! Trust and key errors

use thiserror::Error;

/// Why a signed artifact or protocol message was rejected.
///
/// Verification entry points collapse the trust variants (`SignatureInvalid`,
/// `Expired`, `NotYetValid`, `NotAuthorized`) into a plain `false` so callers
/// present one "rejected" outcome. `MalformedPayload` and `Network` are
/// operator-actionable and are always surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("Signature invalid")]
    SignatureInvalid,

    #[error("Artifact expired")]
    Expired,

    #[error("Artifact not yet valid")]
    NotYetValid,

    #[error("House certificate is not on the allow-list")]
    NotAuthorized,

    #[error("Challenge mismatch: {0}")]
    ChallengeMismatch(&'static str),

    #[error("Replay detected: {0}")]
    ReplayDetected(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl TrustError {
    /// True for failures a caller should show as a uniform rejection
    pub fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            TrustError::SignatureInvalid
                | TrustError::Expired
                | TrustError::NotYetValid
                | TrustError::NotAuthorized
                | TrustError::ChallengeMismatch(_)
        )
    }
}

impl From<serde_json::Error> for TrustError {
    fn from(e: serde_json::Error) -> Self {
        TrustError::MalformedPayload(e.to_string())
    }
}

/// Errors decoding key material
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key hex: {0}")]
    InvalidHex(String),

    #[error("Key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidKey(String),
}
