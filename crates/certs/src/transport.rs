//! Opaque string transport
//!
//! Artifacts travel between devices as JSON strings (typically inside a QR
//! code). Nothing here checks trust; parsing only guarantees shape.

use crate::bet::BetCertificate;
use crate::house::HouseCertificate;
use crate::join::{JoinChallenge, JoinResponse};
use crate::receipt::BankReceipt;
use rollet_core::encoding::{base64url_decode, base64url_encode};
use rollet_core::TrustError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Serialize any artifact for transport
pub fn encode<T: Serialize>(artifact: &T) -> Result<String, TrustError> {
    serde_json::to_string(artifact).map_err(|e| TrustError::MalformedPayload(e.to_string()))
}

/// Parse a transported string as `T`
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<T, TrustError> {
    Ok(serde_json::from_str(text.trim())?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingTag {
    Pairing,
}

/// One-time handoff of a player's TOTP secret to the house
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PairingPayload {
    #[serde(rename = "type")]
    pub kind: PairingTag,
    pub player_id: String,
    /// base64url secret bytes
    pub secret: String,
}

impl PairingPayload {
    pub fn new(player_id: &str, secret: &[u8]) -> Self {
        Self {
            kind: PairingTag::Pairing,
            player_id: player_id.to_string(),
            secret: base64url_encode(secret),
        }
    }

    pub fn secret_bytes(&self) -> Result<Vec<u8>, TrustError> {
        base64url_decode(&self.secret)
    }
}

/// Any artifact a scanner may hand us, recognized by its shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    HouseCert(HouseCertificate),
    BetCert(BetCertificate),
    BankReceipt(BankReceipt),
    JoinResponse(JoinResponse),
    JoinChallenge(JoinChallenge),
    Pairing(PairingPayload),
}

impl Artifact {
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        serde_json::from_str(text.trim()).map_err(|_| {
            TrustError::MalformedPayload("not a recognized artifact".to_string())
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::HouseCert(_) => "house-cert",
            Artifact::BetCert(_) => "bet-cert",
            Artifact::BankReceipt(_) => "bank-receipt",
            Artifact::JoinResponse(_) => "join-response",
            Artifact::JoinChallenge(_) => "join-challenge",
            Artifact::Pairing(_) => "pairing",
        }
    }
}
