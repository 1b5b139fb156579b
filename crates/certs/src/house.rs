//! House certificates
//!
//! The root authority binds a house identity to a public key and a capability
//! set. Issuance happens offline and performs no validation; trust in the
//! result comes from the root key having been provisioned out of band.

use crate::payload::{Signable, Signed, SignedPayload};
use chrono::serde::ts_milliseconds;
use rollet_core::encoding::{is_pem, pem_decode, pem_encode};
use rollet_core::time::check_window;
use rollet_core::{Keypair, PublicKey, Timestamp, TrustError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// PEM label used when exporting a certificate
pub const PEM_LABEL: &str = "HOUSE CERTIFICATE";

/// Signed fields of a house certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HouseCertificatePayload {
    /// Certificate subject: the house identity
    pub house_id: String,
    /// House signing key
    pub public_key: PublicKey,
    #[serde(with = "ts_milliseconds")]
    pub not_before: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub not_after: Timestamp,
    pub capabilities: Vec<String>,
}

impl Signable for HouseCertificatePayload {
    fn tagged(&self) -> SignedPayload<'_> {
        SignedPayload::HouseCert(self)
    }
}

pub type HouseCertificate = Signed<HouseCertificatePayload>;

impl HouseCertificate {
    pub fn house_id(&self) -> &str {
        &self.payload.house_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.payload.public_key
    }

    /// Key id derived from the certified public key
    pub fn key_id(&self) -> String {
        self.payload.public_key.key_id()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.payload.capabilities.iter().any(|c| c == capability)
    }

    /// Parse raw JSON or a PEM block wrapping base64 JSON
    pub fn import(text: &str) -> Result<Self, TrustError> {
        if is_pem(text) {
            let json = pem_decode(text)?;
            Ok(serde_json::from_slice(&json)?)
        } else {
            Ok(serde_json::from_str(text.trim())?)
        }
    }

    pub fn to_pem(&self) -> String {
        pem_encode(PEM_LABEL, &crate::payload::canonical_json(self))
    }
}

/// Sign `payload` with the root key
pub fn issue(payload: HouseCertificatePayload, root_key: &Keypair) -> HouseCertificate {
    Signed::sign(payload, root_key)
}

/// Time window, then signature, with the reason kept
pub fn check(
    cert: &HouseCertificate,
    root_public_key: &PublicKey,
    now: Timestamp,
) -> Result<(), TrustError> {
    check_window(now, cert.payload.not_before, Some(cert.payload.not_after))?;
    cert.verify_signature(root_public_key)
}

/// Validate a certificate against the root key.
///
/// Every failure collapses to `false`; the reason is only logged.
pub fn validate(cert: &HouseCertificate, root_public_key: &PublicKey, now: Timestamp) -> bool {
    match check(cert, root_public_key, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(house_id = %cert.payload.house_id, reason = %e, "house certificate rejected");
            false
        }
    }
}

/// Proof that the house holds its signing key, answered to an authority nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncProofPayload {
    pub house_id: String,
    pub nonce: String,
}

impl Signable for SyncProofPayload {
    fn tagged(&self) -> SignedPayload<'_> {
        SignedPayload::SyncProof(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rollet_core::time;

    fn payload(house_key: &Keypair, now: Timestamp) -> HouseCertificatePayload {
        HouseCertificatePayload {
            house_id: "h1".to_string(),
            public_key: house_key.public_key(),
            not_before: now,
            not_after: now + Duration::days(30),
            capabilities: vec!["issue-bet-cert".to_string(), "issue-receipt".to_string()],
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let root = Keypair::generate();
        let house = Keypair::generate();
        let now = time::now();
        let cert = issue(payload(&house, now), &root);

        assert!(validate(&cert, &root.public_key(), now));
        assert!(cert.has_capability("issue-receipt"));
        assert!(!cert.has_capability("mint"));
    }

    #[test]
    fn test_window_edges() {
        let root = Keypair::generate();
        let house = Keypair::generate();
        let now = time::now();
        let cert = issue(payload(&house, now), &root);
        let ms = Duration::milliseconds(1);

        assert_eq!(check(&cert, &root.public_key(), now - ms), Err(TrustError::NotYetValid));
        assert!(validate(&cert, &root.public_key(), cert.payload.not_after));
        assert_eq!(
            check(&cert, &root.public_key(), cert.payload.not_after + ms),
            Err(TrustError::Expired)
        );
        assert!(!validate(&cert, &root.public_key(), cert.payload.not_after + ms));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let root = Keypair::generate();
        let impostor = Keypair::generate();
        let house = Keypair::generate();
        let now = time::now();
        let cert = issue(payload(&house, now), &impostor);
        assert_eq!(check(&cert, &root.public_key(), now), Err(TrustError::SignatureInvalid));
    }

    #[test]
    fn test_capability_tamper_rejected() {
        let root = Keypair::generate();
        let house = Keypair::generate();
        let now = time::now();
        let mut cert = issue(payload(&house, now), &root);
        cert.payload.capabilities.push("mint".to_string());
        assert!(!validate(&cert, &root.public_key(), now));
    }

    #[test]
    fn test_import_json_and_pem() {
        let root = Keypair::generate();
        let house = Keypair::generate();
        let cert = issue(payload(&house, time::now()), &root);

        let json = serde_json::to_string(&cert).unwrap();
        assert_eq!(HouseCertificate::import(&json).unwrap(), cert);

        let pem = cert.to_pem();
        assert!(pem.starts_with("-----BEGIN HOUSE CERTIFICATE-----"));
        assert_eq!(HouseCertificate::import(&pem).unwrap(), cert);
    }

    #[test]
    fn test_import_garbage_is_malformed() {
        assert!(matches!(
            HouseCertificate::import("{not json"),
            Err(TrustError::MalformedPayload(_))
        ));
    }
}
