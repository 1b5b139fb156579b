//! Canonical signed payloads
//!
//! A signature always covers the payload wrapped in [`SignedPayload`], so the
//! signed bytes start with an explicit `"type"` discriminant followed by the
//! payload fields in declaration order. Verifiers rebuild those bytes from the
//! typed payload; a payload struct never carries loose fields, and parsing
//! rejects unknown ones.

use crate::bet::BetCertificatePayload;
use crate::house::{HouseCertificatePayload, SyncProofPayload};
use crate::join::JoinResponsePayload;
use crate::receipt::BankReceiptPayload;
use rollet_core::{Keypair, PublicKey, TrustError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Tagged view of every payload kind that can be signed
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignedPayload<'a> {
    HouseCert(&'a HouseCertificatePayload),
    BetCert(&'a BetCertificatePayload),
    BankReceipt(&'a BankReceiptPayload),
    JoinResponse(&'a JoinResponsePayload),
    SyncProof(&'a SyncProofPayload),
}

impl SignedPayload<'_> {
    /// Discriminant as written into the signed bytes
    pub fn kind(&self) -> &'static str {
        match self {
            SignedPayload::HouseCert(_) => "house-cert",
            SignedPayload::BetCert(_) => "bet-cert",
            SignedPayload::BankReceipt(_) => "bank-receipt",
            SignedPayload::JoinResponse(_) => "join-response",
            SignedPayload::SyncProof(_) => "sync-proof",
        }
    }
}

/// Serialize to canonical JSON bytes
pub(crate) fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical payload serialization should never fail")
}

/// A payload that can be signed
pub trait Signable: Serialize + DeserializeOwned + Clone {
    fn tagged(&self) -> SignedPayload<'_>;

    /// Bytes covered by the signature
    fn canonical_bytes(&self) -> Vec<u8> {
        canonical_json(&self.tagged())
    }

    /// Sign with `key`, returning the hex signature
    fn sign_with(&self, key: &Keypair) -> String {
        key.sign(&self.canonical_bytes())
    }

    fn verify_with(&self, key: &PublicKey, signature: &str) -> Result<(), TrustError> {
        key.verify(&self.canonical_bytes(), signature)
    }
}

/// Payload plus signature, the shape of every issued artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signed<T> {
    pub payload: T,
    pub signature: String,
}

impl<T: Signable> Signed<T> {
    /// Sign `payload` as-is
    pub fn sign(payload: T, key: &Keypair) -> Self {
        let signature = payload.sign_with(key);
        Self { payload, signature }
    }

    /// Check the signature only (no time window)
    pub fn verify_signature(&self, key: &PublicKey) -> Result<(), TrustError> {
        self.payload.verify_with(key, &self.signature)
    }
}
