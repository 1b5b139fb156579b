//! Authority seam and wire types
//!
//! `POST /sync/challenge {houseCert} -> {nonce}`
//! `POST /sync {houseCert, entries, proof: {nonce, signature}} -> {lastSeq}`

use crate::error::SyncError;
use async_trait::async_trait;
use rollet_certs::HouseCertificate;
use rollet_ledger::LedgerEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub house_cert: HouseCertificate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub nonce: String,
}

/// House signature over the `sync-proof` payload `{houseId, nonce}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProof {
    pub nonce: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub house_cert: HouseCertificate,
    pub entries: Vec<LedgerEntry>,
    pub proof: SyncProof,
}

/// Authority acknowledgment; a missing `lastSeq` confirms the whole batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seq: Option<u64>,
}

/// Remote authority the house reconciles with
#[async_trait]
pub trait Authority: Send + Sync {
    /// Fresh single-use nonce for a proof of key possession
    async fn request_challenge(&self, house_cert: &HouseCertificate) -> Result<String, SyncError>;

    async fn submit(&self, request: &SyncRequest) -> Result<SyncAck, SyncError>;
}
