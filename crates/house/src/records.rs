//! Ledger payloads written by the house
//!
//! Each struct is the JSON payload of one [`EventType`](rollet_ledger::EventType).
//! Replaying them on startup rebuilds nonce, seat and spent-set state.

use chrono::serde::ts_milliseconds;
use rollet_certs::BankReceipt;
use rollet_core::{Amount, Timestamp};
use rollet_ledger::LedgerEntry;
use serde::{Deserialize, Serialize};

/// `join_challenge_issued`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssued {
    pub round: String,
    pub nonce: String,
    #[serde(with = "ts_milliseconds")]
    pub not_before: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub not_after: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMethod {
    /// Signed join response
    Response,
    /// TOTP code from a paired device
    Code,
}

/// `admission`: a seat granted and a nonce consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub round: String,
    pub seat: u32,
    pub player_uid: String,
    pub nonce: String,
    pub method: AdmissionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_ref: Option<String>,
}

/// `round_locked`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundLocked {
    pub round: String,
    pub seats: Vec<u32>,
    pub cert_ids: Vec<String>,
}

/// `receipt_issued`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedReceipt {
    pub spend_code: String,
    pub receipt: BankReceipt,
}

/// `round_settled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSettled {
    pub round: String,
    pub receipt_ids: Vec<String>,
    pub total: Amount,
}

/// `receipt_spent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSpent {
    pub receipt_id: String,
    pub player: String,
    pub round: String,
    pub value: Amount,
}

/// `session_closed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClosed {
    pub round: String,
    pub admitted: usize,
}

/// `sync_export`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncExport {
    pub from_seq: u64,
    pub to_seq: u64,
    pub count: usize,
}

/// Unsynced entries handed to an operator for offline transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBatch {
    pub house_id: String,
    pub entries: Vec<LedgerEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
}
