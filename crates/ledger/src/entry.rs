//! Ledger entries and event types

use chrono::serde::ts_milliseconds;
use rollet_core::Timestamp;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// What the house did
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RoundLocked,
    BetCertIssued,
    RoundSettled,
    ReceiptIssued,
    JoinChallengeIssued,
    /// A join response was accepted and its nonce consumed
    Admission,
    /// A receipt was redeemed; replaying these rebuilds the spent-set
    ReceiptSpent,
    SessionClosed,
    SyncExport,
}

/// One immutable ledger record.
///
/// `entry_id = hex(SHA-256(prevHash or "" | type | JSON(payload) | timestamp_ms))`.
/// The first entry has `prev_hash = None`, serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub seq: u64,
    pub prev_hash: Option<String>,
    pub entry_id: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    /// House signature over `entry_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
}

impl LedgerEntry {
    /// Deserialize the payload into `T`
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
