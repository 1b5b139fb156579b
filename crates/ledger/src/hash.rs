//! Hash chain utilities for ledger integrity

use crate::entry::{EventType, LedgerEntry};
use rollet_core::Timestamp;
use sha2::{Digest, Sha256};

/// hex(SHA-256(`prevHash|type|JSON(payload)|timestamp_ms`)), empty prevHash for the first entry
pub fn compute_entry_id(
    prev_hash: Option<&str>,
    event_type: EventType,
    payload: &serde_json::Value,
    timestamp: Timestamp,
) -> String {
    let material = format!(
        "{}|{}|{}|{}",
        prev_hash.unwrap_or(""),
        event_type,
        payload,
        timestamp.timestamp_millis()
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}

fn entry_id_of(entry: &LedgerEntry) -> String {
    compute_entry_id(
        entry.prev_hash.as_deref(),
        entry.event_type,
        &entry.payload,
        entry.timestamp,
    )
}

/// Verify hash chain integrity from the first entry
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<(), ChainError> {
    let mut prev_hash: Option<&str> = None;

    for (i, entry) in entries.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        if entry.seq != expected_seq {
            return Err(ChainError::InvalidSequence {
                expected: expected_seq,
                actual: entry.seq,
            });
        }

        if entry.prev_hash.as_deref() != prev_hash {
            return Err(ChainError::BrokenLink {
                seq: entry.seq,
                expected: prev_hash.unwrap_or("null").to_string(),
                actual: entry.prev_hash.clone().unwrap_or_else(|| "null".to_string()),
            });
        }

        let calculated = entry_id_of(entry);
        if entry.entry_id != calculated {
            return Err(ChainError::InvalidHash {
                seq: entry.seq,
                expected: calculated,
                actual: entry.entry_id.clone(),
            });
        }

        prev_hash = Some(&entry.entry_id);
    }

    Ok(())
}

/// Relink `entries` from scratch: every `prev_hash` and `entry_id` is derived
/// again from the stored content.
///
/// After any edit, the ids at and after the edited entry differ from the
/// originals, which is how downstream invalidation shows up.
pub fn recompute_ids(entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let mut prev_hash: Option<String> = None;
    entries
        .iter()
        .map(|entry| {
            let mut relinked = entry.clone();
            relinked.prev_hash = prev_hash.clone();
            relinked.entry_id = entry_id_of(&relinked);
            prev_hash = Some(relinked.entry_id.clone());
            relinked
        })
        .collect()
}

/// Binary Merkle root over entry ids, last node paired with itself on odd
/// layers. `None` for an empty batch.
pub fn merkle_root(entries: &[LedgerEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let mut layer: Vec<[u8; 32]> = entries
        .iter()
        .map(|e| Sha256::digest(e.entry_id.as_bytes()).into())
        .collect();

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                hasher.finalize().into()
            })
            .collect();
    }

    Some(hex::encode(layer[0]))
}

/// Errors in hash chain verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    BrokenLink {
        seq: u64,
        expected: String,
        actual: String,
    },
    InvalidHash {
        seq: u64,
        expected: String,
        actual: String,
    },
    InvalidSequence {
        expected: u64,
        actual: u64,
    },
}

impl ChainError {
    /// Sequence number of the first bad entry
    pub fn seq(&self) -> u64 {
        match self {
            ChainError::BrokenLink { seq, .. } | ChainError::InvalidHash { seq, .. } => *seq,
            ChainError::InvalidSequence { actual, .. } => *actual,
        }
    }
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::BrokenLink {
                seq,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Broken link at seq {}: expected prevHash '{}', got '{}'",
                    seq, expected, actual
                )
            }
            ChainError::InvalidHash {
                seq,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Invalid entryId at seq {}: expected '{}', got '{}'",
                    seq, expected, actual
                )
            }
            ChainError::InvalidSequence { expected, actual } => {
                write!(f, "Invalid sequence: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for ChainError {}
