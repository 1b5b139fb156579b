//! Ledger errors

use crate::hash::ChainError;
use thiserror::Error;

/// Errors that can occur in ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hash chain broken: {0}")]
    Chain(#[from] ChainError),

    #[error("Invalid watermark file: {0}")]
    InvalidWatermark(String),

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("Missing house signature at seq {seq}")]
    MissingSignature { seq: u64 },

    #[error("Invalid house signature at seq {seq}")]
    InvalidSignature { seq: u64 },
}
