//! Sync errors

use rollet_core::TrustError;
use rollet_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authority request timed out")]
    Timeout,

    #[error("Authority rejected request: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed authority response: {0}")]
    Malformed(String),

    #[error("Invalid authority URL: {0}")]
    InvalidUrl(String),

    #[error("House key does not match the house certificate")]
    KeyMismatch,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl SyncError {
    /// Transport failures and server-side statuses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout => true,
            SyncError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

impl From<SyncError> for TrustError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Malformed(msg) => TrustError::MalformedPayload(msg),
            other => TrustError::Network(other.to_string()),
        }
    }
}
