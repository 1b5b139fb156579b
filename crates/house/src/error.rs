//! House errors

use rollet_core::{KeyError, TrustError};
use rollet_ledger::LedgerError;
use rollet_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HouseError {
    #[error("Trust error: {0}")]
    Trust(#[from] TrustError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("House key does not match the house certificate")]
    KeyMismatch,

    #[error("Unknown bet certificate: {0}")]
    UnknownBetCert(String),

    #[error("Unknown spend code: {0}")]
    UnknownSpendCode(String),

    #[error("Seat {seat} is not held by player {player}")]
    SeatNotAdmitted { seat: u32, player: String },

    #[error("Seat {seat} already taken in round {round}")]
    SeatTaken { round: String, seat: u32 },

    #[error("Round {0} is closed")]
    RoundClosed(String),

    #[error("Round {0} is already locked")]
    RoundAlreadyLocked(String),

    #[error("Round {0} is not locked")]
    RoundNotLocked(String),

    #[error("Round {0} is already settled")]
    RoundAlreadySettled(String),

    #[error("Bet certificate {0} was superseded by a renewal")]
    SupersededBetCert(String),

    #[error("Payout total overflows in round {0}")]
    PayoutOverflow(String),

    #[error("Corrupt ledger entry at seq {seq}: {reason}")]
    CorruptLedger { seq: u64, reason: String },
}

impl HouseError {
    /// The trust reason, if this is a trust rejection
    pub fn trust(&self) -> Option<&TrustError> {
        match self {
            HouseError::Trust(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, HouseError::Trust(TrustError::ReplayDetected(_)))
    }
}
