//! Rollet Sync - Ledger reconciliation with the remote authority
//!
//! The house pushes unsynced ledger entries to an authority after proving
//! possession of its signing key against a fresh authority nonce. Only a
//! confirmed batch moves the watermark; any failure leaves it where it was.

pub mod authority;
pub mod error;
pub mod http;
pub mod retry;
pub mod syncer;

pub use authority::{
    Authority, ChallengeRequest, ChallengeResponse, SyncAck, SyncProof, SyncRequest,
};
pub use error::SyncError;
pub use http::HttpAuthority;
pub use retry::RetryPolicy;
pub use syncer::{SyncReport, Syncer};
