//! Rollet Ledger - Append-only hash-chained house log
//!
//! Every issuing action on the house device is recorded here. Each entry
//! commits to its predecessor's `entryId`, so editing any entry invalidates
//! every id after it.
//!
//! # Key Types
//! - `LedgerEntry`: One record (`seq`, `prevHash`, `entryId`, type, payload)
//! - `EventType`: What the house did
//! - `Ledger`: Single-writer append path plus the sync watermark
//! - `LedgerStore`: Persistence seam (`MemoryStore`, `JsonlStore`)

pub mod entry;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod signature;
pub mod store;

pub use entry::{EventType, LedgerEntry};
pub use error::LedgerError;
pub use hash::{compute_entry_id, merkle_root, recompute_ids, verify_chain, ChainError};
pub use ledger::{AppendOptions, Ledger};
pub use store::{JsonlStore, LedgerStore, MemoryStore};
