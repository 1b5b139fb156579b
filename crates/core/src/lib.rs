//! Rollet Core - Domain types
//!
//! This crate contains the fundamental types shared by every Rollet crate:
//! - `Keypair` / `PublicKey`: Ed25519 key handles for root, house and player roles
//! - `Amount`: Non-negative decimal wrapper for credit amounts
//! - `time`: Millisecond timestamps and validity-window checks
//! - `TrustError`: The rejection taxonomy for signed artifacts

pub mod amount;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod time;

pub use amount::Amount;
pub use error::{KeyError, TrustError};
pub use keys::{Keypair, PublicKey};
pub use time::Timestamp;
