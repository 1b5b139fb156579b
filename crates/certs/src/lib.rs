//! Rollet Certificates - Signed artifacts exchanged between house and players
//!
//! Every artifact is a typed payload plus a signature over its canonical JSON
//! form (see [`payload`]). Issuers live next to their verifiers:
//!
//! - [`house`]: root-signed house certificates, PEM import
//! - [`authorization`]: the allow-list gate on top of certificate validity
//! - [`join`]: challenge/response admission handshake
//! - [`bet`]: per-seat bet certificates and renewal chains
//! - [`receipt`]: redeemable bank receipts
//! - [`totp`] / [`spend_code`]: short codes for camera-less fallbacks

pub mod authorization;
pub mod bet;
pub mod house;
pub mod join;
pub mod payload;
pub mod receipt;
pub mod spend_code;
pub mod totp;
pub mod transport;

pub use authorization::{AllowList, AuthorizationEntry};
pub use bet::{Bet, BetCertificate, BetCertificatePayload, BetKind, SeatBets};
pub use house::{HouseCertificate, HouseCertificatePayload};
pub use join::{JoinChallenge, JoinResponse, JoinResponsePayload};
pub use payload::{Signable, Signed, SignedPayload};
pub use receipt::{BankReceipt, BankReceiptPayload, Winner};
pub use transport::{Artifact, PairingPayload};
