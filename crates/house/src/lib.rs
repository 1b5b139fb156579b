//! Rollet House - Trust orchestrator and CLI
//!
//! This crate wires certificates, the ledger and sync together on the house
//! device: single-use join nonces, round locking, settlement, redemption and
//! reconciliation. The `rollet` binary exposes it to operators.

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod records;

pub use config::HouseConfig;
pub use context::{HouseContext, HouseIdentity, HouseStatus};
pub use error::HouseError;
pub use records::{Admission, ExportBatch, IssuedReceipt, ReceiptSpent};
