//! House signatures on ledger entries
//!
//! When the ledger has a signer, each entry's `entryId` is signed with the
//! house key at append time. Because the id commits to the whole chain prefix,
//! one signature vouches for everything before it as well.

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use rollet_core::{Keypair, PublicKey};

/// Hex Ed25519 signature over the entry id
pub fn sign_entry_id(signer: &Keypair, entry_id: &str) -> String {
    signer.sign(entry_id.as_bytes())
}

impl LedgerEntry {
    /// Verify the house signature on this entry
    pub fn verify_signature(&self, house_public_key: &PublicKey) -> Result<(), LedgerError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(LedgerError::MissingSignature { seq: self.seq })?;
        house_public_key
            .verify(self.entry_id.as_bytes(), signature)
            .map_err(|_| LedgerError::InvalidSignature { seq: self.seq })
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Count signed and unsigned entries, failing on the first bad signature
pub fn verify_signatures(
    entries: &[LedgerEntry],
    house_public_key: &PublicKey,
) -> Result<(usize, usize), LedgerError> {
    let mut signed = 0;
    let mut unsigned = 0;
    for entry in entries {
        if entry.is_signed() {
            entry.verify_signature(house_public_key)?;
            signed += 1;
        } else {
            unsigned += 1;
        }
    }
    Ok((signed, unsigned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EventType;
    use rollet_core::time;

    fn entry(signature: Option<String>) -> LedgerEntry {
        LedgerEntry {
            seq: 1,
            prev_hash: None,
            entry_id: "e1".to_string(),
            timestamp: time::now(),
            event_type: EventType::SessionClosed,
            payload: serde_json::json!({"roundId": "r1"}),
            signature,
            merkle_root: None,
        }
    }

    #[test]
    fn test_signed_entry_verifies() {
        let house = Keypair::generate();
        let e = entry(Some(sign_entry_id(&house, "e1")));
        assert!(e.verify_signature(&house.public_key()).is_ok());
        assert_eq!(verify_signatures(&[e, entry(None)], &house.public_key()).unwrap(), (1, 1));
    }

    #[test]
    fn test_wrong_key_fails() {
        let house = Keypair::generate();
        let e = entry(Some(sign_entry_id(&house, "e1")));
        let other = Keypair::generate();
        assert!(matches!(
            e.verify_signature(&other.public_key()),
            Err(LedgerError::InvalidSignature { seq: 1 })
        ));
    }

    #[test]
    fn test_tampered_id_fails() {
        let house = Keypair::generate();
        let mut e = entry(Some(sign_entry_id(&house, "e1")));
        e.entry_id = "e2".to_string();
        assert!(e.verify_signature(&house.public_key()).is_err());
        assert!(matches!(
            entry(None).verify_signature(&house.public_key()),
            Err(LedgerError::MissingSignature { seq: 1 })
        ));
    }
}
