//! Bank receipts
//!
//! A receipt is a signed, redeemable credit value issued to a winning seat.
//! The payload carries `spent: false` as a display default only. Whether a
//! receipt was redeemed is tracked by the house's spent-set and ledger; the
//! receipt is never re-signed.

use crate::payload::{Signable, Signed, SignedPayload};
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::Duration;
use rollet_core::time::check_window;
use rollet_core::{Amount, Keypair, PublicKey, Timestamp, TrustError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BankReceiptPayload {
    pub receipt_id: String,
    /// Player uid the value is owed to
    pub player: String,
    pub round: String,
    pub value: Amount,
    #[serde(with = "ts_milliseconds")]
    pub not_before: Timestamp,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_after: Option<Timestamp>,
    /// Bet certificate this receipt settles
    pub bet_cert_ref: String,
    pub spent: bool,
}

impl Signable for BankReceiptPayload {
    fn tagged(&self) -> SignedPayload<'_> {
        SignedPayload::BankReceipt(self)
    }
}

pub type BankReceipt = Signed<BankReceiptPayload>;

impl BankReceipt {
    pub fn receipt_id(&self) -> &str {
        &self.payload.receipt_id
    }

    pub fn value(&self) -> Amount {
        self.payload.value
    }
}

/// A seat owed a payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub player: String,
    pub value: Amount,
    pub bet_cert_ref: String,
}

/// Sign a receipt; `ttl = None` never expires
#[allow(clippy::too_many_arguments)]
pub fn issue(
    receipt_id: &str,
    player: &str,
    round: &str,
    value: Amount,
    bet_cert_ref: &str,
    house_key: &Keypair,
    now: Timestamp,
    ttl: Option<Duration>,
) -> BankReceipt {
    let receipt = Signed::sign(
        BankReceiptPayload {
            receipt_id: receipt_id.to_string(),
            player: player.to_string(),
            round: round.to_string(),
            value,
            not_before: now,
            not_after: ttl.map(|ttl| now + ttl),
            bet_cert_ref: bet_cert_ref.to_string(),
            spent: false,
        },
        house_key,
    );
    info!(receipt_id = %receipt_id, round = %round, value = %value, "bank receipt issued");
    receipt
}

/// One receipt per winner with a positive payout
pub fn issue_for_winners(
    winners: &[Winner],
    round: &str,
    house_key: &Keypair,
    now: Timestamp,
    ttl: Option<Duration>,
) -> Vec<BankReceipt> {
    winners
        .iter()
        .filter(|w| w.value.is_positive())
        .map(|w| {
            issue(
                &Uuid::new_v4().to_string(),
                &w.player,
                round,
                w.value,
                &w.bet_cert_ref,
                house_key,
                now,
                ttl,
            )
        })
        .collect()
}

pub fn check(
    receipt: &BankReceipt,
    house_public_key: &PublicKey,
    now: Timestamp,
) -> Result<(), TrustError> {
    check_window(now, receipt.payload.not_before, receipt.payload.not_after)?;
    receipt.verify_signature(house_public_key)
}

pub fn verify(receipt: &BankReceipt, house_public_key: &PublicKey, now: Timestamp) -> bool {
    match check(receipt, house_public_key, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(receipt_id = %receipt.payload.receipt_id, reason = %e, "bank receipt rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollet_core::time;

    fn receipt(house: &Keypair, now: Timestamp, ttl: Option<Duration>) -> BankReceipt {
        issue("rec1", "uid-1", "r7", Amount::credits(36), "cert-1", house, now, ttl)
    }

    #[test]
    fn test_issue_and_verify() {
        let house = Keypair::generate();
        let now = time::now();
        let r = receipt(&house, now, None);
        assert!(!r.payload.spent);
        assert!(verify(&r, &house.public_key(), now + Duration::days(400)));
    }

    #[test]
    fn test_expiring_receipt() {
        let house = Keypair::generate();
        let now = time::now();
        let r = receipt(&house, now, Some(Duration::hours(1)));
        assert!(verify(&r, &house.public_key(), now + Duration::minutes(59)));
        assert_eq!(
            check(&r, &house.public_key(), now + Duration::minutes(61)),
            Err(TrustError::Expired)
        );
    }

    #[test]
    fn test_flipping_spent_breaks_signature() {
        let house = Keypair::generate();
        let now = time::now();
        let mut r = receipt(&house, now, None);
        r.payload.spent = true;
        assert!(!verify(&r, &house.public_key(), now));
    }

    #[test]
    fn test_value_tamper_rejected() {
        let house = Keypair::generate();
        let now = time::now();
        let mut r = receipt(&house, now, None);
        r.payload.value = Amount::credits(3600);
        assert_eq!(check(&r, &house.public_key(), now), Err(TrustError::SignatureInvalid));
    }

    #[test]
    fn test_issue_for_winners_skips_zero() {
        let house = Keypair::generate();
        let winners = vec![
            Winner {
                player: "uid-1".to_string(),
                value: Amount::credits(5),
                bet_cert_ref: "c1".to_string(),
            },
            Winner {
                player: "uid-2".to_string(),
                value: Amount::ZERO,
                bet_cert_ref: "c2".to_string(),
            },
        ];
        let receipts = issue_for_winners(&winners, "r1", &house, time::now(), None);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].payload.player, "uid-1");
        assert!(Uuid::parse_str(receipts[0].receipt_id()).is_ok());
    }

    #[test]
    fn test_open_ended_receipt_omits_not_after() {
        let house = Keypair::generate();
        let r = receipt(&house, time::now(), None);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json["payload"].get("notAfter").is_none());
        let back: BankReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
