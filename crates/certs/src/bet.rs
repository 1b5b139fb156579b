//! Bet certificates
//!
//! When a round locks, the house hashes each seat's bet list and signs a
//! short-lived certificate over that hash. Topping up a seat mid-round
//! supersedes the certificate with a renewal pointing at the previous
//! `certId`; certificates are never edited.

use crate::payload::{canonical_json, Signable, Signed, SignedPayload};
use chrono::serde::ts_milliseconds;
use chrono::Duration;
use rollet_core::time::{check_window, window_from};
use rollet_core::{Amount, Keypair, PublicKey, Timestamp, TrustError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

/// Default bet certificate lifetime (5 minutes)
pub const BET_CERT_TTL_MS: i64 = 5 * 60 * 1000;

/// What a bet covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BetKind {
    Single { number: u8 },
    Split { numbers: [u8; 2] },
    Corner { numbers: [u8; 4] },
    Even,
    Odd,
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub kind: BetKind,
    pub amount: Amount,
    pub odds: u32,
}

/// One seat's locked bets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatBets {
    pub seat: u32,
    /// Player uid admitted to this seat
    pub player: String,
    pub bets: Vec<Bet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BetCertificatePayload {
    pub cert_id: String,
    pub player: String,
    pub seat: u32,
    pub round: String,
    pub bet_hash: String,
    #[serde(with = "ts_milliseconds")]
    pub not_before: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub not_after: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_of: Option<String>,
}

impl Signable for BetCertificatePayload {
    fn tagged(&self) -> SignedPayload<'_> {
        SignedPayload::BetCert(self)
    }
}

pub type BetCertificate = Signed<BetCertificatePayload>;

impl BetCertificate {
    pub fn cert_id(&self) -> &str {
        &self.payload.cert_id
    }

    /// True if `bets` hash to the certified value
    pub fn covers(&self, bets: &[Bet]) -> bool {
        bet_hash(bets) == self.payload.bet_hash
    }
}

/// hex(SHA-256(canonical JSON of the bet list))
pub fn bet_hash(bets: &[Bet]) -> String {
    hex::encode(Sha256::digest(canonical_json(bets)))
}

fn issue(
    seat: &SeatBets,
    round_id: &str,
    house_key: &Keypair,
    now: Timestamp,
    ttl: Duration,
    renewal_of: Option<String>,
) -> BetCertificate {
    let (not_before, not_after) = window_from(now, ttl);
    let cert = Signed::sign(
        BetCertificatePayload {
            cert_id: Uuid::new_v4().to_string(),
            player: seat.player.clone(),
            seat: seat.seat,
            round: round_id.to_string(),
            bet_hash: bet_hash(&seat.bets),
            not_before,
            not_after,
            bank_ref: seat.bank_ref.clone(),
            renewal_of,
        },
        house_key,
    );
    info!(
        cert_id = %cert.payload.cert_id,
        round = %round_id,
        seat = seat.seat,
        renewal = cert.payload.renewal_of.is_some(),
        "bet certificate issued"
    );
    cert
}

/// Issue one certificate per seat, all valid for `[now, now + ttl]`
pub fn lock_round(
    seats: &[SeatBets],
    house_key: &Keypair,
    round_id: &str,
    now: Timestamp,
    ttl: Duration,
) -> Vec<BetCertificate> {
    seats
        .iter()
        .map(|seat| issue(seat, round_id, house_key, now, ttl, None))
        .collect()
}

/// Supersede `previous` after the seat's bets changed
pub fn renew(
    previous: &BetCertificate,
    seat: &SeatBets,
    house_key: &Keypair,
    now: Timestamp,
    ttl: Duration,
) -> BetCertificate {
    issue(
        seat,
        &previous.payload.round,
        house_key,
        now,
        ttl,
        Some(previous.payload.cert_id.clone()),
    )
}

pub fn check(
    cert: &BetCertificate,
    house_public_key: &PublicKey,
    now: Timestamp,
) -> Result<(), TrustError> {
    check_window(now, cert.payload.not_before, Some(cert.payload.not_after))?;
    cert.verify_signature(house_public_key)
}

pub fn verify(cert: &BetCertificate, house_public_key: &PublicKey, now: Timestamp) -> bool {
    match check(cert, house_public_key, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(cert_id = %cert.payload.cert_id, reason = %e, "bet certificate rejected");
            false
        }
    }
}

/// The authoritative certificate of a renewal chain at `now`.
///
/// Only verified certificates count. The answer is the newest one that no
/// other verified certificate renews.
pub fn authoritative<'a>(
    chain: &'a [BetCertificate],
    house_public_key: &PublicKey,
    now: Timestamp,
) -> Option<&'a BetCertificate> {
    let live: Vec<&BetCertificate> = chain
        .iter()
        .filter(|c| verify(c, house_public_key, now))
        .collect();

    live.iter()
        .filter(|c| {
            !live
                .iter()
                .any(|other| other.payload.renewal_of.as_deref() == Some(c.cert_id()))
        })
        .max_by_key(|c| c.payload.not_before)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollet_core::time;

    fn bets(amount: u64) -> Vec<Bet> {
        vec![
            Bet {
                id: "b1".to_string(),
                kind: BetKind::Single { number: 7 },
                amount: Amount::credits(amount),
                odds: 18,
            },
            Bet {
                id: "b2".to_string(),
                kind: BetKind::Corner {
                    numbers: [1, 2, 6, 7],
                },
                amount: Amount::credits(2),
                odds: 3,
            },
        ]
    }

    fn seat(n: u32, amount: u64) -> SeatBets {
        SeatBets {
            seat: n,
            player: format!("uid-{}", n),
            bets: bets(amount),
            bank_ref: None,
        }
    }

    fn ttl() -> Duration {
        Duration::milliseconds(BET_CERT_TTL_MS)
    }

    #[test]
    fn test_bet_cert_ttl_scenario() {
        let house = Keypair::generate();
        let t0 = time::now();
        let certs = lock_round(&[seat(1, 5)], &house, "r7", t0, ttl());
        let cert = &certs[0];

        assert_eq!(cert.payload.round, "r7");
        assert_eq!(cert.payload.seat, 1);
        assert!(verify(cert, &house.public_key(), t0 + Duration::minutes(4)));
        assert!(!verify(cert, &house.public_key(), t0 + Duration::minutes(6)));
    }

    #[test]
    fn test_lock_round_one_cert_per_seat() {
        let house = Keypair::generate();
        let now = time::now();
        let certs = lock_round(&[seat(1, 5), seat(2, 9)], &house, "r1", now, ttl());
        assert_eq!(certs.len(), 2);
        assert_ne!(certs[0].cert_id(), certs[1].cert_id());
        assert_ne!(certs[0].payload.bet_hash, certs[1].payload.bet_hash);
        assert!(certs[0].covers(&bets(5)));
        assert!(!certs[0].covers(&bets(6)));
    }

    #[test]
    fn test_bet_hash_depends_on_kind() {
        let mut changed = bets(5);
        changed[0].kind = BetKind::Single { number: 8 };
        assert_ne!(bet_hash(&bets(5)), bet_hash(&changed));
        assert_eq!(bet_hash(&bets(5)).len(), 64);
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let house = Keypair::generate();
        let now = time::now();
        let mut cert = lock_round(&[seat(1, 5)], &house, "r1", now, ttl()).remove(0);
        cert.payload.bet_hash = bet_hash(&bets(500));
        assert_eq!(check(&cert, &house.public_key(), now), Err(TrustError::SignatureInvalid));
    }

    #[test]
    fn test_renewal_chain_tip_is_authoritative() {
        let house = Keypair::generate();
        let t0 = time::now();
        let first = lock_round(&[seat(1, 5)], &house, "r1", t0, ttl()).remove(0);
        let second = renew(&first, &seat(1, 8), &house, t0 + Duration::seconds(30), ttl());
        assert_eq!(second.payload.renewal_of.as_deref(), Some(first.cert_id()));
        assert_eq!(second.payload.round, "r1");

        let chain = vec![first.clone(), second.clone()];
        let now = t0 + Duration::minutes(1);
        assert_eq!(authoritative(&chain, &house.public_key(), now), Some(&second));

        // Once the renewal expires the original (also expired) cannot come back
        let late = t0 + Duration::minutes(10);
        assert_eq!(authoritative(&chain, &house.public_key(), late), None);
    }

    #[test]
    fn test_forged_renewal_does_not_supersede() {
        let house = Keypair::generate();
        let forger = Keypair::generate();
        let t0 = time::now();
        let first = lock_round(&[seat(1, 5)], &house, "r1", t0, ttl()).remove(0);
        let forged = renew(&first, &seat(1, 500), &forger, t0, ttl());

        let chain = vec![first.clone(), forged];
        assert_eq!(authoritative(&chain, &house.public_key(), t0), Some(&first));
    }

    #[test]
    fn test_bet_kind_wire_format() {
        let json = serde_json::to_value(BetKind::Split { numbers: [3, 4] }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "split", "numbers": [3, 4]}));
        let json = serde_json::to_value(BetKind::Even).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "even"}));
    }
}
