//! Join handshake
//!
//! The house shows a short-lived challenge embedding its certificate; the
//! player answers with a response signed by the player's own key. The
//! response binds the player to one house, one round and one nonce.
//!
//! `verify_response` checks consistency and authenticity only. Consuming the
//! nonce so a response cannot be replayed is the admitting house's job.

use crate::house::{self, HouseCertificate};
use crate::payload::{Signable, SignedPayload};
use chrono::serde::ts_milliseconds;
use chrono::Duration;
use rand::RngCore;
use rollet_core::encoding::base64url_encode;
use rollet_core::time::{check_window, window_from};
use rollet_core::{Keypair, PublicKey, Timestamp, TrustError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default challenge lifetime
pub const CHALLENGE_TTL_MS: i64 = 15_000;

/// Nonce size in bytes (128 bits)
const NONCE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinChallenge {
    pub house_cert: HouseCertificate,
    pub round: String,
    /// base64url, 128 random bits
    pub nonce: String,
    #[serde(with = "ts_milliseconds")]
    pub not_before: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub not_after: Timestamp,
}

impl JoinChallenge {
    pub fn house_id(&self) -> &str {
        self.house_cert.house_id()
    }
}

/// Signed part of a join response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinResponsePayload {
    pub player_uid: String,
    pub player_public_key: PublicKey,
    pub round: String,
    pub seat: u32,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_ref: Option<String>,
}

impl Signable for JoinResponsePayload {
    fn tagged(&self) -> SignedPayload<'_> {
        SignedPayload::JoinResponse(self)
    }
}

/// A player's answer to a challenge.
///
/// `alias` is display text attached outside the signed payload; anyone
/// relaying the response can change it. Seats and payouts are attributed by
/// `player_uid` and `seat`, never by alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinResponse {
    pub payload: JoinResponsePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub signature: String,
}

impl JoinResponse {
    pub fn player_uid(&self) -> &str {
        &self.payload.player_uid
    }

    pub fn seat(&self) -> u32 {
        self.payload.seat
    }
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64url_encode(&bytes)
}

/// New challenge valid for `[now, now + ttl]`
pub fn create_challenge(
    house_cert: &HouseCertificate,
    round: &str,
    ttl: Duration,
    now: Timestamp,
) -> JoinChallenge {
    let (not_before, not_after) = window_from(now, ttl);
    JoinChallenge {
        house_cert: house_cert.clone(),
        round: round.to_string(),
        nonce: fresh_nonce(),
        not_before,
        not_after,
    }
}

/// Challenge window first, then the embedded house certificate
pub fn check_challenge(
    challenge: &JoinChallenge,
    root_public_key: &PublicKey,
    now: Timestamp,
) -> Result<(), TrustError> {
    check_window(now, challenge.not_before, Some(challenge.not_after))?;
    house::check(&challenge.house_cert, root_public_key, now)
}

pub fn validate_challenge(
    challenge: &JoinChallenge,
    root_public_key: &PublicKey,
    now: Timestamp,
) -> bool {
    match check_challenge(challenge, root_public_key, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(round = %challenge.round, reason = %e, "join challenge rejected");
            false
        }
    }
}

/// Player identity scoped to one house: hex(SHA-256(key bytes || house id)).
///
/// The same keypair yields unrelated identities at different houses.
pub fn derive_uid(player_public_key: &PublicKey, house_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(player_public_key.as_bytes());
    hasher.update(house_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build and sign the player's response to `challenge`
pub fn create_response(
    alias: Option<&str>,
    challenge: &JoinChallenge,
    player_key: &Keypair,
    seat: u32,
    bank_ref: Option<String>,
) -> JoinResponse {
    let player_public_key = player_key.public_key();
    let payload = JoinResponsePayload {
        player_uid: derive_uid(&player_public_key, challenge.house_id()),
        player_public_key,
        round: challenge.round.clone(),
        seat,
        nonce: challenge.nonce.clone(),
        bank_ref,
    };
    let signature = payload.sign_with(player_key);
    JoinResponse {
        payload,
        alias: alias.map(str::to_string),
        signature,
    }
}

pub fn check_response(response: &JoinResponse, challenge: &JoinChallenge) -> Result<(), TrustError> {
    let payload = &response.payload;
    if payload.round != challenge.round {
        return Err(TrustError::ChallengeMismatch("round"));
    }
    if payload.nonce != challenge.nonce {
        return Err(TrustError::ChallengeMismatch("nonce"));
    }
    if derive_uid(&payload.player_public_key, challenge.house_id()) != payload.player_uid {
        return Err(TrustError::ChallengeMismatch("player uid"));
    }
    payload.verify_with(&payload.player_public_key, &response.signature)
}

pub fn verify_response(response: &JoinResponse, challenge: &JoinChallenge) -> bool {
    match check_response(response, challenge) {
        Ok(()) => true,
        Err(e) => {
            debug!(round = %challenge.round, seat = response.payload.seat, reason = %e, "join response rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::house::HouseCertificatePayload;
    use rollet_core::time;

    struct Fixture {
        root: Keypair,
        cert: HouseCertificate,
        now: Timestamp,
    }

    fn fixture(house_id: &str) -> Fixture {
        let root = Keypair::generate();
        let now = time::now();
        let cert = house::issue(
            HouseCertificatePayload {
                house_id: house_id.to_string(),
                public_key: Keypair::generate().public_key(),
                not_before: now,
                not_after: now + Duration::hours(8),
                capabilities: vec![],
            },
            &root,
        );
        Fixture { root, cert, now }
    }

    fn ttl() -> Duration {
        Duration::milliseconds(CHALLENGE_TTL_MS)
    }

    #[test]
    fn test_challenge_nonce_is_fresh_128_bits() {
        let f = fixture("h1");
        let a = create_challenge(&f.cert, "r1", ttl(), f.now);
        let b = create_challenge(&f.cert, "r1", ttl(), f.now);
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(
            rollet_core::encoding::base64url_decode(&a.nonce).unwrap().len(),
            16
        );
        assert_eq!(a.not_after - a.not_before, ttl());
    }

    #[test]
    fn test_validate_challenge_window() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        assert!(validate_challenge(&c, &f.root.public_key(), f.now));
        assert_eq!(
            check_challenge(&c, &f.root.public_key(), f.now + Duration::seconds(16)),
            Err(TrustError::Expired)
        );
    }

    #[test]
    fn test_validate_challenge_checks_embedded_cert() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let other_root = Keypair::generate();
        assert!(!validate_challenge(&c, &other_root.public_key(), f.now));
    }

    #[test]
    fn test_response_roundtrip() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let player = Keypair::generate();
        let r = create_response(Some("Ana"), &c, &player, 3, Some("bank-1".to_string()));

        assert!(verify_response(&r, &c));
        assert_eq!(r.player_uid(), derive_uid(&player.public_key(), "h1"));
        assert_eq!(r.seat(), 3);
    }

    #[test]
    fn test_response_rejects_other_challenge() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let player = Keypair::generate();
        let r = create_response(None, &c, &player, 1, None);

        let mut other_nonce = c.clone();
        other_nonce.nonce = create_challenge(&f.cert, "r1", ttl(), f.now).nonce;
        assert_eq!(
            check_response(&r, &other_nonce),
            Err(TrustError::ChallengeMismatch("nonce"))
        );

        let next_round = create_challenge(&f.cert, "r2", ttl(), f.now);
        assert_eq!(
            check_response(&r, &next_round),
            Err(TrustError::ChallengeMismatch("round"))
        );
    }

    #[test]
    fn test_response_bound_to_house() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let player = Keypair::generate();
        let r = create_response(None, &c, &player, 1, None);

        // Same round and nonce shown by a different house
        let g = fixture("h2");
        let mut foreign = create_challenge(&g.cert, "r1", ttl(), g.now);
        foreign.nonce = c.nonce.clone();
        assert_eq!(
            check_response(&r, &foreign),
            Err(TrustError::ChallengeMismatch("player uid"))
        );
    }

    #[test]
    fn test_uid_differs_per_house() {
        let player = Keypair::generate();
        assert_ne!(
            derive_uid(&player.public_key(), "h1"),
            derive_uid(&player.public_key(), "h2")
        );
    }

    #[test]
    fn test_tampered_seat_rejected() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let player = Keypair::generate();
        let mut r = create_response(None, &c, &player, 1, None);
        r.payload.seat = 2;
        assert_eq!(check_response(&r, &c), Err(TrustError::SignatureInvalid));
    }

    #[test]
    fn test_alias_is_not_signed() {
        let f = fixture("h1");
        let c = create_challenge(&f.cert, "r1", ttl(), f.now);
        let player = Keypair::generate();
        let mut r = create_response(Some("Ana"), &c, &player, 1, None);
        r.alias = Some("Mallory".to_string());
        assert!(verify_response(&r, &c));
    }
}
