//! Six-digit admission codes bound to a join challenge
//!
//! HOTP (RFC 4226 truncation) over HMAC-SHA256 of `"round|nonce|step"`, where
//! `step = floor(ms / step_ms)`. The verification window only absorbs clock
//! drift between devices; it does not extend a round.

use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rollet_core::Timestamp;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default time step
pub const DEFAULT_STEP_MS: i64 = 60_000;

/// Default drift tolerance in steps
pub const DEFAULT_WINDOW: u32 = 1;

/// Pairing secret length in bytes
pub const SECRET_LEN: usize = 32;

/// Fresh random pairing secret
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

fn step_of(at: Timestamp, step: Duration) -> i64 {
    let step_ms = step.num_milliseconds().max(1);
    at.timestamp_millis().div_euclid(step_ms)
}

fn code_for_step(secret: &[u8], round: &str, nonce: &str, step: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(format!("{}|{}|{}", round, nonce, step).as_bytes());
    let h = mac.finalize().into_bytes();

    let offset = usize::from(h[h.len() - 1] & 0x0f);
    let bin = (u32::from(h[offset] & 0x7f) << 24)
        | (u32::from(h[offset + 1]) << 16)
        | (u32::from(h[offset + 2]) << 8)
        | u32::from(h[offset + 3]);
    format!("{:06}", bin % 1_000_000)
}

/// Code for the step containing `at`
pub fn generate(secret: &[u8], round: &str, nonce: &str, at: Timestamp, step: Duration) -> String {
    code_for_step(secret, round, nonce, step_of(at, step))
}

/// Accept `candidate` if it matches any step within `window` of `at`
pub fn verify(
    candidate: &str,
    secret: &[u8],
    round: &str,
    nonce: &str,
    at: Timestamp,
    step: Duration,
    window: u32,
) -> bool {
    let center = step_of(at, step);
    let window = i64::from(window);
    (-window..=window).any(|w| code_for_step(secret, round, nonce, center + w) == candidate)
}
