//! Ten-digit spend codes for manual receipt redemption
//!
//! A spend code is a deterministic encoding of an already signed receipt: nine
//! digits folded from a SHA-256 digest plus a Luhn check digit that catches
//! typos. It is a lookup key, not a credential. The house resolves the code
//! against receipts it knows and still verifies the receipt's signature.

use crate::receipt::BankReceipt;
use sha2::{Digest, Sha256};

/// Total code length (nine body digits plus check digit)
pub const CODE_LEN: usize = 10;

const BODY_MODULUS: u32 = 1_000_000_000;

/// Compute the spend code of `receipt` as issued by `house_id`
pub fn compute(receipt: &BankReceipt, house_id: &str) -> String {
    let material = format!(
        "{}|{}|{}|{}",
        receipt.payload.receipt_id, house_id, receipt.payload.player, receipt.payload.value
    );
    let digest = Sha256::digest(material.as_bytes());

    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let extra = u32::from(digest[4] ^ digest[5]);
    let mixed = head ^ (extra << 7);
    let body = format!("{:09}", mixed % BODY_MODULUS);

    let digits: Vec<u8> = body.bytes().map(|b| b - b'0').collect();
    format!("{}{}", body, luhn_check_digit(&digits))
}

/// Luhn mod-10 check digit for `digits` (most significant first)
pub fn luhn_check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    ((10 - (sum % 10)) % 10) as u8
}

/// Strip the separators people type between digit groups
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Ten digits whose last digit is the Luhn check of the first nine
pub fn luhn_valid(code: &str) -> bool {
    if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = code.bytes().map(|b| b - b'0').collect();
    luhn_check_digit(&digits[..CODE_LEN - 1]) == digits[CODE_LEN - 1]
}
