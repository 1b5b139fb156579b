//! Key handles for the root authority, house and player roles
//!
//! Every role signs with Ed25519. Public keys and signatures travel as hex
//! strings inside the JSON artifacts.

use crate::error::{KeyError, TrustError};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a derived key id in hex characters
const KEY_ID_LEN: usize = 32;

/// Ed25519 verifying key, serialized as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a hex-encoded 32-byte public key
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        let actual = bytes.len();
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, actual })?;
        let key =
            VerifyingKey::from_bytes(&array).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Short stable identifier: first 32 hex chars of SHA-256(key bytes)
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(KEY_ID_LEN);
        id
    }

    /// Verify a hex-encoded signature over `message`.
    ///
    /// A signature that is not valid hex or not 64 bytes is a signature
    /// failure, not a parse failure.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> Result<(), TrustError> {
        let bytes = hex::decode(signature_hex).map_err(|_| TrustError::SignatureInvalid)?;
        let array: [u8; 64] = bytes.try_into().map_err(|_| TrustError::SignatureInvalid)?;
        let signature = Signature::from_bytes(&array);
        self.0
            .verify(message, &signature)
            .map_err(|_| TrustError::SignatureInvalid)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Ed25519 signing keypair
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Create from a 32-byte seed (hex-encoded)
    pub fn from_hex(hex_seed: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_seed.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        let actual = bytes.len();
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength { expected: 32, actual })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Generate a new random signing key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Export the seed as hex (for storage)
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Sign `message`, returning the hex-encoded signature
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let sig = keypair.sign(b"hello");
        assert!(keypair.public_key().verify(b"hello", &sig).is_ok());
        assert_eq!(
            keypair.public_key().verify(b"hellO", &sig),
            Err(TrustError::SignatureInvalid)
        );
    }

    #[test]
    fn test_seed_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_hex(&keypair.seed_hex()).unwrap();
        assert_eq!(keypair.public_key(), restored.public_key());
    }

    #[test]
    fn test_garbage_signature_is_signature_failure() {
        let keypair = Keypair::generate();
        assert_eq!(
            keypair.public_key().verify(b"x", "zz"),
            Err(TrustError::SignatureInvalid)
        );
        assert_eq!(
            keypair.public_key().verify(b"x", "abcd"),
            Err(TrustError::SignatureInvalid)
        );
    }

    #[test]
    fn test_public_key_serde_is_hex() {
        let keypair = Keypair::generate();
        let json = serde_json::to_string(&keypair.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", keypair.public_key().to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keypair.public_key());
    }

    #[test]
    fn test_key_id_length() {
        let keypair = Keypair::generate();
        assert_eq!(keypair.public_key().key_id().len(), 32);
    }

    #[test]
    fn test_bad_seed_length() {
        assert_eq!(
            Keypair::from_hex("abcd").unwrap_err(),
            KeyError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }
}
