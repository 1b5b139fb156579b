//! Allow-list of authorized house certificates
//!
//! A certificate with a valid root signature is still untrusted until an
//! exact `(houseId, keyId, signature)` entry for it exists here.

use crate::house::HouseCertificate;
use rollet_core::TrustError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationEntry {
    pub house_id: String,
    pub key_id: String,
    pub signature: String,
}

impl AuthorizationEntry {
    /// The entry that would authorize `cert`
    pub fn for_cert(cert: &HouseCertificate) -> Self {
        Self {
            house_id: cert.payload.house_id.clone(),
            key_id: cert.key_id(),
            signature: cert.signature.clone(),
        }
    }

    pub fn matches(&self, cert: &HouseCertificate) -> bool {
        self.house_id == cert.payload.house_id
            && self.key_id == cert.key_id()
            && self.signature == cert.signature
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    entries: Vec<AuthorizationEntry>,
}

impl AllowList {
    pub fn new(entries: Vec<AuthorizationEntry>) -> Self {
        Self { entries }
    }

    /// Load a JSON array of entries
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TrustError::MalformedPayload(format!(
                "cannot read allow-list {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn authorize(&mut self, cert: &HouseCertificate) {
        let entry = AuthorizationEntry::for_cert(cert);
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn is_authorized(&self, cert: &HouseCertificate) -> bool {
        self.entries.iter().any(|entry| entry.matches(cert))
    }

    pub fn entries(&self) -> &[AuthorizationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pure lookup of `cert` in `allow_list`
pub fn is_authorized(cert: &HouseCertificate, allow_list: &AllowList) -> bool {
    allow_list.is_authorized(cert)
}
