//! Ledger sync driver

use crate::authority::{Authority, SyncAck, SyncProof, SyncRequest};
use crate::error::SyncError;
use crate::retry::RetryPolicy;
use rollet_certs::house::SyncProofPayload;
use rollet_certs::{HouseCertificate, Signable};
use rollet_core::Keypair;
use rollet_ledger::{Ledger, LedgerEntry, LedgerStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one sync call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries newly covered by the watermark
    pub synced: usize,
    /// Watermark after the call
    pub watermark: u64,
    /// No authority configured; entries were marked synced locally
    pub offline: bool,
}

pub struct Syncer {
    authority: Option<Arc<dyn Authority>>,
    policy: RetryPolicy,
}

impl Syncer {
    pub fn new(authority: Arc<dyn Authority>, policy: RetryPolicy) -> Self {
        Self {
            authority: Some(authority),
            policy,
        }
    }

    /// Development mode: no authority, every sync succeeds locally
    pub fn offline() -> Self {
        Self {
            authority: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.authority.is_none()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Push unsynced entries and advance the watermark to
    /// `min(confirmed, last sent)`.
    ///
    /// Any error leaves the watermark untouched.
    pub async fn sync<S: LedgerStore>(
        &self,
        ledger: &Ledger<S>,
        house_cert: &HouseCertificate,
        house_key: &Keypair,
    ) -> Result<SyncReport, SyncError> {
        let before = ledger.watermark()?;
        let entries = ledger.unsynced()?;
        let Some(last_sent) = entries.last().map(|e| e.seq) else {
            return Ok(SyncReport {
                synced: 0,
                watermark: before,
                offline: self.is_offline(),
            });
        };

        let Some(authority) = &self.authority else {
            warn!(
                entries = entries.len(),
                "no authority configured; marking entries as synced locally"
            );
            let watermark = ledger.mark_synced(last_sent)?;
            return Ok(SyncReport {
                synced: entries.len(),
                watermark,
                offline: true,
            });
        };

        if house_key.public_key() != *house_cert.public_key() {
            return Err(SyncError::KeyMismatch);
        }

        let ack = self
            .submit_with_retry(authority.as_ref(), house_cert, house_key, &entries)
            .await?;
        let confirmed = ack.last_seq.unwrap_or(last_sent).min(last_sent);
        let watermark = ledger.mark_synced(confirmed)?;
        let synced = entries
            .iter()
            .filter(|e| e.seq > before && e.seq <= watermark)
            .count();

        info!(
            synced,
            sent = entries.len(),
            watermark,
            "ledger synced with authority"
        );
        Ok(SyncReport {
            synced,
            watermark,
            offline: false,
        })
    }

    async fn submit_with_retry(
        &self,
        authority: &dyn Authority,
        house_cert: &HouseCertificate,
        house_key: &Keypair,
        entries: &[LedgerEntry],
    ) -> Result<SyncAck, SyncError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(
                self.policy.request_timeout,
                Self::attempt(authority, house_cert, house_key, entries),
            )
            .await
            .unwrap_or(Err(SyncError::Timeout));

            match result {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt as u32 - 1);
                    warn!(attempt, error = %e, ?delay, "sync attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "sync failed");
                    return Err(e);
                }
            }
        }
    }

    /// One challenge/submit exchange; every attempt uses a fresh nonce
    async fn attempt(
        authority: &dyn Authority,
        house_cert: &HouseCertificate,
        house_key: &Keypair,
        entries: &[LedgerEntry],
    ) -> Result<SyncAck, SyncError> {
        let nonce = authority.request_challenge(house_cert).await?;
        let proof = SyncProofPayload {
            house_id: house_cert.house_id().to_string(),
            nonce,
        };
        let signature = proof.sign_with(house_key);

        let request = SyncRequest {
            house_cert: house_cert.clone(),
            entries: entries.to_vec(),
            proof: SyncProof {
                nonce: proof.nonce,
                signature,
            },
        };
        authority.submit(&request).await
    }
}
