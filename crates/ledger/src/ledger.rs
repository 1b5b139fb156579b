//! The house ledger: single-writer append path and sync watermark

use crate::entry::{EventType, LedgerEntry};
use crate::error::LedgerError;
use crate::hash::{compute_entry_id, verify_chain};
use crate::signature::sign_entry_id;
use crate::store::{JsonlStore, LedgerStore, MemoryStore};
use rollet_core::{time, Keypair, PublicKey, Timestamp};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Optional fields attached at append time
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Explicit signature; when absent the ledger signer (if any) signs the entry id
    pub signature: Option<String>,
    pub merkle_root: Option<String>,
}

impl AppendOptions {
    pub fn with_merkle_root(root: impl Into<String>) -> Self {
        Self {
            signature: None,
            merkle_root: Some(root.into()),
        }
    }
}

#[derive(Debug, Default)]
struct Tail {
    seq: u64,
    last_id: Option<String>,
}

/// Append-only hash-chained ledger.
///
/// `append` holds the writer lock across read-tail, compute and persist, so
/// concurrent callers always produce a linear chain.
pub struct Ledger<S: LedgerStore = JsonlStore> {
    store: S,
    signer: Option<Arc<Keypair>>,
    tail: Mutex<Tail>,
}

impl Ledger<JsonlStore> {
    /// Open the JSONL ledger in `dir`, resuming after its last entry
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open(JsonlStore::open(dir)?)
    }
}

impl Ledger<MemoryStore> {
    /// Create an in-memory ledger (for testing)
    pub fn in_memory() -> Self {
        Self {
            store: MemoryStore::new(),
            signer: None,
            tail: Mutex::new(Tail::default()),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Wrap `store`, replaying it to find the chain tail
    pub fn open(store: S) -> Result<Self, LedgerError> {
        let entries = store.read_all()?;
        let tail = match entries.last() {
            Some(last) => Tail {
                seq: last.seq,
                last_id: Some(last.entry_id.clone()),
            },
            None => Tail::default(),
        };
        debug!(entries = entries.len(), last_seq = tail.seq, "ledger opened");

        Ok(Self {
            store,
            signer: None,
            tail: Mutex::new(tail),
        })
    }

    /// Sign every new entry id with `signer`
    pub fn with_signer(mut self, signer: Arc<Keypair>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn signer_public_key(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(|k| k.public_key())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append an entry stamped with the current time
    pub fn append<T: Serialize + ?Sized>(
        &self,
        event_type: EventType,
        payload: &T,
        opts: AppendOptions,
    ) -> Result<LedgerEntry, LedgerError> {
        self.append_at(event_type, payload, opts, time::now())
    }

    /// Append an entry with an explicit timestamp
    pub fn append_at<T: Serialize + ?Sized>(
        &self,
        event_type: EventType,
        payload: &T,
        opts: AppendOptions,
        timestamp: Timestamp,
    ) -> Result<LedgerEntry, LedgerError> {
        let payload = serde_json::to_value(payload)?;
        let mut tail = self.tail.lock().map_err(|_| LedgerError::LockPoisoned)?;

        let entry_id = compute_entry_id(tail.last_id.as_deref(), event_type, &payload, timestamp);
        let signature = opts
            .signature
            .or_else(|| self.signer.as_ref().map(|k| sign_entry_id(k, &entry_id)));

        let entry = LedgerEntry {
            seq: tail.seq + 1,
            prev_hash: tail.last_id.clone(),
            entry_id,
            timestamp,
            event_type,
            payload,
            signature,
            merkle_root: opts.merkle_root,
        };

        self.store.append(&entry)?;
        tail.seq = entry.seq;
        tail.last_id = Some(entry.entry_id.clone());

        info!(
            seq = entry.seq,
            event_type = %entry.event_type,
            entry_id = %entry.entry_id,
            "ledger entry appended"
        );
        Ok(entry)
    }

    /// All entries in order
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.read_all()
    }

    pub fn last_seq(&self) -> Result<u64, LedgerError> {
        let tail = self.tail.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(tail.seq)
    }

    pub fn watermark(&self) -> Result<u64, LedgerError> {
        self.store.read_watermark()
    }

    /// Entries with `seq` above the watermark
    pub fn unsynced(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let watermark = self.watermark()?;
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.seq > watermark)
            .collect())
    }

    /// Advance the watermark to `upto` (clamped to the last seq).
    ///
    /// The watermark never moves backwards; the effective value is returned.
    pub fn mark_synced(&self, upto: u64) -> Result<u64, LedgerError> {
        let tail = self.tail.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let current = self.store.read_watermark()?;
        let target = upto.min(tail.seq);

        if target <= current {
            debug!(current, requested = upto, "watermark unchanged");
            return Ok(current);
        }

        self.store.write_watermark(target)?;
        info!(from = current, to = target, "ledger watermark advanced");
        Ok(target)
    }

    /// Verify the whole hash chain, returning the entry count
    pub fn verify(&self) -> Result<usize, LedgerError> {
        let entries = self.entries()?;
        verify_chain(&entries)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::recompute_ids;
    use serde_json::json;
    use tempfile::tempdir;

    fn fill(ledger: &Ledger<impl LedgerStore>, n: usize) {
        for i in 0..n {
            ledger
                .append(
                    EventType::ReceiptIssued,
                    &json!({"receiptId": format!("rec{}", i)}),
                    AppendOptions::default(),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_append_links_chain() {
        let ledger = Ledger::in_memory();
        fill(&ledger, 3);

        let entries = ledger.entries().unwrap();
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[0].prev_hash, None);
        assert_eq!(entries[1].prev_hash.as_deref(), Some(entries[0].entry_id.as_str()));
        assert_eq!(entries[2].prev_hash.as_deref(), Some(entries[1].entry_id.as_str()));
        assert_eq!(ledger.verify().unwrap(), 3);
        assert_eq!(ledger.last_seq().unwrap(), 3);
    }

    #[test]
    fn test_mutation_invalidates_downstream() {
        let ledger = Ledger::in_memory();
        fill(&ledger, 4);
        let original = ledger.entries().unwrap();

        let mut tampered = original.clone();
        tampered[1].payload = json!({"receiptId": "forged"});
        assert!(verify_chain(&tampered).is_err());

        let relinked = recompute_ids(&tampered);
        assert_eq!(relinked[0].entry_id, original[0].entry_id);
        assert!(relinked[1..]
            .iter()
            .zip(&original[1..])
            .all(|(a, b)| a.entry_id != b.entry_id));
    }

    #[test]
    fn test_unsynced_follows_watermark() {
        let ledger = Ledger::in_memory();
        fill(&ledger, 5);
        assert_eq!(ledger.unsynced().unwrap().len(), 5);

        assert_eq!(ledger.mark_synced(3).unwrap(), 3);
        let unsynced = ledger.unsynced().unwrap();
        assert_eq!(unsynced.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_mark_synced_is_monotonic_and_clamped() {
        let ledger = Ledger::in_memory();
        fill(&ledger, 5);

        assert_eq!(ledger.mark_synced(4).unwrap(), 4);
        assert_eq!(ledger.mark_synced(2).unwrap(), 4);
        assert_eq!(ledger.watermark().unwrap(), 4);

        assert_eq!(ledger.mark_synced(99).unwrap(), 5);
        assert!(ledger.unsynced().unwrap().is_empty());
    }

    #[test]
    fn test_signer_signs_entry_ids() {
        let key = Arc::new(Keypair::generate());
        let ledger = Ledger::in_memory().with_signer(key.clone());
        let entry = ledger
            .append(EventType::SessionClosed, &json!({"roundId": "r1"}), AppendOptions::default())
            .unwrap();
        assert!(entry.verify_signature(&key.public_key()).is_ok());
        assert_eq!(ledger.signer_public_key(), Some(key.public_key()));
    }

    #[test]
    fn test_explicit_options_kept() {
        let ledger = Ledger::in_memory();
        let entry = ledger
            .append(
                EventType::SyncExport,
                &json!({"count": 0}),
                AppendOptions {
                    signature: Some("sig".to_string()),
                    merkle_root: Some("root".to_string()),
                },
            )
            .unwrap();
        assert_eq!(entry.signature.as_deref(), Some("sig"));
        assert_eq!(entry.merkle_root.as_deref(), Some("root"));
    }

    #[test]
    fn test_reopen_resumes_chain() {
        let dir = tempdir().unwrap();
        {
            let ledger = Ledger::open_dir(dir.path()).unwrap();
            fill(&ledger, 2);
            ledger.mark_synced(1).unwrap();
        }

        let ledger = Ledger::open_dir(dir.path()).unwrap();
        assert_eq!(ledger.last_seq().unwrap(), 2);
        assert_eq!(ledger.watermark().unwrap(), 1);
        fill(&ledger, 1);
        assert_eq!(ledger.verify().unwrap(), 3);
    }

    #[test]
    fn test_concurrent_appends_stay_linear() {
        let ledger = Arc::new(Ledger::in_memory());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        ledger
                            .append(
                                EventType::Admission,
                                &json!({"thread": t, "i": i}),
                                AppendOptions::default(),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.verify().unwrap(), 100);
    }
}
