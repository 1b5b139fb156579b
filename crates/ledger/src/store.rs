//! Ledger persistence
//!
//! Stores only persist and replay; chaining happens in [`crate::Ledger`].
//! Each store guards its own state, so one store may be shared by reference.

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Ledger file name inside the data directory
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// Watermark file name inside the data directory
pub const WATERMARK_FILE: &str = "watermark";

/// Persistence seam for the ledger
pub trait LedgerStore: Send + Sync {
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// All entries in append order
    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Highest synced seq, 0 when nothing was ever synced
    fn read_watermark(&self) -> Result<u64, LedgerError>;

    fn write_watermark(&self, seq: u64) -> Result<(), LedgerError>;
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    watermark: u64,
}

/// In-memory store (for testing)
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        state.entries.push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.entries.clone())
    }

    fn read_watermark(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.watermark)
    }

    fn write_watermark(&self, seq: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        state.watermark = seq;
        Ok(())
    }
}

/// Append-only JSONL store plus a watermark file
///
/// Each line of `ledger.jsonl` is one serialized [`LedgerEntry`]. A line is
/// either written whole or not at all.
pub struct JsonlStore {
    ledger_path: PathBuf,
    watermark_path: PathBuf,
    file: Mutex<File>,
}

impl JsonlStore {
    /// Open (or create) the store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let ledger_path = dir.join(LEDGER_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ledger_path)?;
        trim_torn_tail(&file, &ledger_path)?;

        Ok(Self {
            ledger_path,
            watermark_path: dir.join(WATERMARK_FILE),
            file: Mutex::new(file),
        })
    }

    /// Get the path to the ledger file
    pub fn path(&self) -> &Path {
        &self.ledger_path
    }
}

/// Drop a partial last line left by a crash mid-append
fn trim_torn_tail(file: &File, path: &Path) -> Result<(), LedgerError> {
    let bytes = fs::read(path)?;
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    warn!(
        path = %path.display(),
        dropped = bytes.len() - keep,
        "trimming torn ledger line"
    );
    file.set_len(keep as u64)?;
    Ok(())
}

impl LedgerStore for JsonlStore {
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = self.file.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let len = file.metadata()?.len();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.sync_data()) {
            // Roll back so the next line does not land on a fragment
            file.set_len(len)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = File::open(&self.ledger_path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    fn read_watermark(&self) -> Result<u64, LedgerError> {
        if !self.watermark_path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(&self.watermark_path)?;
        raw.trim()
            .parse()
            .map_err(|_| LedgerError::InvalidWatermark(raw.trim().to_string()))
    }

    fn write_watermark(&self, seq: u64) -> Result<(), LedgerError> {
        // Atomic replace
        let tmp = self.watermark_path.with_extension("tmp");
        fs::write(&tmp, seq.to_string())?;
        fs::rename(&tmp, &self.watermark_path)?;
        Ok(())
    }
}
