//! Ledger persistence.
//!
//! RULE: Only store.rs touches the ledger and snapshot files.
//! The blob on disk is always the obfuscated form: it is decoded on every
//! read and re-encoded on every write. Writes replace the whole file.
//!
//! Callers reach the store through SharedLedger, whose lock is held for the
//! full load -> mutate -> commit sequence.

use crate::{
    codec::{self, ObfuscationKey},
    config::StorageConfig,
    error::{LedgerError, LedgerResult},
    journal::Journal,
    record::{serialize_ledger, EntitlementRecord, LedgerLine, RECORD_SEPARATOR},
    rng::FillerRng,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct LedgerStore {
    ledger_path:   PathBuf,
    snapshot_path: PathBuf,
    key:           ObfuscationKey,
    rng:           FillerRng,
    journal:       Journal,
}

impl LedgerStore {
    /// Open the store described by `storage`. Files are created lazily.
    pub fn open(storage: &StorageConfig) -> LedgerResult<Self> {
        Ok(Self {
            ledger_path:   PathBuf::from(&storage.ledger_path),
            snapshot_path: PathBuf::from(&storage.snapshot_path),
            key:           ObfuscationKey::parse(&storage.ledger_key)?,
            rng:           FillerRng::from_entropy(),
            journal:       Journal::open(&storage.journal_path)?,
        })
    }

    /// Swap the filler stream (tests use a seeded one).
    pub fn with_rng(mut self, rng: FillerRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    // ── Ledger ─────────────────────────────────────────────────

    /// Decoded ledger text. A missing ledger is created empty.
    pub fn load_decoded(&self) -> LedgerResult<String> {
        match read_blob(&self.ledger_path)? {
            Some(blob) => codec::decode(&blob, &self.key),
            None => {
                write_blob(&self.ledger_path, "")?;
                log::info!("created empty ledger at {}", self.ledger_path.display());
                Ok(String::new())
            }
        }
    }

    /// Encode `raw` and replace the ledger file with it.
    pub fn commit(&mut self, raw: &str) -> LedgerResult<()> {
        let blob = codec::encode(raw, &self.key, &mut self.rng);
        write_blob(&self.ledger_path, &blob)
    }

    /// Every ledger segment, unreadable ones included.
    pub fn load_lines(&self) -> LedgerResult<Vec<LedgerLine>> {
        Ok(parse_lines(&self.load_decoded()?))
    }

    /// Only the segments that parse as records.
    pub fn load_records(&self) -> LedgerResult<Vec<EntitlementRecord>> {
        Ok(parse_records(&self.load_decoded()?))
    }

    pub fn commit_lines(&mut self, lines: &[LedgerLine]) -> LedgerResult<()> {
        self.commit(&serialize_ledger(lines))
    }

    // ── Snapshot ───────────────────────────────────────────────

    /// Records captured by the previous reconciliation pass.
    /// `None` on the first pass, before any snapshot exists.
    pub fn load_snapshot(&self) -> LedgerResult<Option<Vec<EntitlementRecord>>> {
        match read_blob(&self.snapshot_path)? {
            Some(blob) => Ok(Some(parse_records(&codec::decode(&blob, &self.key)?))),
            None => Ok(None),
        }
    }

    /// Replace ledger and snapshot with the same content.
    ///
    /// Both blobs are staged before either live file is touched. If the
    /// snapshot cannot be put in place after the ledger was, the previous
    /// ledger blob is restored so the two never disagree.
    pub fn commit_pass(&mut self, lines: &[LedgerLine]) -> LedgerResult<()> {
        let raw = serialize_ledger(lines);
        let ledger_blob = codec::encode(&raw, &self.key, &mut self.rng);
        let snapshot_blob = codec::encode(&raw, &self.key, &mut self.rng);
        let previous_ledger = read_blob(&self.ledger_path)?;

        let ledger_stage = stage_blob(&self.ledger_path, &ledger_blob)?;
        let snapshot_stage = match stage_blob(&self.snapshot_path, &snapshot_blob) {
            Ok(p) => p,
            Err(e) => {
                let _ = fs::remove_file(&ledger_stage);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&ledger_stage, &self.ledger_path) {
            let _ = fs::remove_file(&ledger_stage);
            let _ = fs::remove_file(&snapshot_stage);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&snapshot_stage, &self.snapshot_path) {
            let _ = fs::remove_file(&snapshot_stage);
            let restored = match &previous_ledger {
                Some(blob) => write_blob(&self.ledger_path, blob),
                None => fs::remove_file(&self.ledger_path).map_err(LedgerError::from),
            };
            if let Err(restore) = restored {
                log::error!(
                    "cannot restore {} after failed snapshot write: {restore}",
                    self.ledger_path.display()
                );
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Split decoded ledger text into lines. Empty segments are ignored;
/// unreadable ones are kept as `LedgerLine::Raw`.
pub fn parse_lines(raw: &str) -> Vec<LedgerLine> {
    raw.split(RECORD_SEPARATOR)
        .filter(|line| !line.is_empty())
        .map(LedgerLine::parse)
        .collect()
}

/// The parsed records of decoded ledger text, unreadable lines left out.
pub fn parse_records(raw: &str) -> Vec<EntitlementRecord> {
    parse_lines(raw)
        .into_iter()
        .filter_map(LedgerLine::into_record)
        .collect()
}

/// Persisted blob with stray line breaks removed, or `None` if absent.
fn read_blob(path: &Path) -> LedgerResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.replace(['\r', '\n'], ""))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_blob(path: &Path, blob: &str) -> LedgerResult<()> {
    let staged = stage_blob(path, blob)?;
    fs::rename(staged, path)?;
    Ok(())
}

fn stage_blob(path: &Path, blob: &str) -> LedgerResult<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    let staged = PathBuf::from(staged);
    fs::write(&staged, blob)?;
    Ok(staged)
}

/// Process-wide handle to the single ledger.
///
/// Every request and every reconciliation commit runs inside `transact`,
/// which serializes writers for the whole read-modify-write sequence.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<LedgerStore>>,
}

impl SharedLedger {
    pub fn new(store: LedgerStore) -> Self {
        Self { inner: Arc::new(Mutex::new(store)) }
    }

    pub fn transact<T>(&self, f: impl FnOnce(&mut LedgerStore) -> T) -> LedgerResult<T> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(f(&mut guard))
    }
}
