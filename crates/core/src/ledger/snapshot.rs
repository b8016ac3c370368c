//! Ledger persistence.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::{Company, InventoryItem};

use super::Ledger;

/// File name of the ledger inside the data directory.
pub const LEDGER_FILE: &str = "ledger.json";

/// Serialized form of a [`Ledger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Id the next opened company receives.
    pub next_company_id: i64,
    /// Every company.
    #[serde(default)]
    pub companies: Vec<Company>,
    /// Every holding of every company.
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

/// Exclusive hold on a ledger file, shared with other processes through an
/// advisory lock on `<ledger>.lock`. Released on drop.
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// The lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %err, "failed to release ledger lock");
        }
    }
}

/// Reads and writes ledger snapshots at a fixed path.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/ledger.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(LEDGER_FILE))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock file guarding the snapshot, `ledger.lock` next to `ledger.json`.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn parent_dir(&self) -> Result<PathBuf> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        Ok(parent)
    }

    /// Block until no other holder of the lock remains.
    ///
    /// Keep the guard alive across load, trade and save; otherwise two
    /// processes can start from the same balance and the later save drops
    /// the earlier trade.
    pub fn lock(&self) -> Result<LedgerLock> {
        self.parent_dir()?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("failed to lock {}", path.display()))?;
        debug!(path = %path.display(), "ledger locked");
        Ok(LedgerLock { file, path })
    }

    /// Read the snapshot; `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Replace the file with `snapshot` via write-to-temp then rename.
    pub fn persist(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let parent = self.parent_dir()?;
        let mut file = NamedTempFile::new_in(&parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        serde_json::to_writer_pretty(&mut file, snapshot)?;
        file.flush()?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), companies = snapshot.companies.len(), "ledger persisted");
        Ok(())
    }

    /// Load and validate the ledger, or start an empty one.
    pub fn load_ledger(&self) -> Result<Ledger> {
        match self.load()? {
            Some(snapshot) => {
                let ledger = Ledger::restore(snapshot)
                    .with_context(|| format!("invalid ledger in {}", self.path.display()))?;
                info!(path = %self.path.display(), "ledger loaded");
                Ok(ledger)
            }
            None => Ok(Ledger::new()),
        }
    }

    /// Persist the current state of `ledger`.
    pub fn save_ledger(&self, ledger: &Ledger) -> Result<()> {
        self.persist(&ledger.snapshot())
    }
}
