//! Completion ledger
//!
//! An append-only JSON-lines event log of completed packages. Presence of a
//! key is the only thing consulted when deciding whether to build a package.
//! Entries are never rewritten: clearing one appends a `cleared` event.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;

/// One completed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Name-version with the source qualifier stripped
    pub key: String,
    /// Full canonical name (top-level directory of the archive)
    pub name: String,
    /// Number of files added, changed or removed under the prefix
    pub files_changed: usize,
    /// SHA-256 of the archive the package was built from
    pub archive_sha256: String,
    /// Install-tree snapshot commit, when snapshots are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_commit: Option<String>,
    /// UNIX timestamp of completion
    pub recorded_at: u64,
}

/// A line of the ledger file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Package completed
    Completed(LedgerEntry),
    /// Operator cleared a package so it builds again
    Cleared { key: String, at: u64 },
}

/// Seconds since the UNIX epoch
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-memory view of the ledger file
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Load the ledger by replaying its events
    ///
    /// A missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
        };

        if !path.exists() {
            return Ok(ledger);
        }

        let content = std::fs::read_to_string(path).map_err(|e| LedgerError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: LedgerEvent =
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    path: path.to_path_buf(),
                    line: index + 1,
                    error: e.to_string(),
                })?;
            ledger.apply(event);
        }

        tracing::debug!(
            "Loaded ledger {} with {} entries",
            path.display(),
            ledger.entries.len()
        );
        Ok(ledger)
    }

    fn apply(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::Completed(entry) => {
                self.entries.retain(|e| e.key != entry.key);
                self.entries.push(entry);
            }
            LedgerEvent::Cleared { key, .. } => self.entries.retain(|e| e.key != key),
        }
    }

    fn append(&self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let write_err = |e: &dyn std::fmt::Display| LedgerError::Write {
            path: self.path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
        }

        let mut line = serde_json::to_string(event).map_err(|e| write_err(&e))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| write_err(&e))?;
        file.write_all(line.as_bytes()).map_err(|e| write_err(&e))?;
        file.sync_data().map_err(|e| write_err(&e))
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` has completed
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Entry for `key`
    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Completed entries in completion order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Record a completed package
    pub fn record(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        if self.has(&entry.key) {
            return Err(LedgerError::AlreadyRecorded { key: entry.key });
        }

        let event = LedgerEvent::Completed(entry);
        self.append(&event)?;
        tracing::info!("Ledger: recorded {}", self.path.display());
        self.apply(event);
        Ok(())
    }

    /// Forget a completed package so the next run rebuilds it
    pub fn clear(&mut self, key: &str) -> Result<LedgerEntry, LedgerError> {
        let entry = self
            .get(key)
            .cloned()
            .ok_or_else(|| LedgerError::NotRecorded {
                key: key.to_string(),
            })?;

        let event = LedgerEvent::Cleared {
            key: key.to_string(),
            at: unix_now(),
        };
        self.append(&event)?;
        self.apply(event);
        Ok(entry)
    }
}
