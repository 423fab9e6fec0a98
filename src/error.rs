//! Error types for chainbuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::settings::SettingsError;
use crate::core::specs::SpecsError;
use crate::infra::git::GitError;
use crate::infra::process::ProcessError;

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// URL has no usable file name
    #[error("Cannot derive an archive file name from '{url}'")]
    NoFileName { url: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Max retries exceeded
    #[error("Download failed after {retries} retries: {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },
}

/// Archive extraction errors
#[derive(Error, Debug)]
pub enum UnpackError {
    /// Extension does not name a supported compression scheme
    #[error("Unknown compression format for '{path}' (expected .tar.gz, .tar.xz or .tar.bz2)")]
    UnknownFormat { path: PathBuf },

    /// Archive contained no entries
    #[error("Archive '{path}' is empty")]
    Empty { path: PathBuf },

    /// IO error while reading or extracting
    #[error("Failed to extract '{path}': {error}")]
    Extract { path: PathBuf, error: String },
}

/// Completion ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to read the ledger file
    #[error("Failed to read ledger '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to append to the ledger file
    #[error("Failed to write ledger '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Ledger line could not be decoded
    #[error("Corrupt ledger '{path}' at line {line}: {error}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        error: String,
    },

    /// Entries are immutable once written
    #[error("Package '{key}' is already recorded in the ledger")]
    AlreadyRecorded { key: String },

    /// Clearing a key that was never recorded
    #[error("Package '{key}' is not recorded in the ledger")]
    NotRecorded { key: String },
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Sibling component tree was not unpacked next to the main source
    #[error("Component '{component}' for '{package}' not found at '{expected}'")]
    MissingComponent {
        package: String,
        component: String,
        expected: PathBuf,
    },

    /// Failed to move a component into place
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Name carries no version after the package token
    #[error("Cannot determine version of '{name}'")]
    NoVersion { name: String },
}

/// Build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// A phase failed under the strict failure policy
    #[error("{phase} failed for package '{package}' (see {log})")]
    PhaseFailed {
        package: String,
        phase: String,
        log: PathBuf,
    },

    /// Install tree could not be prepared
    #[error("Failed to prepare install prefix '{path}': {error}")]
    Prefix { path: PathBuf, error: String },

    /// IO error around the build area
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Top-level chainbuild error type
#[derive(Error, Debug)]
pub enum ChainbuildError {
    /// Settings error
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Download error
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Unpack error
    #[error("Unpack error: {0}")]
    Unpack(#[from] UnpackError),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Specs patch error
    #[error("Specs error: {0}")]
    Specs(#[from] SpecsError),

    /// Process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),
}

impl ChainbuildError {
    /// Whether this error ends the whole run rather than one package
    ///
    /// Retrieval failures only cost the package being processed.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Download(_) | Self::Git(_))
    }
}
