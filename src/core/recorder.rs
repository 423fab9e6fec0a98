//! Post-install recording
//!
//! After a package's routine completes, the recorder works out which files
//! under the prefix changed, writes them to a manifest, snapshots the install
//! tree in git (commit + tag named after the ledger key), appends the ledger
//! entry and finally recompresses the documentation the package installed.

use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::compress::{compress_docs, CompressionStats};
use crate::core::ledger::{unix_now, Ledger, LedgerEntry};
use crate::core::resolver::ResolvedArchive;
use crate::core::settings::Settings;
use crate::core::tree_state::{render_manifest, TreeState};
use crate::core::version::ledger_key;
use crate::error::{BuildError, ChainbuildError};
use crate::infra::git::InstallTreeRepo;
use crate::infra::process::ToolRunner;

/// What was recorded for one package
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// Ledger entry that was appended
    pub entry: LedgerEntry,
    /// Manifest of changed files
    pub manifest: PathBuf,
    /// Documentation recompression results
    pub docs: CompressionStats,
}

/// Records completed packages
#[derive(Debug)]
pub struct Recorder<'a> {
    settings: &'a Settings,
    runner: &'a ToolRunner,
    snapshot: Option<InstallTreeRepo>,
}

impl<'a> Recorder<'a> {
    /// Recorder for the prefix of `settings`; `snapshot` is the install-tree repository, if any
    pub fn new(settings: &'a Settings, runner: &'a ToolRunner, snapshot: Option<InstallTreeRepo>) -> Self {
        Self {
            settings,
            runner,
            snapshot,
        }
    }

    /// Manifest path for a ledger key
    pub fn manifest_path(&self, key: &str) -> PathBuf {
        self.settings.manifests_dir().join(format!("{key}.txt"))
    }

    /// Record `resolved` as completed
    ///
    /// `before` is the state of the prefix captured before the package was
    /// installed. Snapshot problems are logged; a ledger failure is fatal.
    pub async fn record(
        &self,
        ledger: &mut Ledger,
        resolved: &ResolvedArchive,
        before: &TreeState,
        log: &Path,
    ) -> Result<RecordOutcome, ChainbuildError> {
        let key = ledger_key(&resolved.name).to_string();
        let changes = TreeState::capture(&self.settings.prefix).diff(before);
        tracing::info!("{} changed {} files", resolved.name, changes.len());

        let manifest = self.manifest_path(&key);
        write_manifest(&manifest, &render_manifest(&changes))?;

        let snapshot_commit = self.snapshot(&resolved.name, &key).await;

        let entry = LedgerEntry {
            key,
            name: resolved.name.clone(),
            files_changed: changes.len(),
            archive_sha256: resolved.sha256.clone(),
            snapshot_commit,
            recorded_at: unix_now(),
        };
        ledger.record(entry.clone())?;

        let docs = if self.settings.compress_docs {
            let stats = compress_docs(
                self.runner,
                &self.settings.prefix,
                defaults::DOC_COMPRESS_THRESHOLD,
                log,
            )
            .await;
            if stats.changed_tree() {
                self.commit(&format!("chainbuild: {} (compressed documentation)", resolved.name))
                    .await;
            }
            stats
        } else {
            CompressionStats::default()
        };

        Ok(RecordOutcome {
            entry,
            manifest,
            docs,
        })
    }

    /// Commit and tag the install tree; the commit id when one was made
    async fn snapshot(&self, name: &str, key: &str) -> Option<String> {
        let repo = self.snapshot.as_ref()?;
        let commit = self.commit(&format!("chainbuild: {name}")).await;

        if repo.has_tag(key).await {
            tracing::warn!("Snapshot tag {key} already exists, leaving it in place");
        } else if let Err(e) = repo.tag(key).await {
            tracing::warn!("Failed to tag snapshot {key}: {e}");
        }

        commit
    }

    async fn commit(&self, message: &str) -> Option<String> {
        let repo = self.snapshot.as_ref()?;
        match repo.commit_all(message).await {
            Ok(Some(id)) => {
                tracing::debug!("Committed {id}: {message}");
                Some(id)
            }
            Ok(None) => {
                tracing::debug!("Nothing to commit for '{message}'");
                None
            }
            Err(e) => {
                tracing::warn!("Failed to snapshot install tree: {e}");
                None
            }
        }
    }
}

fn write_manifest(path: &Path, content: &str) -> Result<(), BuildError> {
    let io_err = |e: std::io::Error| BuildError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)
}
