//! Archive resolution
//!
//! Turns a package reference into a local archive and the canonical
//! name-version string of the tree inside it. URL archives are downloaded
//! once into the source cache; git remotes are cloned (or fast-forwarded)
//! and archived at their most recent tag. Nothing in the source cache is
//! ever deleted.

use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::package::PackageSource;
use crate::core::settings::Settings;
use crate::error::{ChainbuildError, DownloadError};
use crate::infra::download::{file_checksum, file_name_from_url, DownloadManager, ProgressCallback};
use crate::infra::git::{repo_name, version_from_tag, GitError, GitOperations};
use crate::infra::unpack::{first_component, Compression};

/// A fetched archive and the name of the tree it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArchive {
    /// Archive in the source cache
    pub path: PathBuf,
    /// Canonical name-version (`zlib-1.2.11`, `llvm-7.0.0.src`)
    pub name: String,
    /// SHA-256 of the archive
    pub sha256: String,
}

/// Resolves package references against the source cache
#[derive(Debug)]
pub struct ArchiveResolver {
    sources_dir: PathBuf,
    update_repos: bool,
    downloads: DownloadManager,
    git: GitOperations,
}

impl ArchiveResolver {
    /// Resolver over the source cache of `settings`
    pub fn new(settings: &Settings) -> Self {
        Self {
            sources_dir: settings.sources_dir.clone(),
            update_repos: settings.update_repos,
            downloads: DownloadManager::with_config(defaults::MAX_DOWNLOAD_RETRIES, 1000),
            git: GitOperations::new(settings.repos_dir()),
        }
    }

    /// Replace the download manager
    #[must_use]
    pub fn with_downloads(mut self, downloads: DownloadManager) -> Self {
        self.downloads = downloads;
        self
    }

    /// Source cache directory
    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }

    /// Fetch `source` if needed and name it
    pub async fn resolve(
        &self,
        source: &PackageSource,
        progress: Option<ProgressCallback>,
    ) -> Result<ResolvedArchive, ChainbuildError> {
        let (path, name, fresh_sha256) = match source {
            PackageSource::Url(url) => self.resolve_url(url, progress).await?,
            PackageSource::Git(url) => {
                let (path, name) = self.resolve_git(url).await?;
                (path, name, None)
            }
        };

        let sha256 = match fresh_sha256 {
            Some(sha256) => sha256,
            None => file_checksum(&path).await?,
        };
        tracing::debug!("Resolved {} to {name} ({sha256})", source.location());

        Ok(ResolvedArchive { path, name, sha256 })
    }

    async fn resolve_url(
        &self,
        url: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<(PathBuf, String, Option<String>), ChainbuildError> {
        let file_name = file_name_from_url(url)?;
        let dest = self.sources_dir.join(&file_name);

        // Refuse unknown formats before spending a download on them
        Compression::from_path(&dest)?;

        let mut fresh_sha256 = None;
        if dest.exists() {
            tracing::debug!("Using cached {}", dest.display());
        } else {
            tokio::fs::create_dir_all(&self.sources_dir)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: self.sources_dir.clone(),
                    error: e.to_string(),
                })?;
            tracing::info!("Downloading {url}");
            let result = self.downloads.download(url, &dest, progress).await?;
            tracing::info!("Downloaded {} ({} bytes)", file_name, result.size);
            fresh_sha256 = Some(result.checksum);
        }

        let name = first_component(&dest).await?;
        Ok((dest, name, fresh_sha256))
    }

    async fn resolve_git(&self, url: &str) -> Result<(PathBuf, String), ChainbuildError> {
        let repo = repo_name(url).ok_or_else(|| GitError::CloneFailed {
            url: url.to_string(),
            error: "cannot derive a repository name".to_string(),
        })?;

        let clone = self.git.repo_path(repo);
        if clone.join(".git").exists() {
            if self.update_repos {
                self.git.pull(&clone).await?;
            }
        } else {
            self.git.clone_repo(url, repo)?;
        }

        let tag = self.git.latest_tag(&clone).await?;
        let name = format!("{repo}-{}", version_from_tag(&tag));
        let archive = self.sources_dir.join(format!("{name}.tar.gz"));

        if archive.exists() {
            tracing::debug!("Using cached {}", archive.display());
        } else {
            tracing::info!("Archiving {repo} at {tag}");
            self.git.archive(&clone, &name, &archive).await?;
        }

        Ok((archive, name))
    }
}
