//! Git operations
//!
//! Two concerns live here: the source cache of version-controlled packages
//! (cloned with gix, described and archived with the git CLI) and the
//! optional git snapshot of the install tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::infra::process::{Invocation, ProcessError, ToolRunner};

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// A git command failed
    #[error("'{command}' failed in '{path}': {error}")]
    CommandFailed {
        command: String,
        path: PathBuf,
        error: String,
    },

    /// Repository has no tags to derive a version from
    #[error("Repository at '{path}' has no tags")]
    NoTags { path: PathBuf },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Identity used for install-tree commits
const COMMITTER: [&str; 4] = [
    "-c",
    "user.name=chainbuild",
    "-c",
    "user.email=chainbuild@localhost",
];

/// Strip a single leading `v`/`V` from a tag name
pub fn version_from_tag(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Repository name from a remote URL (`https://github.com/vim/vim.git` -> `vim`)
pub fn repo_name(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .map(|name| name.trim_end_matches(".git"))
        .filter(|name| !name.is_empty())
}

/// Operations on cached clones of package repositories
#[derive(Debug)]
pub struct GitOperations {
    /// Directory holding the clones
    work_dir: PathBuf,
    /// Runner for git CLI calls
    runner: ToolRunner,
}

impl GitOperations {
    /// Create a new git operations handler
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            runner: ToolRunner::new(HashMap::new()),
        }
    }

    /// Path of the clone for `name`
    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// Clone `url` into `<work_dir>/<dest_name>`, keeping full history and tags
    pub fn clone_repo(&self, url: &str, dest_name: &str) -> Result<PathBuf, GitError> {
        let dest_path = self.repo_path(dest_name);

        std::fs::create_dir_all(&self.work_dir).map_err(|e| GitError::IoError {
            path: self.work_dir.clone(),
            error: e.to_string(),
        })?;

        tracing::info!("Cloning {url} into {}", dest_path.display());

        let clone_err = |e: &dyn std::fmt::Display| GitError::CloneFailed {
            url: url.to_string(),
            error: e.to_string(),
        };

        let mut prepare = gix::prepare_clone(url, &dest_path).map_err(|e| clone_err(&e))?;

        let (mut checkout, _outcome) = prepare
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_err(&e))?;

        checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_err(&e))?;

        Ok(dest_path)
    }

    /// Fast-forward the clone to its upstream
    pub async fn pull(&self, repo_path: &Path) -> Result<(), GitError> {
        tracing::info!("Updating {}", repo_path.display());
        self.git(repo_path, &["pull", "--ff-only", "--tags", "-q"])
            .await
            .map(|_| ())
    }

    /// Most recent tag reachable from HEAD
    pub async fn latest_tag(&self, repo_path: &Path) -> Result<String, GitError> {
        match self.git(repo_path, &["describe", "--tags", "--abbrev=0"]).await {
            Ok(tag) if !tag.is_empty() => Ok(tag),
            Ok(_) => Err(GitError::NoTags {
                path: repo_path.to_path_buf(),
            }),
            Err(GitError::CommandFailed { error, .. }) if error.contains("No names found") => {
                Err(GitError::NoTags {
                    path: repo_path.to_path_buf(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Archive HEAD as a `.tar.gz` whose entries live under `<prefix>/`
    pub async fn archive(&self, repo_path: &Path, prefix: &str, output: &Path) -> Result<(), GitError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::IoError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }

        let prefix_arg = format!("--prefix={prefix}/");
        let output_arg = format!("--output={}", output.display());
        self.git(
            repo_path,
            &["archive", "--format=tar.gz", &prefix_arg, &output_arg, "HEAD"],
        )
        .await
        .map(|_| ())
    }

    async fn git(&self, repo_path: &Path, args: &[&str]) -> Result<String, GitError> {
        let inv = Invocation::new("git", repo_path).args(args.iter().copied());
        self.runner.capture(&inv).await.map_err(|e| command_error(&inv, repo_path, e))
    }
}

fn command_error(inv: &Invocation, path: &Path, e: ProcessError) -> GitError {
    GitError::CommandFailed {
        command: inv.command_line(),
        path: path.to_path_buf(),
        error: e.to_string(),
    }
}

/// Git snapshot of the install prefix
///
/// Mutations go through the shared runner so they are elevated together with
/// the install steps when the prefix is not writable.
#[derive(Debug, Clone)]
pub struct InstallTreeRepo {
    /// Install prefix
    root: PathBuf,
    /// Runner carrying the elevation decision
    runner: ToolRunner,
}

impl InstallTreeRepo {
    /// Wrap an install prefix
    pub fn new(root: PathBuf, runner: ToolRunner) -> Self {
        Self { root, runner }
    }

    /// Install prefix
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Invocation {
        Invocation::new("git", &self.root)
            .args(["-c", "safe.directory=*"])
            .args(COMMITTER)
            .args(args.iter().copied())
            .elevated()
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let inv = self.git(args);
        self.runner
            .capture(&inv)
            .await
            .map_err(|e| command_error(&inv, &self.root, e))
    }

    /// Create the repository if the prefix is not one yet
    ///
    /// `ignored` names prefix-relative paths kept out of snapshots.
    pub async fn init(&self, ignored: &[&str]) -> Result<(), GitError> {
        if self.root.join(".git").exists() {
            return Ok(());
        }

        tracing::info!("Initialising install tree repository in {}", self.root.display());
        self.run(&["init", "-q"]).await?;

        if !ignored.is_empty() {
            let patterns = ignored.join("\n");
            let script = format!("printf '%s\\n' '{patterns}' >> .git/info/exclude");
            let inv = Invocation::shell(script, &self.root).elevated();
            self.runner
                .capture(&inv)
                .await
                .map_err(|e| command_error(&inv, &self.root, e))?;
        }
        Ok(())
    }

    /// Stage everything and commit; `None` when nothing changed
    pub async fn commit_all(&self, message: &str) -> Result<Option<String>, GitError> {
        self.run(&["add", "-A"]).await?;

        let status = self.run(&["status", "--porcelain"]).await?;
        if status.is_empty() {
            return Ok(None);
        }

        self.run(&["commit", "-q", "-m", message]).await?;
        let id = self.run(&["rev-parse", "HEAD"]).await?;
        Ok(Some(id))
    }

    /// Create an immutable tag at HEAD
    pub async fn tag(&self, name: &str) -> Result<(), GitError> {
        self.run(&["tag", name]).await.map(|_| ())
    }

    /// Whether a tag exists
    pub async fn has_tag(&self, name: &str) -> bool {
        let reference = format!("refs/tags/{name}");
        self.run(&["rev-parse", "-q", "--verify", &reference])
            .await
            .is_ok()
    }
}
