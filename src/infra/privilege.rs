//! Privilege elevation
//!
//! When the install prefix is not writable by the current user, every
//! install-tree mutation goes through sudo. Credentials are validated once
//! up front and then refreshed in the background so a long compile does not
//! leave the next install step waiting on a password prompt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{access, getuid, AccessFlags};
use tokio::task::JoinHandle;

use crate::infra::process::{Invocation, ProcessError, ToolRunner};

/// Nearest existing ancestor of `path` (including `path` itself)
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors().find(|p| p.exists()).map(Path::to_path_buf)
}

/// Whether the current user can create or modify `path`
pub fn is_writable(path: &Path) -> bool {
    nearest_existing_ancestor(path)
        .is_some_and(|existing| access(existing.as_path(), AccessFlags::W_OK).is_ok())
}

/// Whether install-tree mutations under `prefix` need sudo
pub fn needs_elevation(prefix: &Path) -> bool {
    !is_writable(prefix)
}

/// Refreshes cached sudo credentials until dropped
#[derive(Debug)]
pub struct SudoKeepalive {
    handle: JoinHandle<()>,
}

impl SudoKeepalive {
    /// Validate credentials interactively, then refresh them every `interval`
    pub async fn start(interval: Duration) -> Result<Self, ProcessError> {
        let status = tokio::process::Command::new("sudo")
            .arg("-v")
            .status()
            .await
            .map_err(|e| ProcessError::Spawn {
                program: "sudo".to_string(),
                error: e.to_string(),
            })?;
        if !status.success() {
            return Err(ProcessError::Failed {
                program: "sudo -v".to_string(),
                status: status.to_string(),
                stderr: "could not obtain sudo credentials".to_string(),
            });
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let refreshed = tokio::process::Command::new("sudo")
                    .args(["-n", "-v"])
                    .status()
                    .await;
                match refreshed {
                    Ok(status) if status.success() => tracing::debug!("Refreshed sudo credentials"),
                    _ => tracing::warn!("Failed to refresh sudo credentials"),
                }
            }
        });

        Ok(Self { handle })
    }
}

impl Drop for SudoKeepalive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Create `dir` owned by the current user, elevating when required
pub async fn ensure_owned_dir(runner: &ToolRunner, dir: &Path) -> Result<(), ProcessError> {
    if dir.is_dir() && access(dir, AccessFlags::W_OK).is_ok() {
        return Ok(());
    }

    let cwd = nearest_existing_ancestor(dir).unwrap_or_else(|| PathBuf::from("/"));
    let inv = Invocation::new("install", cwd)
        .args(["-d", "-o"])
        .arg(getuid().to_string())
        .arg(dir.display().to_string())
        .elevated();
    runner.run_checked(&inv).await
}
