//! gcc specs patching
//!
//! After gcc is installed its built-in specs are dumped, `-rpath
//! <prefix>/lib64` is appended to the `*link:` section, and the result is
//! installed as the `specs` file next to `libgcc.a`. Binaries linked by the
//! new compiler then find the prefix's shared libraries at run time.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::infra::process::{Invocation, ProcessError, ToolRunner};

/// Specs patch errors
#[derive(Error, Debug)]
pub enum SpecsError {
    /// The dumped specs contain no `*link:` section
    #[error("No '*link:' section in the specs of '{compiler}'")]
    MissingLinkSection { compiler: String },

    /// A compiler query failed
    #[error("Failed to query '{compiler}': {error}")]
    Query { compiler: String, error: String },

    /// Writing or installing the specs file failed
    #[error("Failed to install specs file '{path}': {error}")]
    Install { path: PathBuf, error: String },
}

/// Append `-rpath <dir>` to the line following `*link:`
///
/// Already-patched specs are returned unchanged. `None` means the section
/// is missing.
pub fn embed_rpath(specs: &str, dir: &Path) -> Option<String> {
    let flag = format!(" -rpath {}", dir.display());
    let mut lines: Vec<String> = specs.lines().map(str::to_string).collect();

    let header = lines.iter().position(|l| l.trim_end() == "*link:")?;
    let body = lines.get_mut(header + 1)?;
    if !body.contains(flag.trim_start()) {
        body.push_str(&flag);
    }

    let mut patched = lines.join("\n");
    if specs.ends_with('\n') {
        patched.push('\n');
    }
    Some(patched)
}

/// Patch the specs of the compiler at `gcc`
///
/// Mutating steps are logged to `log`; the specs file is installed through
/// the runner so it is elevated together with the package install.
pub async fn patch_compiler_specs(
    runner: &ToolRunner,
    gcc: &Path,
    rpath_dir: &Path,
    scratch: &Path,
    log: &Path,
) -> Result<PathBuf, SpecsError> {
    let compiler = gcc.display().to_string();
    let query = |e: ProcessError| SpecsError::Query {
        compiler: compiler.clone(),
        error: e.to_string(),
    };

    let libgcc = runner
        .capture(&Invocation::new(compiler.clone(), scratch).arg("-print-libgcc-file-name"))
        .await
        .map_err(query)?;
    let specs_dir = Path::new(&libgcc)
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| SpecsError::Query {
            compiler: compiler.clone(),
            error: format!("unexpected libgcc path '{libgcc}'"),
        })?;

    let dumped = runner
        .capture(&Invocation::new(compiler.clone(), scratch).arg("-dumpspecs"))
        .await
        .map_err(query)?;

    let patched = embed_rpath(&dumped, rpath_dir).ok_or_else(|| SpecsError::MissingLinkSection {
        compiler: compiler.clone(),
    })?;

    let staged = scratch.join("specs");
    tokio::fs::write(&staged, patched)
        .await
        .map_err(|e| SpecsError::Install {
            path: staged.clone(),
            error: e.to_string(),
        })?;

    let target = specs_dir.join("specs");
    let install = Invocation::new("install", scratch)
        .args(["-m", "644"])
        .arg(staged.display().to_string())
        .arg(target.display().to_string())
        .elevated();

    let status = runner
        .run_logged(&install, log)
        .await
        .map_err(|e| SpecsError::Install {
            path: target.clone(),
            error: e.to_string(),
        })?;
    if !status.success() {
        return Err(SpecsError::Install {
            path: target,
            error: format!("install exited with {status}"),
        });
    }

    tracing::info!("Embedded -rpath {} into {}", rpath_dir.display(), target.display());
    Ok(target)
}
