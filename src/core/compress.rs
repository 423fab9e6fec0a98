//! Documentation recompression
//!
//! Large man, info and doc files installed under the prefix are recompressed
//! with `gzip -9n`. Symlinks that pointed at a compressed file are redirected
//! to the `.gz` name so manual pages reached through aliases keep working.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::infra::process::{Invocation, ToolRunner};

/// Documentation directories under the prefix
const DOC_DIRS: [&str; 3] = ["share/man", "share/info", "share/doc"];

/// Suffixes of files that are already compressed
const COMPRESSED_SUFFIXES: &[&str] = &[".gz", ".bz2", ".xz", ".zst", ".lz", ".Z", ".tgz", ".zip"];

/// Compression statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompressionStats {
    /// Number of files compressed
    pub files_compressed: usize,
    /// Number of files skipped
    pub files_skipped: usize,
    /// Number of files that failed compression
    pub files_failed: usize,
    /// Number of symlinks redirected to a compressed target
    pub symlinks_redirected: usize,
    /// Total original size in bytes
    pub original_size: u64,
    /// Total compressed size in bytes
    pub compressed_size: u64,
}

impl CompressionStats {
    /// Calculate compression ratio as a percentage
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            (1.0 - (self.compressed_size as f64 / self.original_size as f64)) * 100.0
        }
    }

    /// Calculate bytes saved
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }

    /// Whether anything under the prefix changed
    pub fn changed_tree(&self) -> bool {
        self.files_compressed > 0 || self.symlinks_redirected > 0
    }
}

/// Check if gzip is installed on the system
pub fn is_gzip_available() -> bool {
    which::which("gzip").is_ok()
}

/// Work found under the documentation directories
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocPlan {
    /// Files to compress
    pub files: Vec<PathBuf>,
    /// Symlinks whose target is in `files`, with their link text
    pub symlinks: Vec<(PathBuf, PathBuf)>,
    /// Files left alone
    pub skipped: usize,
}

fn is_compressed(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    COMPRESSED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// `share/info/dir` is rewritten by every `install-info` run
fn is_info_index(prefix: &Path, path: &Path) -> bool {
    path == prefix.join("share/info/dir")
}

/// Join a symlink's text onto its directory, folding `.` and `..` lexically
fn link_target(link: &Path, text: &Path) -> PathBuf {
    let joined = match link.parent() {
        Some(dir) => dir.join(text),
        None => text.to_path_buf(),
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Scan the documentation directories of `prefix`
pub fn plan_doc_compression(prefix: &Path, threshold: u64) -> DocPlan {
    let mut plan = DocPlan::default();
    let mut links = Vec::new();

    for dir in DOC_DIRS {
        let root = prefix.join(dir);
        if !root.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                links.push(path.to_path_buf());
            } else if file_type.is_file() {
                let small = entry.metadata().map(|m| m.len() < threshold).unwrap_or(true);
                if small || is_compressed(path) || is_info_index(prefix, path) {
                    plan.skipped += 1;
                } else {
                    plan.files.push(path.to_path_buf());
                }
            }
        }
    }

    let targets: HashSet<&PathBuf> = plan.files.iter().collect();
    for link in links {
        let Ok(text) = std::fs::read_link(&link) else {
            continue;
        };
        if targets.contains(&link_target(&link, &text)) {
            plan.symlinks.push((link, text));
        }
    }

    plan
}

fn with_gz(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Compress documentation under `prefix`, logging the commands to `log`
///
/// Failures are counted and logged; they never stop the run.
pub async fn compress_docs(
    runner: &ToolRunner,
    prefix: &Path,
    threshold: u64,
    log: &Path,
) -> CompressionStats {
    let mut stats = CompressionStats::default();

    if !is_gzip_available() {
        tracing::warn!("gzip not found, skipping documentation compression");
        return stats;
    }

    let plan = plan_doc_compression(prefix, threshold);
    stats.files_skipped = plan.skipped;
    if plan.files.is_empty() {
        tracing::info!("No documentation to compress under {}", prefix.display());
        return stats;
    }

    tracing::info!("Compressing {} documentation files", plan.files.len());

    let mut compressed: HashSet<PathBuf> = HashSet::new();
    for file in &plan.files {
        let original = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        let cwd = file.parent().unwrap_or(prefix);
        let inv = Invocation::new("gzip", cwd)
            .arg("-9nf")
            .arg(file.display().to_string())
            .elevated();

        match runner.run_logged(&inv, log).await {
            Ok(status) if status.success() => {
                let size = std::fs::metadata(with_gz(file)).map(|m| m.len()).unwrap_or(original);
                stats.files_compressed += 1;
                stats.original_size += original;
                stats.compressed_size += size;
                compressed.insert(file.clone());
            }
            Ok(status) => {
                tracing::warn!("gzip failed for {} ({status})", file.display());
                stats.files_failed += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to compress {}: {e}", file.display());
                stats.files_failed += 1;
            }
        }
    }

    for (link, text) in &plan.symlinks {
        if !compressed.contains(&link_target(link, text)) {
            continue;
        }
        let cwd = link.parent().unwrap_or(prefix);
        let script = format!(
            "ln -sfn '{}' '{}' && rm -f '{}'",
            with_gz(text).display(),
            with_gz(link).display(),
            link.display()
        );
        let inv = Invocation::shell(script, cwd).elevated();
        match runner.run_logged(&inv, log).await {
            Ok(status) if status.success() => stats.symlinks_redirected += 1,
            _ => tracing::warn!("Failed to redirect symlink {}", link.display()),
        }
    }

    stats
}

/// Display compression statistics
#[allow(clippy::cast_precision_loss)]
pub fn display_stats(stats: &CompressionStats) {
    if stats.files_compressed == 0 && stats.files_failed == 0 {
        return;
    }

    println!("Documentation compression:");
    println!("  Files compressed: {}", stats.files_compressed);

    if stats.symlinks_redirected > 0 {
        println!("  Symlinks redirected: {}", stats.symlinks_redirected);
    }

    if stats.files_failed > 0 {
        println!("  Files failed: {}", stats.files_failed);
    }

    if stats.original_size > 0 {
        let saved_kb = stats.bytes_saved() as f64 / 1024.0;
        println!("  Space saved: {:.1} KB ({:.1}%)", saved_kb, stats.ratio());
    }
}
