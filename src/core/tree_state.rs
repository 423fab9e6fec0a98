//! Install tree state
//!
//! A cheap fingerprint of every file under the prefix (length, mtime and
//! whether it is a symlink). Comparing the fingerprint taken before and after
//! an install yields the package's changed file set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Directories never included in a snapshot
const EXCLUDED: [&str; 2] = [".git", ".chainbuild"];

/// Fingerprint of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Size in bytes
    pub len: u64,
    /// Modification time
    pub modified: Option<SystemTime>,
    /// Symlink (not followed)
    pub symlink: bool,
}

/// How a path changed between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    Added,
    Modified,
    Removed,
}

impl Change {
    fn marker(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Removed => 'D',
        }
    }
}

/// Snapshot of a directory tree, keyed by relative path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeState {
    files: BTreeMap<PathBuf, FileStamp>,
}

impl TreeState {
    /// Walk `root`; a missing root is an empty tree
    pub fn capture(root: &Path) -> Self {
        let mut files = BTreeMap::new();
        if !root.exists() {
            return Self { files };
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() != 1 || !EXCLUDED.iter().any(|x| e.file_name() == *x)
            });

        for entry in walker.filter_map(Result::ok) {
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let Ok(metadata) = entry.path().symlink_metadata() else {
                continue;
            };
            files.insert(
                relative.to_path_buf(),
                FileStamp {
                    len: metadata.len(),
                    modified: metadata.modified().ok(),
                    symlink: file_type.is_symlink(),
                },
            );
        }

        Self { files }
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the tree has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths that differ from `before`, sorted by path
    pub fn diff(&self, before: &Self) -> Vec<(Change, PathBuf)> {
        let mut changes: Vec<(Change, PathBuf)> = self
            .files
            .iter()
            .filter_map(|(path, stamp)| match before.files.get(path) {
                None => Some((Change::Added, path.clone())),
                Some(old) if old != stamp => Some((Change::Modified, path.clone())),
                Some(_) => None,
            })
            .collect();

        changes.extend(
            before
                .files
                .keys()
                .filter(|path| !self.files.contains_key(*path))
                .map(|path| (Change::Removed, path.clone())),
        );

        changes.sort_by(|a, b| a.1.cmp(&b.1));
        changes
    }
}

/// Manifest text: one `<marker> <path>` line per change
pub fn render_manifest(changes: &[(Change, PathBuf)]) -> String {
    changes
        .iter()
        .map(|(change, path)| format!("{} {}\n", change.marker(), path.display()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_capture_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(TreeState::capture(&temp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_capture_skips_state_and_git() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join(".chainbuild")).unwrap();
        fs::write(root.join("bin/gcc"), "elf").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join(".chainbuild/ledger.jsonl"), "{}").unwrap();

        let state = TreeState::capture(root);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_diff_reports_added_modified_removed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libz.a"), "old").unwrap();
        fs::write(root.join("lib/stale.la"), "x").unwrap();
        let before = TreeState::capture(root);

        fs::write(root.join("lib/libz.a"), "rebuilt archive").unwrap();
        fs::remove_file(root.join("lib/stale.la")).unwrap();
        fs::write(root.join("lib/libz.so"), "so").unwrap();
        let after = TreeState::capture(root);

        let changes = after.diff(&before);
        assert_eq!(
            changes,
            vec![
                (Change::Modified, PathBuf::from("lib/libz.a")),
                (Change::Added, PathBuf::from("lib/libz.so")),
                (Change::Removed, PathBuf::from("lib/stale.la")),
            ]
        );
        assert_eq!(
            render_manifest(&changes),
            "M lib/libz.a\nA lib/libz.so\nD lib/stale.la\n"
        );
    }

    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        std::os::unix::fs::symlink("lib", root.join("lib64")).unwrap();
        fs::write(root.join("lib/libgmp.so"), "so").unwrap();

        let state = TreeState::capture(root);
        assert_eq!(state.len(), 2);
        assert!(state.files[Path::new("lib64")].symlink);
    }

    #[test]
    fn test_unchanged_tree_has_empty_diff() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), "a").unwrap();
        let state = TreeState::capture(temp.path());
        assert!(TreeState::capture(temp.path()).diff(&state).is_empty());
    }
}
