//! End-of-run failure summary
//!
//! Test suites report failures in many dialects (`# FAIL: 2`, `1 tests
//! failed`, `failures=3`). Every phase log is scanned for a failure marker
//! followed by a count, and lines whose count is zero are dropped.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// A log line reporting a non-zero failure count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLine {
    /// Log file the line came from
    pub log: PathBuf,
    /// 1-based line number
    pub line_no: usize,
    /// Line text, trimmed
    pub text: String,
    /// Reported failure count
    pub count: u64,
}

fn failure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:(\d+)\s+(?:tests?\s+)?fail(?:ed|ures?|s)?\b|\bfail(?:ed|ures?|s)?\b\s*(?:tests\s*)?[:=(]?\s*(\d+))")
            .unwrap_or_else(|e| unreachable!("failure pattern is valid: {e}"))
    })
}

/// Failure count reported on `line`, if any
pub fn failure_count(line: &str) -> Option<u64> {
    let captures = failure_pattern().captures(line)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Non-zero failure lines of one log text
pub fn scan_text(log: &Path, content: &str) -> Vec<FailureLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let count = failure_count(line)?;
            (count > 0).then(|| FailureLine {
                log: log.to_path_buf(),
                line_no: index + 1,
                text: line.trim().to_string(),
                count,
            })
        })
        .collect()
}

/// Scan every `*.log` under `logs_dir`, in path order
pub fn scan_logs(logs_dir: &Path) -> Vec<FailureLine> {
    let mut logs: Vec<PathBuf> = WalkDir::new(logs_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .collect();
    logs.sort();

    logs.iter()
        .flat_map(|log| match std::fs::read(log) {
            Ok(bytes) => scan_text(log, &String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::warn!("Cannot read {}: {e}", log.display());
                Vec::new()
            }
        })
        .collect()
}
