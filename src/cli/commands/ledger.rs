//! CLI implementation for `chainbuild ledger`
//!
//! Lists completed packages or clears one so the next build redoes it.

use anyhow::{Context, Result};

use crate::cli::output::{say, status};
use crate::core::ledger::Ledger;
use crate::core::settings::Settings;

fn open(settings: &Settings) -> Result<Ledger> {
    let path = settings.ledger_path();
    Ledger::open(&path).with_context(|| format!("Failed to read ledger at {}", path.display()))
}

/// List completed packages
pub fn execute_list(settings: &Settings) -> Result<()> {
    let ledger = open(settings)?;

    if ledger.entries().is_empty() {
        println!("No packages recorded in {}", ledger.path().display());
        return Ok(());
    }

    for entry in ledger.entries() {
        let commit = entry
            .snapshot_commit
            .as_deref()
            .map_or("-", |id| id.get(..12).unwrap_or(id));
        println!(
            "{:<24} {:>6} files  {commit}  {}",
            entry.key, entry.files_changed, entry.name
        );
    }
    Ok(())
}

/// Clear `key` from the ledger
pub fn execute_clear(settings: &Settings, key: &str) -> Result<()> {
    let mut ledger = open(settings)?;
    let entry = ledger
        .clear(key)
        .with_context(|| format!("Failed to clear '{key}'"))?;

    say(
        status::SUCCESS,
        &format!("Cleared {} ({}); it will be rebuilt on the next run", entry.key, entry.name),
    );
    Ok(())
}
