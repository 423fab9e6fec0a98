//! CLI implementation for `chainbuild list`
//!
//! Shows the package list in build order with each entry's role and whether
//! the ledger already holds it.

use anyhow::{Context, Result};

use crate::config::packages::package_list;
use crate::core::ledger::Ledger;
use crate::core::package::{PackageEntry, PackageSource, Role};
use crate::core::settings::Settings;
use crate::core::version::{ledger_key, split_name_version};

fn role_label(entry: &PackageEntry) -> String {
    match entry.role {
        Role::Build(kind) => kind.to_string(),
        Role::Component { of } => format!("{of} component"),
        Role::FetchOnly => "fetch only".to_string(),
    }
}

/// Build status of a buildable entry
///
/// Git packages are keyed by `<repo>-<tag version>`, so any recorded key with
/// the repository name as its project counts; the most recent one is shown.
fn build_state(ledger: &Ledger, entry: &PackageEntry) -> String {
    let label = entry.label();
    match entry.source {
        PackageSource::Git(_) => ledger
            .entries()
            .iter()
            .rev()
            .find(|e| split_name_version(&e.key).is_some_and(|(project, _)| project == label))
            .map_or_else(|| "pending".to_string(), |e| format!("built ({})", e.key)),
        PackageSource::Url(_) if ledger.has(ledger_key(&label)) => "built".to_string(),
        PackageSource::Url(_) => "pending".to_string(),
    }
}

/// Execute the list command
pub fn execute(settings: &Settings) -> Result<()> {
    let ledger = Ledger::open(&settings.ledger_path())
        .with_context(|| format!("Failed to read ledger at {}", settings.ledger_path().display()))?;

    println!("Packages ({} → {}):", settings.toolchain_name, settings.prefix.display());
    for entry in package_list() {
        let label = entry.label();
        let state = match entry.role {
            Role::Build(_) => build_state(&ledger, &entry),
            Role::Component { .. } | Role::FetchOnly => "-".to_string(),
        };
        println!("  {label:<28} {:<20} {state}", role_label(&entry));
    }

    Ok(())
}
