//! Build command implementation
//!
//! Implements `chainbuild build`: runs the whole chain (or the `--only`
//! selection) and prints the failure summary at the end.

use anyhow::{Context, Result};

use crate::cli::output::{print_failure_summary, say, status, TerminalObserver};
use crate::config::packages::package_list;
use crate::core::compress::display_stats;
use crate::core::orchestrator::{Orchestrator, SkipReason};
use crate::core::recipe::StandardRecipes;
use crate::core::settings::Settings;

/// Execute the build command
pub async fn execute(settings: &Settings, only: Vec<String>) -> Result<()> {
    tracing::info!(
        "Building {} into {} with {} jobs",
        settings.toolchain_name,
        settings.prefix.display(),
        settings.jobs
    );

    let observer = TerminalObserver::new();
    let report = Orchestrator::new(settings, package_list(), &StandardRecipes)
        .with_only(only)
        .run(&observer)
        .await
        .with_context(|| format!("Build into {} stopped", settings.prefix.display()))?;

    for package in &report.built {
        display_stats(&package.record.docs);
    }

    let already = report
        .skipped
        .iter()
        .filter(|(_, reason)| *reason == SkipReason::AlreadyBuilt)
        .count();
    say(
        status::SUCCESS,
        &format!(
            "Built {} package(s), {already} already built",
            report.built.len()
        ),
    );

    if !report.failed.is_empty() {
        println!("{} Could not fetch {} package(s):", status::ERROR, report.failed.len());
        for (name, error) in &report.failed {
            println!("    {name}: {error}");
        }
    }

    print_failure_summary(&report.failures);
    Ok(())
}
