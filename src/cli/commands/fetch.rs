//! CLI implementation for `chainbuild fetch` command
//!
//! Downloads every archive and archives every git package into the source
//! cache without touching the install prefix.

use anyhow::{Context, Result};

use crate::cli::output::{is_quiet, say, status, TerminalObserver};
use crate::config::packages::package_list;
use crate::core::orchestrator::Orchestrator;
use crate::core::recipe::StandardRecipes;
use crate::core::settings::Settings;

/// Execute the fetch command
pub async fn execute(settings: &Settings, only: Vec<String>) -> Result<()> {
    let observer = TerminalObserver::new();
    let result = Orchestrator::new(settings, package_list(), &StandardRecipes)
        .with_only(only)
        .fetch(&observer)
        .await
        .with_context(|| "Failed to fetch packages")?;

    if result.fetched.is_empty() && result.failed.is_empty() {
        say(status::SUCCESS, "Nothing to fetch");
        return Ok(());
    }

    if !result.fetched.is_empty() {
        say(
            status::SUCCESS,
            &format!(
                "{} archive(s) in {}:",
                result.fetched.len(),
                settings.sources_dir.display()
            ),
        );
        if !is_quiet() {
            for archive in &result.fetched {
                println!("    {} ({})", archive.name, archive.path.display());
            }
        }
    }

    if !result.failed.is_empty() {
        println!("{} Failed to fetch {} item(s):", status::ERROR, result.failed.len());
        for (name, error) in &result.failed {
            println!("    {name}: {error}");
        }
    }

    Ok(())
}
