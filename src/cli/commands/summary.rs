//! CLI implementation for `chainbuild summary`

use anyhow::Result;

use crate::cli::output::print_failure_summary;
use crate::core::settings::Settings;
use crate::core::summary::scan_logs;

/// Execute the summary command
pub fn execute(settings: &Settings) -> Result<()> {
    let logs = settings.logs_dir();
    if !logs.exists() {
        println!("No build logs in {}", logs.display());
        return Ok(());
    }

    print_failure_summary(&scan_logs(&logs));
    Ok(())
}
