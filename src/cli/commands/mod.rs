//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod fetch;
pub mod ledger;
pub mod list;
pub mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::core::settings::{Settings, SettingsOverrides};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the chain into the install prefix
    Build(BuildArgs),

    /// Download and archive every package without building
    Fetch {
        /// Fetch only these packages (name or name-version)
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },

    /// Show the package list with ledger status
    List,

    /// Rescan the phase logs and print reported test failures
    Summary,

    /// Inspect or edit the completion ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

/// Flags of `chainbuild build`
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Number of parallel jobs per package
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Install prefix
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Target CPU for -march/-mtune
    #[arg(long)]
    pub march: Option<String>,

    /// Skip the check phase
    #[arg(long)]
    pub no_check: bool,

    /// Do not pull git-sourced packages that are already cloned
    #[arg(long)]
    pub no_update: bool,

    /// Stop at the first configure, build or install failure
    #[arg(long)]
    pub strict: bool,

    /// Do not commit and tag the install tree
    #[arg(long)]
    pub no_snapshot: bool,

    /// Leave installed documentation uncompressed
    #[arg(long)]
    pub no_compress_docs: bool,

    /// Build only these packages (name or name-version)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,
}

impl BuildArgs {
    /// Settings layer carrying the flags that were given
    pub fn overrides(&self, verbose: u8) -> SettingsOverrides {
        SettingsOverrides {
            prefix: self.prefix.clone(),
            march: self.march.clone(),
            jobs: self.jobs,
            verbose: (verbose > 0).then_some(true),
            run_checks: self.no_check.then_some(false),
            update_repos: self.no_update.then_some(false),
            strict: self.strict.then_some(true),
            snapshot: self.no_snapshot.then_some(false),
            compress_docs: self.no_compress_docs.then_some(false),
            ..Default::default()
        }
    }
}

/// Ledger subcommands
#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// List completed packages
    List,

    /// Forget a completed package so the next build redoes it
    Clear {
        /// Ledger key (e.g. gcc-8.2.0)
        key: String,
    },
}

/// Resolve settings for a command
pub fn load_settings(config: Option<&Path>, cli: SettingsOverrides) -> Result<Settings> {
    Settings::load(config, cli).with_context(|| "Failed to load settings")
}

impl Commands {
    /// Execute the command
    pub async fn run(self, config: Option<&Path>, verbose: u8) -> Result<()> {
        match self {
            Self::Build(args) => {
                let settings = load_settings(config, args.overrides(verbose))?;
                build::execute(&settings, args.only).await
            }
            Self::Fetch { only } => {
                let settings = load_settings(config, SettingsOverrides::default())?;
                fetch::execute(&settings, only).await
            }
            Self::List => {
                let settings = load_settings(config, SettingsOverrides::default())?;
                list::execute(&settings)
            }
            Self::Summary => {
                let settings = load_settings(config, SettingsOverrides::default())?;
                summary::execute(&settings)
            }
            Self::Ledger { command } => {
                let settings = load_settings(config, SettingsOverrides::default())?;
                match command {
                    LedgerCommands::List => ledger::execute_list(&settings),
                    LedgerCommands::Clear { key } => ledger::execute_clear(&settings, &key),
                }
            }
        }
    }
}
