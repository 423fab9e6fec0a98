//! Core business logic module
//!
//! Package semantics, build routines, the ledger and the orchestration loop.
//! Process spawning, downloads, archives and git live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`package`] - Package kinds and list entries
//! - [`version`] - Name-version parsing and ledger keys
//! - [`settings`] - Layered run settings
//! - [`build_env`] - Environment passed to every build step
//! - [`resolver`] - Package reference to local archive
//! - [`ledger`] - Append-only completion ledger
//! - [`recipe`] - Commands of each phase per package
//! - [`routine`] - Phase state machine and failure policy
//! - [`specs`] - gcc specs rpath embedding
//! - [`dispatch`] - Routine selection and llvm sibling relocation
//! - [`tree_state`] - Install tree snapshots and manifests
//! - [`compress`] - Documentation recompression
//! - [`recorder`] - Post-install recording
//! - [`summary`] - End-of-run failure summary
//! - [`orchestrator`] - The package loop

pub mod build_env;
pub mod compress;
pub mod dispatch;
pub mod ledger;
pub mod orchestrator;
pub mod package;
pub mod recipe;
pub mod recorder;
pub mod resolver;
pub mod routine;
pub mod settings;
pub mod specs;
pub mod summary;
pub mod tree_state;
pub mod version;
