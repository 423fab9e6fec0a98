//! chainbuild - sequential toolchain builder
//!
//! Downloads, unpacks, configures, builds, tests and installs a fixed chain
//! of toolchain components into one prefix, recording every completed
//! package in an append-only ledger.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Package list semantics, routines, ledger and orchestration
//! - [`infra`] - Infrastructure layer (network, archives, git, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
