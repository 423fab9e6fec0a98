//! Infrastructure layer
//!
//! Handles all I/O operations: network, filesystem, and external processes.

pub mod dirs;
pub mod download;
pub mod git;
pub mod privilege;
pub mod process;
pub mod unpack;
