//! Configuration and constants
//!
//! - [`defaults`] - Default values
//! - [`urls`] - Upstream source locations
//! - [`packages`] - The fixed package list

pub mod defaults;
pub mod packages;
pub mod urls;
