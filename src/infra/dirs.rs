//! Platform-specific directory management
//!
//! Provides the default locations of the source cache and the build scratch
//! area. Follows the XDG Base Directory Specification on Linux.
//!
//! Settings may override both; see [`crate::core::settings`].

use std::path::PathBuf;

/// Application name used in directory paths
const APP_NAME: &str = "chainbuild";

/// Subdirectory names
const SOURCES_SUBDIR: &str = "sources";
const BUILD_SUBDIR: &str = "build";

/// Platform-specific directory provider for chainbuild
#[derive(Debug, Clone)]
pub struct ChainbuildDirs {
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl ChainbuildDirs {
    /// Create a new `ChainbuildDirs` instance from platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::platform_cache_dir(),
            data_dir: Self::platform_data_dir(),
        }
    }

    /// Cache directory (`~/.cache/chainbuild` on Linux)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Data directory (`~/.local/share/chainbuild` on Linux)
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default source archive cache
    ///
    /// Persistent: archives are expensive to fetch and never pruned.
    #[must_use]
    pub fn sources_dir(&self) -> PathBuf {
        self.data_dir.join(SOURCES_SUBDIR)
    }

    /// Default build scratch area
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.cache_dir.join(BUILD_SUBDIR)
    }

    fn platform_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".cache").join(APP_NAME))
            })
    }

    fn platform_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".local").join("share").join(APP_NAME))
                    .unwrap_or_else(|| {
                        PathBuf::from(".")
                            .join(".local")
                            .join("share")
                            .join(APP_NAME)
                    })
            })
    }
}

impl Default for ChainbuildDirs {
    fn default() -> Self {
        Self::new()
    }
}
