//! Build environment setup
//!
//! The environment every build step runs with: the install prefix on `PATH`
//! and `PKG_CONFIG_PATH` so later packages find earlier ones, tuning flags,
//! and the job count. It is computed once and handed to each command
//! explicitly; the orchestrator's own environment is never modified.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::settings::Settings;

/// Build environment for the chain
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    /// Install prefix shared by all packages
    pub prefix: PathBuf,
    /// Target micro-architecture for `-march`/`-mtune`
    pub march: String,
    /// Number of parallel jobs
    pub jobs: usize,
    /// `PATH` inherited from the caller
    pub inherited_path: Option<String>,
    /// `PKG_CONFIG_PATH` inherited from the caller
    pub inherited_pkg_config_path: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl BuildEnvironment {
    /// Create an environment with no inherited search paths
    pub fn new(prefix: PathBuf, march: &str, jobs: usize) -> Self {
        Self {
            prefix,
            march: march.to_string(),
            jobs,
            inherited_path: None,
            inherited_pkg_config_path: None,
        }
    }

    /// Create the environment for a run, inheriting the caller's search paths
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.prefix.clone(), &settings.march, settings.jobs).with_inherited(
            std::env::var("PATH").ok(),
            std::env::var("PKG_CONFIG_PATH").ok(),
        )
    }

    /// Set the inherited `PATH` and `PKG_CONFIG_PATH`
    #[must_use]
    pub fn with_inherited(mut self, path: Option<String>, pkg_config_path: Option<String>) -> Self {
        self.inherited_path = non_empty(path);
        self.inherited_pkg_config_path = non_empty(pkg_config_path);
        self
    }

    /// `<prefix>/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// `<prefix>/lib`
    pub fn lib_dir(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    /// Compiler tuning flags
    pub fn cflags(&self) -> String {
        format!("-O2 -march={} -mtune={}", self.march, self.march)
    }

    fn search_path(first: &[PathBuf], inherited: Option<&String>) -> String {
        first
            .iter()
            .map(|p| p.display().to_string())
            .chain(inherited.cloned())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert(
            "PATH".to_string(),
            Self::search_path(&[self.bin_dir()], self.inherited_path.as_ref()),
        );
        env.insert(
            "PKG_CONFIG_PATH".to_string(),
            Self::search_path(
                &[
                    self.lib_dir().join("pkgconfig"),
                    self.prefix.join("share").join("pkgconfig"),
                ],
                self.inherited_pkg_config_path.as_ref(),
            ),
        );

        let cflags = self.cflags();
        env.insert("CFLAGS".to_string(), cflags.clone());
        env.insert("CXXFLAGS".to_string(), cflags);
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.jobs));

        env
    }

    /// Check that the environment can drive a build
    pub fn validate(&self) -> Result<(), BuildEnvError> {
        if !self.prefix.is_absolute() {
            return Err(BuildEnvError::InvalidValue {
                variable: "PREFIX".to_string(),
                reason: "must be an absolute path".to_string(),
            });
        }
        if self.march.is_empty() {
            return Err(BuildEnvError::MissingVariable("MARCH".to_string()));
        }
        if self.jobs == 0 {
            return Err(BuildEnvError::InvalidValue {
                variable: "JOBS".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Build environment errors
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEnvError {
    /// Required variable is missing
    MissingVariable(String),
    /// Variable has invalid value
    InvalidValue { variable: String, reason: String },
}

impl std::fmt::Display for BuildEnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVariable(var) => write!(f, "Missing required environment variable: {var}"),
            Self::InvalidValue { variable, reason } => {
                write!(f, "Invalid value for {variable}: {reason}")
            }
        }
    }
}

impl std::error::Error for BuildEnvError {}
