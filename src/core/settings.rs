//! Run settings
//!
//! Settings are resolved once per run from layered sources, later layers
//! winning: built-in defaults, `CHAINBUILD_*` environment variables, the
//! override file (`chainbuild.toml`), and command-line flags. The result is
//! immutable and passed by reference to everything that needs it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::defaults;
use crate::core::routine::FailurePolicy;
use crate::infra::dirs::ChainbuildDirs;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CHAINBUILD_";

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read the override file
    #[error("Failed to read settings file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse the override file
    #[error("Failed to parse settings file '{path}': {error}")]
    ParseError { path: String, error: String },

    /// A value could not be interpreted
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

/// One layer of optional settings
///
/// The override file deserializes straight into this type; environment
/// variables and CLI flags are mapped onto it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsOverrides {
    /// Source archive cache
    pub sources_dir: Option<PathBuf>,
    /// Build scratch area
    pub build_dir: Option<PathBuf>,
    /// Install prefix
    pub prefix: Option<PathBuf>,
    /// Toolchain name
    pub toolchain_name: Option<String>,
    /// Target micro-architecture
    pub march: Option<String>,
    /// Parallel jobs per package
    pub jobs: Option<usize>,
    /// Echo tool output
    pub verbose: Option<bool>,
    /// Run self-test phases
    pub run_checks: Option<bool>,
    /// Pull cached repositories
    pub update_repos: Option<bool>,
    /// Stop on configure/build/install failures
    pub strict: Option<bool>,
    /// Keep a git snapshot of the install tree
    pub snapshot: Option<bool>,
    /// Recompress installed documentation
    pub compress_docs: Option<bool>,
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a boolean (1/0, true/false, yes/no, on/off)".to_string(),
        }),
    }
}

fn parse_jobs(key: &str, value: &str) -> Result<usize, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a positive integer".to_string(),
    })
}

impl SettingsOverrides {
    /// Read the layer from `CHAINBUILD_*` variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_env_vars(std::env::vars())
    }

    /// Read the layer from an explicit variable set
    ///
    /// Unrelated variables are ignored.
    pub fn from_env_vars<I>(vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();

        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "SOURCES_DIR" => layer.sources_dir = Some(PathBuf::from(value)),
                "BUILD_DIR" => layer.build_dir = Some(PathBuf::from(value)),
                "PREFIX" => layer.prefix = Some(PathBuf::from(value)),
                "TOOLCHAIN_NAME" => layer.toolchain_name = Some(value),
                "MARCH" => layer.march = Some(value),
                "JOBS" => layer.jobs = Some(parse_jobs(&key, &value)?),
                "VERBOSE" => layer.verbose = Some(parse_bool(&key, &value)?),
                "CHECK" => layer.run_checks = Some(parse_bool(&key, &value)?),
                "UPDATE_REPOS" => layer.update_repos = Some(parse_bool(&key, &value)?),
                "STRICT" => layer.strict = Some(parse_bool(&key, &value)?),
                "SNAPSHOT" => layer.snapshot = Some(parse_bool(&key, &value)?),
                "COMPRESS_DOCS" => layer.compress_docs = Some(parse_bool(&key, &value)?),
                _ => {}
            }
        }

        Ok(layer)
    }

    /// Load the layer from an override file
    ///
    /// A missing file yields an empty layer.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            sources_dir: other.sources_dir.or(self.sources_dir),
            build_dir: other.build_dir.or(self.build_dir),
            prefix: other.prefix.or(self.prefix),
            toolchain_name: other.toolchain_name.or(self.toolchain_name),
            march: other.march.or(self.march),
            jobs: other.jobs.or(self.jobs),
            verbose: other.verbose.or(self.verbose),
            run_checks: other.run_checks.or(self.run_checks),
            update_repos: other.update_repos.or(self.update_repos),
            strict: other.strict.or(self.strict),
            snapshot: other.snapshot.or(self.snapshot),
            compress_docs: other.compress_docs.or(self.compress_docs),
        }
    }
}

/// Resolved settings for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Source archive cache
    pub sources_dir: PathBuf,
    /// Build scratch area
    pub build_dir: PathBuf,
    /// Install prefix
    pub prefix: PathBuf,
    /// Toolchain name
    pub toolchain_name: String,
    /// Target micro-architecture
    pub march: String,
    /// Parallel jobs per package
    pub jobs: usize,
    /// Echo tool output
    pub verbose: bool,
    /// Run self-test phases
    pub run_checks: bool,
    /// Pull cached repositories
    pub update_repos: bool,
    /// Stop on configure/build/install failures
    pub strict: bool,
    /// Keep a git snapshot of the install tree
    pub snapshot: bool,
    /// Recompress installed documentation
    pub compress_docs: bool,
}

impl Settings {
    /// Apply defaults to a merged layer and validate the result
    pub fn from_overrides(layer: SettingsOverrides) -> Result<Self, SettingsError> {
        let dirs = ChainbuildDirs::new();
        let toolchain_name = layer
            .toolchain_name
            .unwrap_or_else(|| defaults::DEFAULT_TOOLCHAIN_NAME.to_string());

        if toolchain_name.trim().is_empty() || toolchain_name.contains('/') {
            return Err(SettingsError::InvalidValue {
                key: "toolchain_name".to_string(),
                value: toolchain_name,
                expected: "a non-empty name without '/'".to_string(),
            });
        }

        let prefix = layer
            .prefix
            .unwrap_or_else(|| Path::new(defaults::DEFAULT_PREFIX_PARENT).join(&toolchain_name));
        if !prefix.is_absolute() {
            return Err(SettingsError::InvalidValue {
                key: "prefix".to_string(),
                value: prefix.display().to_string(),
                expected: "an absolute path".to_string(),
            });
        }

        let jobs = layer.jobs.unwrap_or_else(num_cpus::get);
        if jobs == 0 {
            return Err(SettingsError::InvalidValue {
                key: "jobs".to_string(),
                value: "0".to_string(),
                expected: "a positive integer".to_string(),
            });
        }

        Ok(Self {
            sources_dir: layer.sources_dir.unwrap_or_else(|| dirs.sources_dir()),
            build_dir: layer.build_dir.unwrap_or_else(|| dirs.build_dir()),
            prefix,
            toolchain_name,
            march: layer
                .march
                .unwrap_or_else(|| defaults::DEFAULT_MARCH.to_string()),
            jobs,
            verbose: layer.verbose.unwrap_or(false),
            run_checks: layer.run_checks.unwrap_or(true),
            update_repos: layer.update_repos.unwrap_or(true),
            strict: layer.strict.unwrap_or(false),
            snapshot: layer
                .snapshot
                .unwrap_or_else(|| which::which("git").is_ok()),
            compress_docs: layer.compress_docs.unwrap_or(true),
        })
    }

    /// Resolve settings from the environment, the override file and CLI flags
    ///
    /// An explicitly named override file must exist; the implicit
    /// `chainbuild.toml` in the working directory is optional.
    pub fn load(config_path: Option<&Path>, cli: SettingsOverrides) -> Result<Self, SettingsError> {
        let env = SettingsOverrides::from_env()?;

        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(SettingsError::ReadError {
                    path: path.display().to_string(),
                    error: "file not found".to_string(),
                })
            }
            Some(path) => SettingsOverrides::load_from_path(path)?,
            None => SettingsOverrides::load_from_path(Path::new(defaults::OVERRIDE_FILE_NAME))?,
        };

        tracing::debug!("Settings layers: env={env:?} file={file:?} cli={cli:?}");
        Self::from_overrides(env.merge(file).merge(cli))
    }

    /// Failure policy selected by the `strict` switch
    pub fn policy(&self) -> FailurePolicy {
        if self.strict {
            FailurePolicy::Strict
        } else {
            FailurePolicy::BestEffort
        }
    }

    /// Orchestrator state under the prefix
    pub fn state_dir(&self) -> PathBuf {
        self.prefix.join(defaults::STATE_DIR_NAME)
    }

    /// Completion ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join(defaults::LEDGER_FILE_NAME)
    }

    /// Changed-file manifests
    pub fn manifests_dir(&self) -> PathBuf {
        self.state_dir().join(defaults::MANIFESTS_DIR_NAME)
    }

    /// Per-package phase logs
    pub fn logs_dir(&self) -> PathBuf {
        self.build_dir.join("logs")
    }

    /// Unpacked sources
    pub fn src_dir(&self) -> PathBuf {
        self.build_dir.join("src")
    }

    /// Out-of-tree object directories
    pub fn obj_dir(&self) -> PathBuf {
        self.build_dir.join("obj")
    }

    /// Clones of git-sourced packages
    pub fn repos_dir(&self) -> PathBuf {
        self.sources_dir.join("git")
    }
}
