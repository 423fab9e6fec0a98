//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! layout of source cache, build area and prefix, fixture archives, and a
//! recipe source whose phases are plain shell scripts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use async_compression::tokio::write::GzipEncoder;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_tar::{Builder, EntryType, Header};

use chainbuild::core::package::PackageEntry;
use chainbuild::core::recipe::{PackageContext, Recipe, RecipeSource};
use chainbuild::core::settings::{Settings, SettingsOverrides};
use chainbuild::infra::process::Invocation;

/// Temporary source cache, build area and install prefix
pub struct TestChain {
    /// Root of all test directories
    pub dir: TempDir,
}

impl TestChain {
    /// Create a new layout in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root path
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn sources(&self) -> PathBuf {
        self.path().join("sources")
    }

    pub fn build(&self) -> PathBuf {
        self.path().join("build")
    }

    pub fn prefix(&self) -> PathBuf {
        self.path().join("prefix")
    }

    /// File every scripted configure step appends to
    pub fn actions_file(&self) -> PathBuf {
        self.path().join("actions")
    }

    /// Number of configure steps run so far
    pub fn action_count(&self) -> usize {
        std::fs::read_to_string(self.actions_file())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// Settings pointing at this layout, adjusted by `tweak`
    pub fn settings(&self, tweak: impl FnOnce(&mut SettingsOverrides)) -> Settings {
        let mut layer = SettingsOverrides {
            sources_dir: Some(self.sources()),
            build_dir: Some(self.build()),
            prefix: Some(self.prefix()),
            jobs: Some(2),
            snapshot: Some(false),
            compress_docs: Some(false),
            ..Default::default()
        };
        tweak(&mut layer);
        Settings::from_overrides(layer).expect("Invalid test settings")
    }

    /// Place `<file>` in the source cache with a single `<top>/configure`
    /// entry and return a URL that resolves to it without any network access
    pub async fn seed_archive(&self, file: &str, top: &str) -> String {
        std::fs::create_dir_all(self.sources()).expect("Failed to create source cache");
        write_tar_gz(
            &self.sources().join(file),
            top,
            &[("configure", b"#!/bin/sh\n".as_slice())],
        )
        .await;
        format!("https://mirror.invalid/{file}")
    }

    /// Package list entry for a seeded archive
    pub async fn seeded_entry(&self, file: &str, top: &str) -> PackageEntry {
        PackageEntry::url(self.seed_archive(file, top).await)
    }

    /// Run the binary against this layout
    pub fn run_cli(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_chainbuild"))
            .current_dir(self.path())
            .env_remove("CHAINBUILD_CONFIG")
            .env_remove("RUST_LOG")
            .env("CHAINBUILD_SOURCES_DIR", self.sources())
            .env("CHAINBUILD_BUILD_DIR", self.build())
            .env("CHAINBUILD_PREFIX", self.prefix())
            .env("CHAINBUILD_SNAPSHOT", "false")
            .args(args)
            .output()
            .expect("Failed to execute chainbuild")
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a `.tar.gz` whose entries live under `top/`
pub async fn write_tar_gz(path: &Path, top: &str, files: &[(&str, &[u8])]) {
    let file = tokio::fs::File::create(path)
        .await
        .expect("Failed to create archive");
    let mut builder = Builder::new(GzipEncoder::new(file));

    let mut dir = Header::new_gnu();
    dir.set_entry_type(EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder
        .append_data(&mut dir, format!("{top}/"), tokio::io::empty())
        .await
        .expect("Failed to append directory");

    for (name, data) in files {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, format!("{top}/{name}"), *data)
            .await
            .expect("Failed to append file");
    }

    let mut encoder = builder.into_inner().await.expect("Failed to finish archive");
    encoder.shutdown().await.expect("Failed to flush archive");
}

/// Shell scripts for each phase
#[derive(Debug, Clone)]
pub struct ScriptedRecipes {
    /// Appended to by every configure step
    pub actions: PathBuf,
    pub build: String,
    pub check: String,
    /// Extra install commands; the default install drops `bin/<name>`
    pub install_extra: String,
}

impl ScriptedRecipes {
    pub fn new(actions: PathBuf) -> Self {
        Self {
            actions,
            build: "echo building".to_string(),
            check: "echo '# PASS: 3'; echo '# FAIL: 0'".to_string(),
            install_extra: String::new(),
        }
    }

    pub fn with_build(mut self, script: &str) -> Self {
        self.build = script.to_string();
        self
    }

    pub fn with_check(mut self, script: &str) -> Self {
        self.check = script.to_string();
        self
    }

    pub fn with_install(mut self, script: &str) -> Self {
        self.install_extra = script.to_string();
        self
    }
}

impl RecipeSource for ScriptedRecipes {
    fn recipe(&self, ctx: &PackageContext, settings: &Settings) -> Recipe {
        let sh = |script: String| Invocation::shell(script, &ctx.work_dir);
        let prefix = settings.prefix.display();
        Recipe {
            configure: vec![sh(format!(
                "echo {} >> '{}'; echo PATH=$PATH; echo PKG_CONFIG_PATH=$PKG_CONFIG_PATH; echo CFLAGS=$CFLAGS",
                ctx.name,
                self.actions.display()
            ))],
            build: vec![sh(self.build.clone())],
            check: vec![sh(self.check.clone())],
            install: vec![sh(format!(
                "mkdir -p '{prefix}/bin' && touch '{prefix}/bin/{}' {}",
                ctx.name,
                if self.install_extra.is_empty() {
                    String::new()
                } else {
                    format!("&& {}", self.install_extra)
                }
            ))],
            patch_specs: false,
        }
    }
}
