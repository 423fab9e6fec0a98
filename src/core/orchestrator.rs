//! Chain orchestration
//!
//! Walks the package list in order. Each entry is resolved to an archive,
//! checked against the ledger, unpacked, dispatched to its routine and
//! recorded. Packages never overlap; the only concurrent work is the sudo
//! keepalive and the draining of tool output.

use std::path::Path;
use std::time::Duration;

use crate::config::defaults;
use crate::core::build_env::BuildEnvironment;
use crate::core::dispatch::dispatch;
use crate::core::ledger::Ledger;
use crate::core::package::{PackageEntry, PackageKind, Role};
use crate::core::recipe::RecipeSource;
use crate::core::recorder::{RecordOutcome, Recorder};
use crate::core::resolver::{ArchiveResolver, ResolvedArchive};
use crate::core::routine::{BuildRoutine, NoopObserver, PhaseObserver, RoutineReport};
use crate::core::settings::Settings;
use crate::core::summary::{scan_logs, FailureLine};
use crate::core::tree_state::TreeState;
use crate::core::version::ledger_key;
use crate::error::{BuildError, ChainbuildError};
use crate::infra::download::ProgressCallback;
use crate::infra::git::InstallTreeRepo;
use crate::infra::privilege::{ensure_owned_dir, nearest_existing_ancestor, needs_elevation, SudoKeepalive};
use crate::infra::process::{Invocation, ToolRunner};
use crate::infra::unpack::unpack;

/// Why a package was not built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Key already in the ledger
    AlreadyBuilt,
    /// Entry is only kept in the source cache
    FetchOnly,
}

/// A package that went through its routine and was recorded
#[derive(Debug, Clone)]
pub struct PackageReport {
    /// Routine record
    pub routine: RoutineReport,
    /// What the recorder wrote
    pub record: RecordOutcome,
}

/// Result of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Packages built and recorded, in order
    pub built: Vec<PackageReport>,
    /// Packages skipped, by canonical name
    pub skipped: Vec<(String, SkipReason)>,
    /// Archives resolved without a build (fetch mode, components)
    pub fetched: Vec<ResolvedArchive>,
    /// Entries whose retrieval failed
    pub failed: Vec<(String, String)>,
    /// Non-zero failure lines found in the phase logs
    pub failures: Vec<FailureLine>,
}

/// Progress callbacks for a run
pub trait RunObserver: PhaseObserver {
    /// Processing of an entry begins
    fn package_started(&self, _label: &str) {}

    /// Callback receiving download progress for an entry
    fn download_progress(&self, _label: &str) -> Option<ProgressCallback> {
        None
    }

    /// Entry was resolved but not built
    fn package_skipped(&self, _name: &str, _reason: SkipReason) {}

    /// Retrieval of an entry failed; the run continues
    fn package_failed(&self, _label: &str, _error: &ChainbuildError) {}

    /// Package was built and recorded
    fn package_completed(&self, _report: &PackageReport) {}
}

impl RunObserver for NoopObserver {}

/// Drives the package list through resolution, build and recording
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    packages: Vec<PackageEntry>,
    recipes: &'a dyn RecipeSource,
    resolver: ArchiveResolver,
    only: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator over `packages`
    pub fn new(settings: &'a Settings, packages: Vec<PackageEntry>, recipes: &'a dyn RecipeSource) -> Self {
        Self {
            settings,
            packages,
            recipes,
            resolver: ArchiveResolver::new(settings),
            only: Vec::new(),
        }
    }

    /// Replace the archive resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: ArchiveResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Restrict the run to packages matching `names` (token or canonical label)
    #[must_use]
    pub fn with_only(mut self, names: Vec<String>) -> Self {
        self.only = names;
        self
    }

    fn selected(&self, entry: &PackageEntry) -> bool {
        if self.only.is_empty() {
            return true;
        }
        let kind = match entry.role {
            Role::Build(kind) | Role::Component { of: kind } => kind,
            Role::FetchOnly => return false,
        };
        let label = entry.label();
        self.only
            .iter()
            .any(|name| name == kind.token() || *name == label || name == ledger_key(&label))
    }

    fn runner(&self) -> ToolRunner {
        let env = BuildEnvironment::from_settings(self.settings);
        ToolRunner::new(env.to_env_map())
            .with_elevation(needs_elevation(&self.settings.prefix))
            .with_echo(self.settings.verbose)
    }

    async fn resolve<O: RunObserver>(
        &self,
        entry: &PackageEntry,
        observer: &O,
        report: &mut RunReport,
    ) -> Result<Option<ResolvedArchive>, ChainbuildError> {
        let label = entry.label();
        observer.package_started(&label);

        match self
            .resolver
            .resolve(&entry.source, observer.download_progress(&label))
            .await
        {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) if !e.is_fatal() => {
                tracing::warn!("Skipping {label}: {e}");
                observer.package_failed(&label, &e);
                report.failed.push((label, e.to_string()));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve every selected entry into the source cache without building
    pub async fn fetch<O: RunObserver>(&self, observer: &O) -> Result<RunReport, ChainbuildError> {
        let mut report = RunReport::default();
        for entry in self.packages.iter().filter(|e| self.selected(e)) {
            if let Some(resolved) = self.resolve(entry, observer, &mut report).await? {
                observer.package_skipped(&resolved.name, SkipReason::FetchOnly);
                report.fetched.push(resolved);
            }
        }
        Ok(report)
    }

    /// Build the chain
    pub async fn run<O: RunObserver>(&self, observer: &O) -> Result<RunReport, ChainbuildError> {
        let settings = self.settings;
        BuildEnvironment::from_settings(settings)
            .validate()
            .map_err(|e| BuildError::Prefix {
                path: settings.prefix.clone(),
                error: e.to_string(),
            })?;

        let runner = self.runner();
        let _keepalive = if runner.is_elevating() {
            tracing::info!("{} is not writable, installing through sudo", settings.prefix.display());
            Some(SudoKeepalive::start(Duration::from_secs(defaults::SUDO_KEEPALIVE_SECS)).await?)
        } else {
            None
        };

        let snapshot = initialise_install_tree(settings, &runner).await?;
        let mut ledger = Ledger::open(&settings.ledger_path())?;
        for dir in [settings.src_dir(), settings.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| BuildError::Io {
                path: dir.clone(),
                error: e.to_string(),
            })?;
        }

        let routine = BuildRoutine::new(
            &runner,
            settings.policy(),
            settings.run_checks,
            settings.logs_dir(),
            settings.prefix.clone(),
        );
        let recorder = Recorder::new(settings, &runner, snapshot);

        let mut report = RunReport::default();
        let mut components: Vec<ResolvedArchive> = Vec::new();

        for entry in self.packages.iter().filter(|e| self.selected(e)) {
            let Some(resolved) = self.resolve(entry, observer, &mut report).await? else {
                continue;
            };

            let kind = match entry.role {
                Role::FetchOnly => {
                    observer.package_skipped(&resolved.name, SkipReason::FetchOnly);
                    report.skipped.push((resolved.name.clone(), SkipReason::FetchOnly));
                    report.fetched.push(resolved);
                    continue;
                }
                Role::Component { .. } => {
                    report.fetched.push(resolved.clone());
                    components.push(resolved);
                    continue;
                }
                Role::Build(kind) => kind,
            };

            if ledger.has(ledger_key(&resolved.name)) {
                tracing::info!("{} is already built", resolved.name);
                observer.package_skipped(&resolved.name, SkipReason::AlreadyBuilt);
                report.skipped.push((resolved.name.clone(), SkipReason::AlreadyBuilt));
                if kind == PackageKind::Llvm {
                    components.clear();
                }
                continue;
            }

            unpack_fresh(&resolved, &settings.src_dir()).await?;
            if kind == PackageKind::Llvm {
                for component in components.drain(..) {
                    unpack_fresh(&component, &settings.src_dir()).await?;
                }
            }

            let before = TreeState::capture(&settings.prefix);
            let routine_report = dispatch(kind, &resolved.name, settings, self.recipes, &routine, observer).await?;

            let record_log = routine.package_logs(&resolved.name).join("record.log");
            let record = recorder
                .record(&mut ledger, &resolved, &before, &record_log)
                .await?;

            let package = PackageReport {
                routine: routine_report,
                record,
            };
            observer.package_completed(&package);
            report.built.push(package);
        }

        report.failures = scan_logs(&settings.logs_dir());
        Ok(report)
    }
}

/// Extract `archive` into `src_dir`, replacing any earlier tree of the same name
async fn unpack_fresh(archive: &ResolvedArchive, src_dir: &Path) -> Result<(), ChainbuildError> {
    let tree = src_dir.join(&archive.name);
    if tree.exists() {
        tokio::fs::remove_dir_all(&tree)
            .await
            .map_err(|e| BuildError::Io {
                path: tree.clone(),
                error: e.to_string(),
            })?;
    }

    let top = unpack(&archive.path, src_dir).await?;
    if top != archive.name {
        tracing::warn!(
            "{} unpacked to {top}, expected {}",
            archive.path.display(),
            archive.name
        );
    }
    Ok(())
}

/// Prepare the prefix: `lib`, the `lib64 -> lib` link, a user-owned state
/// directory and, when enabled, the snapshot repository
async fn initialise_install_tree(
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<Option<InstallTreeRepo>, ChainbuildError> {
    let prefix = &settings.prefix;
    let prefix_err = |e: &dyn std::fmt::Display| BuildError::Prefix {
        path: prefix.clone(),
        error: e.to_string(),
    };
    let cwd = nearest_existing_ancestor(prefix).unwrap_or_else(|| "/".into());

    let lib = prefix.join("lib");
    if !lib.is_dir() {
        let mkdir = Invocation::new("mkdir", &cwd)
            .arg("-p")
            .arg(lib.display().to_string())
            .elevated();
        runner.run_checked(&mkdir).await.map_err(|e| prefix_err(&e))?;
    }

    let lib64 = prefix.join("lib64");
    if lib64.symlink_metadata().is_err() {
        let link = Invocation::new("ln", prefix)
            .args(["-s", "lib"])
            .arg(lib64.display().to_string())
            .elevated();
        runner.run_checked(&link).await.map_err(|e| prefix_err(&e))?;
    }

    ensure_owned_dir(runner, &settings.state_dir())
        .await
        .map_err(|e| prefix_err(&e))?;

    if !settings.snapshot {
        return Ok(None);
    }

    let repo = InstallTreeRepo::new(prefix.clone(), runner.clone());
    let state = format!("{}/", defaults::STATE_DIR_NAME);
    match repo.init(&[state.as_str()]).await {
        Ok(()) => Ok(Some(repo)),
        Err(e) => {
            tracing::warn!("Install tree snapshots disabled: {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::{PackageContext, Recipe};
    use crate::core::settings::SettingsOverrides;
    use crate::infra::unpack::Compression;
    use crate::test_utils::write_archive;
    use tempfile::TempDir;

    struct ScriptedRecipes;

    impl RecipeSource for ScriptedRecipes {
        fn recipe(&self, ctx: &PackageContext, settings: &Settings) -> Recipe {
            let sh = |script: String| Invocation::shell(script, &ctx.work_dir);
            Recipe {
                configure: vec![sh("echo configuring".to_string())],
                build: vec![sh("echo building".to_string())],
                check: vec![sh("echo '# FAIL: 0'".to_string())],
                install: vec![sh(format!(
                    "mkdir -p '{0}/bin' && touch '{0}/bin/{1}'",
                    settings.prefix.display(),
                    ctx.name
                ))],
                patch_specs: false,
            }
        }
    }

    fn settings(temp: &TempDir) -> Settings {
        Settings::from_overrides(SettingsOverrides {
            sources_dir: Some(temp.path().join("sources")),
            build_dir: Some(temp.path().join("build")),
            prefix: Some(temp.path().join("prefix")),
            snapshot: Some(false),
            compress_docs: Some(false),
            jobs: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    async fn seed(settings: &Settings, file: &str, top: &str) -> String {
        let archive = settings.sources_dir.join(file);
        std::fs::create_dir_all(&settings.sources_dir).unwrap();
        write_archive(
            &archive,
            Compression::Gzip,
            &[(&format!("{top}/configure"), b"#!/bin/sh\n")],
        )
        .await;
        format!("https://mirror.invalid/{file}")
    }

    #[tokio::test]
    async fn test_run_builds_and_skips_on_rerun() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let url = seed(&settings, "zlib-1.2.11.tar.gz", "zlib-1.2.11").await;
        let packages = vec![PackageEntry::url(url)];

        let orchestrator = Orchestrator::new(&settings, packages, &ScriptedRecipes);
        let first = orchestrator.run(&NoopObserver).await.unwrap();

        assert_eq!(first.built.len(), 1);
        assert_eq!(first.built[0].record.entry.key, "zlib-1.2.11");
        assert!(settings.prefix.join("bin/zlib-1.2.11").exists());
        assert!(settings.prefix.join("lib64").symlink_metadata().unwrap().file_type().is_symlink());
        assert!(first.failures.is_empty());

        let second = orchestrator.run(&NoopObserver).await.unwrap();
        assert!(second.built.is_empty());
        assert_eq!(
            second.skipped,
            vec![("zlib-1.2.11".to_string(), SkipReason::AlreadyBuilt)]
        );
    }

    #[tokio::test]
    async fn test_only_filter_limits_the_chain() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let zlib = seed(&settings, "zlib-1.2.11.tar.gz", "zlib-1.2.11").await;
        let xz = seed(&settings, "xz-5.2.4.tar.gz", "xz-5.2.4").await;

        let report = Orchestrator::new(&settings, vec![PackageEntry::url(zlib), PackageEntry::url(xz)], &ScriptedRecipes)
            .with_only(vec!["xz".to_string()])
            .run(&NoopObserver)
            .await
            .unwrap();

        assert_eq!(report.built.len(), 1);
        assert_eq!(report.built[0].routine.name, "xz-5.2.4");
    }

    #[tokio::test]
    async fn test_unreachable_download_skips_package() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let zlib = seed(&settings, "zlib-1.2.11.tar.gz", "zlib-1.2.11").await;
        let packages = vec![
            PackageEntry::url("http://127.0.0.1:9/gmp-6.1.2.tar.xz"),
            PackageEntry::url(zlib),
        ];

        let resolver = ArchiveResolver::new(&settings)
            .with_downloads(crate::infra::download::DownloadManager::with_config(1, 10));
        let report = Orchestrator::new(&settings, packages, &ScriptedRecipes)
            .with_resolver(resolver)
            .run(&NoopObserver)
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "gmp-6.1.2");
        assert_eq!(report.built.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_only_entries_are_not_built() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let guile = seed(&settings, "guile-2.0.14.tar.gz", "guile-2.0.14").await;

        let report = Orchestrator::new(&settings, vec![PackageEntry::fetch_only_url(guile)], &ScriptedRecipes)
            .run(&NoopObserver)
            .await
            .unwrap();

        assert!(report.built.is_empty());
        assert_eq!(
            report.skipped,
            vec![("guile-2.0.14".to_string(), SkipReason::FetchOnly)]
        );
        assert!(!settings.src_dir().join("guile-2.0.14").exists());
    }

    #[tokio::test]
    async fn test_fetch_mode_resolves_without_building() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let zlib = seed(&settings, "zlib-1.2.11.tar.gz", "zlib-1.2.11").await;

        let report = Orchestrator::new(&settings, vec![PackageEntry::url(zlib)], &ScriptedRecipes)
            .fetch(&NoopObserver)
            .await
            .unwrap();

        assert_eq!(report.fetched.len(), 1);
        assert_eq!(report.fetched[0].name, "zlib-1.2.11");
        assert!(!settings.prefix.exists());
    }
}
