//! Integration tests for the build loop
//!
//! Each test seeds the source cache with fixture archives and drives the
//! orchestrator with shell-scripted recipes, so no compiler is needed.

mod common;

use common::{write_tar_gz, ScriptedRecipes, TestChain};

use chainbuild::config::packages::LLVM_COMPONENTS;
use chainbuild::core::ledger::Ledger;
use chainbuild::core::orchestrator::{Orchestrator, SkipReason};
use chainbuild::core::package::{PackageEntry, PackageKind};
use chainbuild::core::recipe::Phase;
use chainbuild::core::routine::{NoopObserver, PhaseOutcome, RoutineState};
use chainbuild::error::{BuildError, ChainbuildError, DispatchError};

#[tokio::test]
async fn test_zlib_chain_builds_once() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file());
    let packages = vec![chain.seeded_entry("zlib-1.2.11.tar.gz", "zlib-1.2.11").await];

    let orchestrator = Orchestrator::new(&settings, packages, &recipes);

    let first = orchestrator.run(&NoopObserver).await.unwrap();
    assert_eq!(first.built.len(), 1);
    assert_eq!(first.built[0].routine.state, RoutineState::Completed);
    assert_eq!(chain.action_count(), 1);

    let ledger = Ledger::open(&settings.ledger_path()).unwrap();
    assert_eq!(ledger.entries().len(), 1);
    assert_eq!(ledger.entries()[0].key, "zlib-1.2.11");
    assert_eq!(ledger.entries()[0].files_changed, 1);

    let second = orchestrator.run(&NoopObserver).await.unwrap();
    assert!(second.built.is_empty());
    assert_eq!(
        second.skipped,
        vec![("zlib-1.2.11".to_string(), SkipReason::AlreadyBuilt)]
    );
    assert_eq!(chain.action_count(), 1, "second run must not configure again");
}

#[tokio::test]
async fn test_every_phase_sees_prefix_search_paths() {
    let chain = TestChain::new();
    let settings = chain.settings(|layer| layer.march = Some("x86-64".to_string()));
    let recipes = ScriptedRecipes::new(chain.actions_file());
    let packages = vec![chain.seeded_entry("xz-5.2.4.tar.gz", "xz-5.2.4").await];

    Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    let log = std::fs::read_to_string(settings.logs_dir().join("xz-5.2.4/configure.log")).unwrap();
    let prefix = settings.prefix.display().to_string();
    assert!(log.contains(&format!("PATH={prefix}/bin:")));
    assert!(log.contains(&format!("PKG_CONFIG_PATH={prefix}/lib/pkgconfig:{prefix}/share/pkgconfig")));
    assert!(log.contains("CFLAGS=-O2 -march=x86-64 -mtune=x86-64"));
}

#[tokio::test]
async fn test_failing_check_still_records_and_is_summarised() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file())
        .with_check("echo 'PASS: 41'; echo '# FAIL:  1'; exit 2");
    let packages = vec![chain.seeded_entry("gmp-6.1.2.tar.gz", "gmp-6.1.2").await];

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    let routine = &report.built[0].routine;
    let check = routine.phases.iter().find(|p| p.phase == Phase::Check).unwrap();
    assert_eq!(check.outcome, PhaseOutcome::SoftFailed { exit_code: Some(2) });
    assert_eq!(routine.state, RoutineState::Completed);
    assert!(Ledger::open(&settings.ledger_path()).unwrap().has("gmp-6.1.2"));

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].text, "# FAIL:  1");
    assert_eq!(report.failures[0].count, 1);
    assert!(report.failures[0].log.ends_with("gmp-6.1.2/check.log"));
}

#[tokio::test]
async fn test_checks_can_be_disabled() {
    let chain = TestChain::new();
    let settings = chain.settings(|layer| layer.run_checks = Some(false));
    let recipes = ScriptedRecipes::new(chain.actions_file()).with_check("exit 1");
    let packages = vec![chain.seeded_entry("mpc-1.1.0.tar.gz", "mpc-1.1.0").await];

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    let phases: Vec<Phase> = report.built[0].routine.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases, vec![Phase::Configure, Phase::Build, Phase::Install]);
}

#[tokio::test]
async fn test_best_effort_continues_past_build_failure() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file()).with_build("exit 3");
    let packages = vec![
        chain.seeded_entry("mpfr-4.0.1.tar.gz", "mpfr-4.0.1").await,
        chain.seeded_entry("isl-0.20.tar.gz", "isl-0.20").await,
    ];

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    assert_eq!(report.built.len(), 2);
    assert_eq!(report.built[0].routine.soft_failures().count(), 1);
}

#[tokio::test]
async fn test_strict_build_failure_stops_without_ledger_entry() {
    let chain = TestChain::new();
    let settings = chain.settings(|layer| layer.strict = Some(true));
    let recipes = ScriptedRecipes::new(chain.actions_file()).with_build("exit 3");
    let packages = vec![
        chain.seeded_entry("mpfr-4.0.1.tar.gz", "mpfr-4.0.1").await,
        chain.seeded_entry("isl-0.20.tar.gz", "isl-0.20").await,
    ];

    let err = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap_err();

    match err {
        ChainbuildError::Build(BuildError::PhaseFailed { package, phase, .. }) => {
            assert_eq!(package, "mpfr-4.0.1");
            assert_eq!(phase, "build");
        }
        other => panic!("Expected PhaseFailed, got {other:?}"),
    }
    assert!(Ledger::open(&settings.ledger_path()).unwrap().entries().is_empty());
    assert_eq!(chain.action_count(), 1, "isl must not start");
}

#[tokio::test]
async fn test_strict_keeps_check_failures_soft() {
    let chain = TestChain::new();
    let settings = chain.settings(|layer| layer.strict = Some(true));
    let recipes = ScriptedRecipes::new(chain.actions_file()).with_check("exit 1");
    let packages = vec![chain.seeded_entry("autogen-5.18.16.tar.gz", "autogen-5.18.16").await];

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    assert_eq!(report.built.len(), 1);
}

async fn seed_llvm(chain: &TestChain, skip: Option<&str>) -> Vec<PackageEntry> {
    let mut packages = Vec::new();
    for component in LLVM_COMPONENTS {
        if Some(component) == skip {
            continue;
        }
        let file = format!("{component}-7.0.0.src.tar.gz");
        let top = format!("{component}-7.0.0.src");
        let url = chain.seed_archive(&file, &top).await;
        packages.push(PackageEntry::component(url, PackageKind::Llvm));
    }
    packages.push(chain.seeded_entry("llvm-7.0.0.src.tar.gz", "llvm-7.0.0.src").await);
    packages
}

#[tokio::test]
async fn test_llvm_siblings_are_moved_into_place() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file()).with_install(&format!(
        "test -f '{}/llvm-7.0.0.src/tools/clang/tools/extra/configure'",
        settings.src_dir().display()
    ));
    let packages = seed_llvm(&chain, None).await;

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    assert_eq!(report.built.len(), 1);
    assert!(report.built[0].routine.soft_failures().next().is_none());
    assert_eq!(report.built[0].record.entry.key, "llvm-7.0.0");

    let tree = settings.src_dir().join("llvm-7.0.0.src");
    for target in ["tools/clang", "tools/lld", "projects/compiler-rt", "projects/libcxx", "projects/libcxxabi"] {
        assert!(tree.join(target).join("configure").exists(), "{target}");
    }
    assert!(settings.obj_dir().join("llvm-7.0.0.src").is_dir());
}

#[tokio::test]
async fn test_llvm_missing_sibling_is_fatal() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file());
    let packages = seed_llvm(&chain, Some("compiler-rt")).await;

    let err = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    match err {
        ChainbuildError::Dispatch(DispatchError::MissingComponent { component, .. }) => {
            assert_eq!(component, "compiler-rt");
        }
        other => panic!("Expected MissingComponent, got {other:?}"),
    }
    assert_eq!(chain.action_count(), 0);
}

#[tokio::test]
async fn test_unknown_archive_extension_halts_the_run() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file());
    let packages = vec![
        PackageEntry::url("https://mirror.invalid/zlib-1.2.11.zip"),
        chain.seeded_entry("xz-5.2.4.tar.gz", "xz-5.2.4").await,
    ];

    let err = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, ChainbuildError::Unpack(_)));
    assert_eq!(chain.action_count(), 0);
}

#[tokio::test]
async fn test_cleared_package_is_rebuilt() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file());
    let packages = vec![chain.seeded_entry("zlib-1.2.11.tar.gz", "zlib-1.2.11").await];
    let orchestrator = Orchestrator::new(&settings, packages, &recipes);

    orchestrator.run(&NoopObserver).await.unwrap();
    Ledger::open(&settings.ledger_path())
        .unwrap()
        .clear("zlib-1.2.11")
        .unwrap();
    let again = orchestrator.run(&NoopObserver).await.unwrap();

    assert_eq!(again.built.len(), 1);
    assert_eq!(chain.action_count(), 2);
}

#[tokio::test]
async fn test_manifest_lists_installed_files() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    let recipes = ScriptedRecipes::new(chain.actions_file())
        .with_install(&format!("mkdir -p '{0}/include' && echo h > '{0}/include/zlib.h'", settings.prefix.display()));
    let packages = vec![chain.seeded_entry("zlib-1.2.11.tar.gz", "zlib-1.2.11").await];

    let report = Orchestrator::new(&settings, packages, &recipes)
        .run(&NoopObserver)
        .await
        .unwrap();

    let manifest = std::fs::read_to_string(&report.built[0].record.manifest).unwrap();
    assert_eq!(manifest, "A bin/zlib-1.2.11\nA include/zlib.h\n");
}

#[tokio::test]
async fn test_archive_with_trailing_entries_uses_first_root() {
    let chain = TestChain::new();
    let settings = chain.settings(|_| {});
    std::fs::create_dir_all(chain.sources()).unwrap();
    write_tar_gz(
        &chain.sources().join("isl-0.20.tar.gz"),
        "isl-0.20",
        &[("configure", b"#!/bin/sh\n".as_slice()), ("README", b"isl".as_slice())],
    )
    .await;
    let recipes = ScriptedRecipes::new(chain.actions_file());

    let report = Orchestrator::new(
        &settings,
        vec![PackageEntry::url("https://mirror.invalid/isl-0.20.tar.gz")],
        &recipes,
    )
    .run(&NoopObserver)
    .await
    .unwrap();

    assert_eq!(report.built[0].record.entry.name, "isl-0.20");
    assert!(settings.src_dir().join("isl-0.20/README").exists());
}
