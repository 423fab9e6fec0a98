//! Build dispatch
//!
//! Maps a package kind to its routine and prepares the tree it runs in.
//! llvm is special: its sibling projects are unpacked next to it and moved
//! into the layout its CMake build expects before anything is configured.

use std::path::{Path, PathBuf};

use crate::core::package::PackageKind;
use crate::core::recipe::{PackageContext, RecipeSource};
use crate::core::routine::{BuildRoutine, PhaseObserver, RoutineReport};
use crate::core::settings::Settings;
use crate::core::version::version_of;
use crate::error::{BuildError, ChainbuildError, DispatchError};

/// Where each llvm sibling lives inside the llvm tree
///
/// `cfe` must move before `clang-tools-extra`, which nests inside it.
pub const LLVM_LAYOUT: [(&str, &str); 6] = [
    ("cfe", "tools/clang"),
    ("lld", "tools/lld"),
    ("clang-tools-extra", "tools/clang/tools/extra"),
    ("compiler-rt", "projects/compiler-rt"),
    ("libcxx", "projects/libcxx"),
    ("libcxxabi", "projects/libcxxabi"),
];

/// Directory a sibling unpacks to (`lld-7.0.0.src`)
pub fn component_dir_name(component: &str, version: &str) -> String {
    format!("{component}-{version}.src")
}

/// Move the llvm siblings from `scratch` into `source_dir`
///
/// Every sibling is checked before anything moves, so a missing one leaves
/// the scratch area untouched.
pub fn relocate_llvm_components(
    name: &str,
    source_dir: &Path,
    scratch: &Path,
) -> Result<(), DispatchError> {
    let version = version_of(name).ok_or_else(|| DispatchError::NoVersion {
        name: name.to_string(),
    })?;

    let moves: Vec<(PathBuf, PathBuf)> = LLVM_LAYOUT
        .iter()
        .map(|(component, target)| {
            (
                scratch.join(component_dir_name(component, version)),
                source_dir.join(target),
            )
        })
        .collect();

    for ((component, _), (from, _)) in LLVM_LAYOUT.iter().zip(&moves) {
        if !from.is_dir() {
            return Err(DispatchError::MissingComponent {
                package: name.to_string(),
                component: (*component).to_string(),
                expected: from.clone(),
            });
        }
    }

    for (from, to) in moves {
        let relocate_err = |e: std::io::Error| DispatchError::Relocate {
            from: from.clone(),
            to: to.clone(),
            error: e.to_string(),
        };

        if to.exists() {
            std::fs::remove_dir_all(&to).map_err(relocate_err)?;
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(relocate_err)?;
        }
        std::fs::rename(&from, &to).map_err(relocate_err)?;
        tracing::debug!("Moved {} to {}", from.display(), to.display());
    }

    Ok(())
}

/// Build context for an unpacked package
///
/// Out-of-tree packages get a fresh object directory under `<build>/obj`.
pub fn prepare_context(
    kind: PackageKind,
    name: &str,
    settings: &Settings,
) -> Result<PackageContext, BuildError> {
    let source_dir = settings.src_dir().join(name);
    let work_dir = if kind.builds_out_of_tree() {
        let obj = settings.obj_dir().join(name);
        let io_err = |e: std::io::Error| BuildError::Io {
            path: obj.clone(),
            error: e.to_string(),
        };
        if obj.exists() {
            std::fs::remove_dir_all(&obj).map_err(io_err)?;
        }
        std::fs::create_dir_all(&obj).map_err(io_err)?;
        obj
    } else {
        source_dir.clone()
    };

    Ok(PackageContext {
        kind,
        name: name.to_string(),
        source_dir,
        work_dir,
    })
}

/// Run the routine for `kind` on the unpacked tree `name`
pub async fn dispatch(
    kind: PackageKind,
    name: &str,
    settings: &Settings,
    recipes: &dyn RecipeSource,
    routine: &BuildRoutine<'_>,
    observer: &dyn PhaseObserver,
) -> Result<RoutineReport, ChainbuildError> {
    if kind == PackageKind::Llvm {
        relocate_llvm_components(name, &settings.src_dir().join(name), &settings.src_dir())?;
    }

    let ctx = prepare_context(kind, name, settings)?;
    let recipe = recipes.recipe(&ctx, settings);
    tracing::info!("Dispatching {name} to the {kind} routine");

    Ok(routine.run(&ctx, &recipe, observer).await?)
}
