//! Package recipes
//!
//! A recipe is data: the commands each phase runs. [`StandardRecipes`] knows
//! how every package of the chain is configured and installed; tests supply
//! their own [`RecipeSource`] with scripted commands.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::package::PackageKind;
use crate::core::settings::Settings;
use crate::infra::process::Invocation;

/// One step of a build routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Configure,
    Build,
    Check,
    Install,
}

impl Phase {
    /// Phases in execution order
    pub const ALL: [Self; 4] = [Self::Configure, Self::Build, Self::Check, Self::Install];

    /// Lowercase name, also the log file stem
    pub fn name(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Check => "check",
            Self::Install => "install",
        }
    }

    /// Log file for this phase under a package's log directory
    pub fn log_path(self, package_logs: &Path) -> PathBuf {
        package_logs.join(format!("{}.log", self.name()))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a package is being built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContext {
    /// Routine selected for the package
    pub kind: PackageKind,
    /// Canonical name (`gcc-8.2.0`)
    pub name: String,
    /// Unpacked source tree
    pub source_dir: PathBuf,
    /// Directory the commands run in: the source tree or a separate object directory
    pub work_dir: PathBuf,
}

/// Commands for each phase of one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipe {
    pub configure: Vec<Invocation>,
    pub build: Vec<Invocation>,
    pub check: Vec<Invocation>,
    pub install: Vec<Invocation>,
    /// Embed the prefix rpath into the installed compiler's specs
    pub patch_specs: bool,
}

impl Recipe {
    /// Steps of `phase`
    pub fn steps(&self, phase: Phase) -> &[Invocation] {
        match phase {
            Phase::Configure => &self.configure,
            Phase::Build => &self.build,
            Phase::Check => &self.check,
            Phase::Install => &self.install,
        }
    }
}

/// Provides the recipe for a package
pub trait RecipeSource: Send + Sync {
    /// Recipe for the package described by `ctx`
    fn recipe(&self, ctx: &PackageContext, settings: &Settings) -> Recipe;
}

/// Recipes for the packages of the chain
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRecipes;

fn prefix_flag(settings: &Settings) -> String {
    format!("--prefix={}", settings.prefix.display())
}

/// `--with-gmp=<prefix>` and friends for gcc and binutils
fn math_library_flags(settings: &Settings) -> Vec<String> {
    let prefix = settings.prefix.display();
    ["gmp", "mpfr", "mpc", "isl"]
        .iter()
        .map(|lib| format!("--with-{lib}={prefix}"))
        .chain([
            "--with-system-zlib".to_string(),
            "--disable-multilib".to_string(),
            format!("--with-pkgversion={}", settings.toolchain_name),
        ])
        .collect()
}

fn configure_flags(kind: PackageKind, settings: &Settings) -> Vec<String> {
    let prefix = settings.prefix.display();
    let mut flags = vec![prefix_flag(settings)];

    match kind {
        PackageKind::Gmp => flags.push("--enable-cxx".to_string()),
        PackageKind::Mpfr => flags.push(format!("--with-gmp={prefix}")),
        PackageKind::Mpc => {
            flags.push(format!("--with-gmp={prefix}"));
            flags.push(format!("--with-mpfr={prefix}"));
        }
        PackageKind::Isl => flags.push(format!("--with-gmp-prefix={prefix}")),
        PackageKind::Binutils => {
            flags.extend(math_library_flags(settings));
            flags.extend(["--enable-gold", "--enable-plugins", "--enable-lto"].map(String::from));
        }
        PackageKind::Gcc => {
            flags.extend(math_library_flags(settings));
            flags.extend(
                [
                    "--enable-languages=c,c++",
                    "--enable-checking=release",
                    "--enable-lto",
                    "--enable-threads=posix",
                ]
                .map(String::from),
            );
        }
        PackageKind::Vim => {
            flags.extend(["--with-features=huge", "--enable-multibyte"].map(String::from));
        }
        PackageKind::Zlib
        | PackageKind::Xz
        | PackageKind::Guile
        | PackageKind::Autogen
        | PackageKind::Llvm => {}
    }

    flags
}

fn make(ctx: &PackageContext, settings: &Settings, targets: &[&str]) -> Invocation {
    Invocation::new("make", &ctx.work_dir)
        .arg(format!("-j{}", settings.jobs))
        .args(targets.iter().copied())
}

fn autotools_recipe(ctx: &PackageContext, settings: &Settings) -> Recipe {
    let configure = Invocation::new(
        ctx.source_dir.join("configure").display().to_string(),
        &ctx.work_dir,
    )
    .args(configure_flags(ctx.kind, settings));

    let check_target = match ctx.kind {
        PackageKind::Vim => "test",
        _ => "check",
    };

    Recipe {
        configure: vec![configure],
        build: vec![make(ctx, settings, &[])],
        check: vec![make(ctx, settings, &["-k", check_target])],
        install: vec![make(ctx, settings, &["install"]).elevated()],
        patch_specs: ctx.kind == PackageKind::Gcc,
    }
}

fn llvm_recipe(ctx: &PackageContext, settings: &Settings) -> Recipe {
    let prefix = settings.prefix.display();
    let configure = Invocation::new("cmake", &ctx.work_dir)
        .args(["-G", "Ninja"])
        .arg(ctx.source_dir.display().to_string())
        .args([
            format!("-DCMAKE_INSTALL_PREFIX={prefix}"),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
            format!("-DCMAKE_C_COMPILER={prefix}/bin/gcc"),
            format!("-DCMAKE_CXX_COMPILER={prefix}/bin/g++"),
            format!("-DGCC_INSTALL_PREFIX={prefix}"),
            format!("-DCMAKE_INSTALL_RPATH={prefix}/lib64"),
            "-DLLVM_ENABLE_RTTI=ON".to_string(),
            "-DLLVM_INSTALL_UTILS=ON".to_string(),
            format!("-DCLANG_VENDOR={}", settings.toolchain_name),
        ]);

    let ninja = |target: Option<&str>| {
        Invocation::new("ninja", &ctx.work_dir)
            .arg(format!("-j{}", settings.jobs))
            .args(target)
    };

    Recipe {
        configure: vec![configure],
        build: vec![ninja(None)],
        check: vec![ninja(Some("check-all"))],
        install: vec![ninja(Some("install")).elevated()],
        patch_specs: false,
    }
}

impl RecipeSource for StandardRecipes {
    fn recipe(&self, ctx: &PackageContext, settings: &Settings) -> Recipe {
        match ctx.kind {
            PackageKind::Llvm => llvm_recipe(ctx, settings),
            _ => autotools_recipe(ctx, settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::SettingsOverrides;

    fn settings() -> Settings {
        Settings::from_overrides(SettingsOverrides {
            prefix: Some(PathBuf::from("/opt/tc")),
            toolchain_name: Some("tc".to_string()),
            jobs: Some(8),
            ..Default::default()
        })
        .unwrap()
    }

    fn ctx(kind: PackageKind, name: &str) -> PackageContext {
        let source_dir = PathBuf::from("/scratch/src").join(name);
        let work_dir = if kind.builds_out_of_tree() {
            PathBuf::from("/scratch/obj").join(name)
        } else {
            source_dir.clone()
        };
        PackageContext {
            kind,
            name: name.to_string(),
            source_dir,
            work_dir,
        }
    }

    #[test]
    fn test_zlib_recipe() {
        let recipe = StandardRecipes.recipe(&ctx(PackageKind::Zlib, "zlib-1.2.11"), &settings());

        assert_eq!(
            recipe.configure[0].command_line(),
            "/scratch/src/zlib-1.2.11/configure --prefix=/opt/tc"
        );
        assert_eq!(recipe.build[0].command_line(), "make -j8");
        assert_eq!(recipe.check[0].command_line(), "make -j8 -k check");
        assert_eq!(recipe.install[0].command_line(), "make -j8 install");
        assert!(recipe.install[0].elevated);
        assert!(!recipe.configure[0].elevated);
        assert!(!recipe.patch_specs);
    }

    #[test]
    fn test_gcc_recipe_cross_references_dependencies() {
        let c = ctx(PackageKind::Gcc, "gcc-8.2.0");
        let recipe = StandardRecipes.recipe(&c, &settings());
        let configure = &recipe.configure[0];

        assert_eq!(configure.program, "/scratch/src/gcc-8.2.0/configure");
        assert_eq!(configure.cwd, PathBuf::from("/scratch/obj/gcc-8.2.0"));
        for flag in [
            "--with-gmp=/opt/tc",
            "--with-mpfr=/opt/tc",
            "--with-mpc=/opt/tc",
            "--with-isl=/opt/tc",
            "--with-system-zlib",
            "--with-pkgversion=tc",
        ] {
            assert!(configure.args.iter().any(|a| a == flag), "{flag}");
        }
        assert!(recipe.patch_specs);
    }

    #[test]
    fn test_binutils_builds_out_of_tree() {
        let recipe =
            StandardRecipes.recipe(&ctx(PackageKind::Binutils, "binutils-2.31.1"), &settings());
        assert_eq!(
            recipe.build[0].cwd,
            PathBuf::from("/scratch/obj/binutils-2.31.1")
        );
        assert!(recipe.configure[0]
            .args
            .contains(&"--with-isl=/opt/tc".to_string()));
    }

    #[test]
    fn test_llvm_recipe_uses_cmake_and_ninja() {
        let recipe = StandardRecipes.recipe(&ctx(PackageKind::Llvm, "llvm-7.0.0.src"), &settings());

        let configure = &recipe.configure[0];
        assert_eq!(configure.program, "cmake");
        assert!(configure.args.contains(&"/scratch/src/llvm-7.0.0.src".to_string()));
        assert!(configure
            .args
            .contains(&"-DCMAKE_INSTALL_PREFIX=/opt/tc".to_string()));
        assert_eq!(recipe.build[0].command_line(), "ninja -j8");
        assert_eq!(recipe.check[0].command_line(), "ninja -j8 check-all");
        assert!(recipe.install[0].elevated);
    }

    #[test]
    fn test_dependency_flags() {
        let s = settings();
        let mpc = StandardRecipes.recipe(&ctx(PackageKind::Mpc, "mpc-1.1.0"), &s);
        assert!(mpc.configure[0].args.contains(&"--with-mpfr=/opt/tc".to_string()));

        let isl = StandardRecipes.recipe(&ctx(PackageKind::Isl, "isl-0.20"), &s);
        assert!(isl.configure[0]
            .args
            .contains(&"--with-gmp-prefix=/opt/tc".to_string()));

        let gmp = StandardRecipes.recipe(&ctx(PackageKind::Gmp, "gmp-6.1.2"), &s);
        assert!(gmp.configure[0].args.contains(&"--enable-cxx".to_string()));
    }

    #[test]
    fn test_vim_checks_with_make_test() {
        let recipe = StandardRecipes.recipe(&ctx(PackageKind::Vim, "vim-8.1.0500"), &settings());
        assert_eq!(recipe.check[0].command_line(), "make -j8 -k test");
    }

    #[test]
    fn test_phase_log_path() {
        assert_eq!(
            Phase::Check.log_path(Path::new("/logs/zlib-1.2.11")),
            PathBuf::from("/logs/zlib-1.2.11/check.log")
        );
        assert_eq!(Phase::ALL.map(Phase::name), ["configure", "build", "check", "install"]);
    }
}
