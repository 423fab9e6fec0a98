//! The fixed package list
//!
//! Order matters: every package is built against everything installed before
//! it. The llvm sibling archives come before llvm itself so they are fetched
//! by the time llvm is dispatched.

use crate::config::urls::{
    GCC_INFRASTRUCTURE, GNU_MIRROR, LLVM_RELEASES, VIM_REPOSITORY, XZ_RELEASES, ZLIB_FOSSILS,
};
use crate::core::package::{PackageEntry, PackageKind};

/// LLVM release shared by llvm and its sibling archives
pub const LLVM_VERSION: &str = "7.0.0";

/// Sibling archives unpacked next to llvm, in unpack order
pub const LLVM_COMPONENTS: [&str; 6] = [
    "cfe",
    "compiler-rt",
    "libcxx",
    "libcxxabi",
    "lld",
    "clang-tools-extra",
];

fn gnu(project: &str, file: &str) -> String {
    format!("{GNU_MIRROR}/{project}/{file}")
}

fn llvm(component: &str) -> String {
    format!("{LLVM_RELEASES}/{LLVM_VERSION}/{component}-{LLVM_VERSION}.src.tar.xz")
}

/// Build the package list
pub fn package_list() -> Vec<PackageEntry> {
    let mut list = vec![
        PackageEntry::url(format!("{ZLIB_FOSSILS}/zlib-1.2.11.tar.gz")),
        PackageEntry::url(format!("{XZ_RELEASES}/xz-5.2.4.tar.xz")),
        PackageEntry::url(gnu("gmp", "gmp-6.1.2.tar.xz")),
        PackageEntry::url(gnu("mpfr", "mpfr-4.0.1.tar.xz")),
        PackageEntry::url(gnu("mpc", "mpc-1.1.0.tar.gz")),
        PackageEntry::url(format!("{GCC_INFRASTRUCTURE}/isl-0.20.tar.bz2")),
        // Older interpreter kept in the source cache for autogen fallbacks
        PackageEntry::fetch_only_url(gnu("guile", "guile-2.0.14.tar.xz")),
        PackageEntry::url(gnu("guile", "guile-2.2.4.tar.xz")),
        PackageEntry::url(gnu("autogen", "rel5.18.16/autogen-5.18.16.tar.xz")),
        PackageEntry::url(gnu("binutils", "binutils-2.31.1.tar.xz")),
        PackageEntry::url(gnu("gcc", "gcc-8.2.0/gcc-8.2.0.tar.xz")),
    ];

    list.extend(
        LLVM_COMPONENTS
            .iter()
            .map(|component| PackageEntry::component(llvm(component), PackageKind::Llvm)),
    );
    list.push(PackageEntry::url(llvm("llvm")));
    list.push(PackageEntry::git(VIM_REPOSITORY));

    list
}
