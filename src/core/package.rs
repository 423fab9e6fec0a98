//! Package descriptors
//!
//! A package entry pairs a source location with the role it plays in the
//! chain. The role is resolved once, when the list is built, so the build
//! loop never re-derives behaviour from name strings.

use std::fmt;

use crate::core::version::leading_token;
use crate::infra::download::file_name_from_url;
use crate::infra::git::repo_name;
use crate::infra::unpack::Compression;

/// The closed set of packages with a build routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    Zlib,
    Xz,
    Gmp,
    Mpfr,
    Mpc,
    Isl,
    Guile,
    Autogen,
    Binutils,
    Gcc,
    Llvm,
    Vim,
}

impl PackageKind {
    /// Every kind, in chain order
    pub const ALL: [Self; 12] = [
        Self::Zlib,
        Self::Xz,
        Self::Gmp,
        Self::Mpfr,
        Self::Mpc,
        Self::Isl,
        Self::Guile,
        Self::Autogen,
        Self::Binutils,
        Self::Gcc,
        Self::Llvm,
        Self::Vim,
    ];

    /// Token a package name starts with
    pub fn token(self) -> &'static str {
        match self {
            Self::Zlib => "zlib",
            Self::Xz => "xz",
            Self::Gmp => "gmp",
            Self::Mpfr => "mpfr",
            Self::Mpc => "mpc",
            Self::Isl => "isl",
            Self::Guile => "guile",
            Self::Autogen => "autogen",
            Self::Binutils => "binutils",
            Self::Gcc => "gcc",
            Self::Llvm => "llvm",
            Self::Vim => "vim",
        }
    }

    /// Map a name (`gmp-6.1.2`, `llvm-7.0.0.src`) to its kind by leading token
    ///
    /// Names matching no routine yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let token = leading_token(name);
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }

    /// Whether the package is configured in a separate object directory
    pub fn builds_out_of_tree(self) -> bool {
        matches!(self, Self::Binutils | Self::Gcc | Self::Llvm)
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Where a package's source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Direct archive download
    Url(String),
    /// Version-controlled repository, archived at its latest tag
    Git(String),
}

impl PackageSource {
    /// URL of the archive or remote
    pub fn location(&self) -> &str {
        match self {
            Self::Url(url) | Self::Git(url) => url,
        }
    }

    /// Name known before fetching: the archive stem or the repository name
    pub fn label(&self) -> String {
        match self {
            Self::Url(url) => file_name_from_url(url)
                .map(|file| {
                    Compression::strip_suffix(&file)
                        .map(str::to_string)
                        .unwrap_or(file)
                })
                .unwrap_or_else(|_| url.clone()),
            Self::Git(url) => repo_name(url).unwrap_or(url).to_string(),
        }
    }
}

/// What the orchestrator does with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Unpacked, built, installed, recorded
    Build(PackageKind),
    /// Sibling tree unpacked next to another package and moved into it
    Component { of: PackageKind },
    /// Fetched into the source cache only
    FetchOnly,
}

/// One entry of the package list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Source location
    pub source: PackageSource,
    /// Role in the chain
    pub role: Role,
}

impl PackageEntry {
    fn resolved(source: PackageSource) -> Self {
        let role = PackageKind::from_name(&source.label()).map_or(Role::FetchOnly, Role::Build);
        Self { source, role }
    }

    /// Archive download; the role follows from the file name
    pub fn url(url: impl Into<String>) -> Self {
        Self::resolved(PackageSource::Url(url.into()))
    }

    /// Git remote; the role follows from the repository name
    pub fn git(url: impl Into<String>) -> Self {
        Self::resolved(PackageSource::Git(url.into()))
    }

    /// Sibling archive of `of`
    pub fn component(url: impl Into<String>, of: PackageKind) -> Self {
        Self {
            source: PackageSource::Url(url.into()),
            role: Role::Component { of },
        }
    }

    /// Archive kept in the source cache without a build
    pub fn fetch_only_url(url: impl Into<String>) -> Self {
        Self {
            source: PackageSource::Url(url.into()),
            role: Role::FetchOnly,
        }
    }

    /// Display name before resolution
    pub fn label(&self) -> String {
        self.source.label()
    }

    /// Kind built by this entry, if any
    pub fn kind(&self) -> Option<PackageKind> {
        match self.role {
            Role::Build(kind) => Some(kind),
            _ => None,
        }
    }
}
