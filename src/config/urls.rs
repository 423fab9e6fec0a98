//! Upstream source locations

/// GNU release mirror
pub const GNU_MIRROR: &str = "https://ftp.gnu.org/gnu";

/// GCC prerequisite infrastructure (isl)
pub const GCC_INFRASTRUCTURE: &str = "https://gcc.gnu.org/pub/gcc/infrastructure";

/// zlib release archive
pub const ZLIB_FOSSILS: &str = "https://zlib.net/fossils";

/// xz release archive
pub const XZ_RELEASES: &str = "https://tukaani.org/xz";

/// LLVM release downloads
pub const LLVM_RELEASES: &str = "https://releases.llvm.org";

/// vim repository
pub const VIM_REPOSITORY: &str = "https://github.com/vim/vim.git";
