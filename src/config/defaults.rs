//! Default configuration values

/// Maximum number of download retry attempts
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// Default toolchain name, used for the prefix and `--with-pkgversion`
pub const DEFAULT_TOOLCHAIN_NAME: &str = "chainbuild";

/// Default `-march`/`-mtune` value
pub const DEFAULT_MARCH: &str = "native";

/// Parent of the default install prefix (`/opt/<toolchain_name>`)
pub const DEFAULT_PREFIX_PARENT: &str = "/opt";

/// Override file looked up in the working directory
pub const OVERRIDE_FILE_NAME: &str = "chainbuild.toml";

/// State directory under the install prefix
pub const STATE_DIR_NAME: &str = ".chainbuild";

/// Ledger file inside the state directory
pub const LEDGER_FILE_NAME: &str = "ledger.jsonl";

/// Manifest directory inside the state directory
pub const MANIFESTS_DIR_NAME: &str = "manifests";

/// Interval between `sudo -n -v` refreshes (in seconds)
pub const SUDO_KEEPALIVE_SECS: u64 = 60;

/// Documentation files smaller than this are left uncompressed (in bytes)
pub const DOC_COMPRESS_THRESHOLD: u64 = 4096;
