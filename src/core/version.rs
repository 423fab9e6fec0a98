//! Package name and version handling
//!
//! Canonical names look like `gmp-6.1.2`, `llvm-7.0.0.src` or
//! `clang-tools-extra-7.0.0.src`. The ledger key drops the trailing source
//! qualifier so `llvm-7.0.0.src` is recorded as `llvm-7.0.0`.

/// Trailing qualifiers removed from ledger keys
const SOURCE_QUALIFIERS: [&str; 4] = [".src", "-src", ".source", "-source"];

/// Substring before the first hyphen (`binutils-2.31.1` -> `binutils`)
pub fn leading_token(name: &str) -> &str {
    name.split('-').next().unwrap_or(name)
}

/// Ledger key for a canonical name
pub fn ledger_key(name: &str) -> &str {
    SOURCE_QUALIFIERS
        .iter()
        .find_map(|q| name.strip_suffix(q))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(name)
}

/// Split a name into project and version at the first `-<digit>`
///
/// `clang-tools-extra-7.0.0.src` -> (`clang-tools-extra`, `7.0.0.src`).
pub fn split_name_version(name: &str) -> Option<(&str, &str)> {
    name.match_indices('-')
        .map(|(i, _)| i)
        .find(|&i| name[i + 1..].starts_with(|c: char| c.is_ascii_digit()))
        .map(|i| (&name[..i], &name[i + 1..]))
}

/// Version of a canonical name, without the source qualifier
pub fn version_of(name: &str) -> Option<&str> {
    split_name_version(ledger_key(name)).map(|(_, version)| version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{dotted_version, package_token};
    use proptest::prelude::*;

    #[test]
    fn test_leading_token() {
        assert_eq!(leading_token("binutils-2.31.1"), "binutils");
        assert_eq!(leading_token("clang-tools-extra-7.0.0.src"), "clang");
        assert_eq!(leading_token("vim"), "vim");
    }

    #[test]
    fn test_ledger_key_strips_qualifier() {
        assert_eq!(ledger_key("llvm-7.0.0.src"), "llvm-7.0.0");
        assert_eq!(ledger_key("foo-1.0-src"), "foo-1.0");
        assert_eq!(ledger_key("bar-2.0.source"), "bar-2.0");
        assert_eq!(ledger_key("baz-3-source"), "baz-3");
        assert_eq!(ledger_key("zlib-1.2.11"), "zlib-1.2.11");
        assert_eq!(ledger_key(".src"), ".src");
    }

    #[test]
    fn test_ledger_key_strips_only_one_qualifier() {
        assert_eq!(ledger_key("pkg-1.0.src.src"), "pkg-1.0.src");
    }

    #[test]
    fn test_split_name_version() {
        assert_eq!(
            split_name_version("clang-tools-extra-7.0.0.src"),
            Some(("clang-tools-extra", "7.0.0.src"))
        );
        assert_eq!(split_name_version("gmp-6.1.2"), Some(("gmp", "6.1.2")));
        assert_eq!(split_name_version("guile"), None);
        assert_eq!(split_name_version("compiler-rt"), None);
    }

    #[test]
    fn test_version_of() {
        assert_eq!(version_of("llvm-7.0.0.src"), Some("7.0.0"));
        assert_eq!(version_of("vim-8.1.0500"), Some("8.1.0500"));
        assert_eq!(version_of("llvm"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A qualified name and its bare form share a ledger key
        #[test]
        fn prop_qualified_names_share_key(
            token in package_token(),
            version in dotted_version(),
            qualifier in prop::sample::select(SOURCE_QUALIFIERS.to_vec()),
        ) {
            let bare = format!("{token}-{version}");
            let qualified = format!("{bare}{qualifier}");
            prop_assert_eq!(ledger_key(&qualified), bare.as_str());
            prop_assert_eq!(ledger_key(&bare), bare.as_str());
        }

        /// The version survives the round trip through the canonical name
        #[test]
        fn prop_version_of_recovers_version(token in package_token(), version in dotted_version()) {
            let name = format!("{token}-{version}.src");
            prop_assert_eq!(version_of(&name), Some(version.as_str()));
        }
    }
}
