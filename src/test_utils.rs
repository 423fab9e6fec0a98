//! Test utilities
//!
//! Proptest generators and helpers for building fixture archives.

use std::path::Path;

use async_compression::tokio::write::{BzEncoder, GzipEncoder, XzEncoder};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_tar::{Builder, EntryType, Header};

use crate::infra::unpack::Compression;

/// Write a compressed tarball containing the given files
pub async fn write_archive(path: &Path, compression: Compression, files: &[(&str, &[u8])]) {
    let file = tokio::fs::File::create(path).await.unwrap();
    match compression {
        Compression::Gzip => fill_archive(GzipEncoder::new(file), files).await,
        Compression::Xz => fill_archive(XzEncoder::new(file), files).await,
        Compression::Bzip2 => fill_archive(BzEncoder::new(file), files).await,
    }
}

async fn fill_archive<W>(writer: W, files: &[(&str, &[u8])])
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = Builder::new(writer);

    if let Some(root) = files.first().and_then(|(p, _)| p.split('/').next()) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder
            .append_data(&mut header, format!("{root}/"), tokio::io::empty())
            .await
            .unwrap();
    }

    for (name, data) in files {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(if name.ends_with("configure") { 0o755 } else { 0o644 });
        builder.append_data(&mut header, name, *data).await.unwrap();
    }

    let mut writer = builder.into_inner().await.unwrap();
    writer.shutdown().await.unwrap();
}

pub mod generators {
    use proptest::prelude::*;

    /// Generate a package token (lowercase alphanumeric, no hyphen)
    pub fn package_token() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,12}"
    }

    /// Generate a dotted version string
    pub fn dotted_version() -> impl Strategy<Value = String> {
        (0u32..30, 0u32..30, 0u32..30)
            .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate an absolute install prefix
    pub fn install_prefix() -> impl Strategy<Value = String> {
        "(/[a-z][a-z0-9_-]{0,10}){1,4}"
    }

    /// Generate a `-march` value
    pub fn march() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("native".to_string()),
            Just("x86-64-v3".to_string()),
            Just("skylake".to_string()),
            Just("znver2".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_token_generator(token in package_token()) {
            prop_assert!(!token.is_empty());
            prop_assert!(!token.contains('-'));
        }

        #[test]
        fn test_dotted_version_generator(version in dotted_version()) {
            let parts: Vec<&str> = version.split('.').collect();
            prop_assert_eq!(parts.len(), 3);
            for part in parts {
                prop_assert!(part.parse::<u32>().is_ok());
            }
        }

        #[test]
        fn test_install_prefix_generator(prefix in install_prefix()) {
            prop_assert!(prefix.starts_with('/'));
        }
    }
}
