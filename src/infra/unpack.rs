//! Archive extraction
//!
//! Streams a compressed tarball through the matching decoder into tar
//! extraction. The compression scheme is chosen from the file extension
//! before anything is read.

use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};
use futures::StreamExt;
use std::fmt;
use std::path::{Component, Path};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_tar::{Archive, EntryType};

use crate::error::UnpackError;

/// Supported tarball compression schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (`.tar.gz`, `.tgz`)
    Gzip,
    /// xz (`.tar.xz`, `.txz`)
    Xz,
    /// bzip2 (`.tar.bz2`, `.tbz2`, `.tbz`)
    Bzip2,
}

/// Recognised file name suffixes, longest first within each scheme
const SUFFIXES: &[(&str, Compression)] = &[
    (".tar.gz", Compression::Gzip),
    (".tgz", Compression::Gzip),
    (".tar.xz", Compression::Xz),
    (".txz", Compression::Xz),
    (".tar.bz2", Compression::Bzip2),
    (".tbz2", Compression::Bzip2),
    (".tbz", Compression::Bzip2),
];

impl Compression {
    /// Select the scheme from an archive path
    pub fn from_path(path: &Path) -> Result<Self, UnpackError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, compression)| *compression)
            .ok_or_else(|| UnpackError::UnknownFormat {
                path: path.to_path_buf(),
            })
    }

    /// Strip the archive suffix from a file name, if it has one
    pub fn strip_suffix(file_name: &str) -> Option<&str> {
        let lower = file_name.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(suffix, _)| &file_name[..file_name.len() - suffix.len()])
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => write!(f, "gzip"),
            Self::Xz => write!(f, "xz"),
            Self::Bzip2 => write!(f, "bzip2"),
        }
    }
}

type DecodedStream = Box<dyn AsyncRead + Unpin + Send>;

async fn open_decoded(path: &Path, compression: Compression) -> Result<DecodedStream, UnpackError> {
    let file = File::open(path).await.map_err(|e| UnpackError::Extract {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let reader = BufReader::new(file);

    Ok(match compression {
        Compression::Gzip => Box::new(GzipDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
    })
}

/// First normal component of an entry path (`./pkg-1.0/x` -> `pkg-1.0`)
fn top_level_component(path: &Path) -> Option<String> {
    path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}

/// pax headers (e.g. the one `git archive` writes) are metadata, not content
fn is_metadata(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    )
}

/// Extract `archive` into `dest` and return its top-level directory name
///
/// Archives are expected to have a single root. When they do not, the first
/// root seen is returned and the others are logged.
pub async fn unpack(archive: &Path, dest: &Path) -> Result<String, UnpackError> {
    let compression = Compression::from_path(archive)?;
    let extract_err = |e: std::io::Error| UnpackError::Extract {
        path: archive.to_path_buf(),
        error: e.to_string(),
    };

    tokio::fs::create_dir_all(dest).await.map_err(extract_err)?;

    tracing::info!(
        "Unpacking {} ({compression}) into {}",
        archive.display(),
        dest.display()
    );

    let reader = open_decoded(archive, compression).await?;
    let mut tar = Archive::new(reader);
    let mut entries = tar.entries().map_err(extract_err)?;

    let mut roots: Vec<String> = Vec::new();
    while let Some(entry) = entries.next().await {
        let mut entry = entry.map_err(extract_err)?;
        if is_metadata(entry.header().entry_type()) {
            continue;
        }

        let path = entry.path().map_err(extract_err)?.into_owned();
        if let Some(root) = top_level_component(&path) {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        entry.unpack_in(dest).await.map_err(extract_err)?;
    }

    if roots.len() > 1 {
        tracing::warn!(
            "Archive {} has {} top-level entries, using '{}'",
            archive.display(),
            roots.len(),
            roots[0]
        );
    }

    roots.into_iter().next().ok_or_else(|| UnpackError::Empty {
        path: archive.to_path_buf(),
    })
}

/// Read only as far as the first entry and return its top-level component
pub async fn first_component(archive: &Path) -> Result<String, UnpackError> {
    let compression = Compression::from_path(archive)?;
    let extract_err = |e: std::io::Error| UnpackError::Extract {
        path: archive.to_path_buf(),
        error: e.to_string(),
    };

    let reader = open_decoded(archive, compression).await?;
    let mut tar = Archive::new(reader);
    let mut entries = tar.entries().map_err(extract_err)?;

    while let Some(entry) = entries.next().await {
        let entry = entry.map_err(extract_err)?;
        if is_metadata(entry.header().entry_type()) {
            continue;
        }
        let path = entry.path().map_err(extract_err)?;
        if let Some(root) = top_level_component(&path) {
            return Ok(root);
        }
    }

    Err(UnpackError::Empty {
        path: archive.to_path_buf(),
    })
}
