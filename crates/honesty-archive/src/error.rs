use std::path::PathBuf;

use thiserror::Error;

/// Errors from archive extraction and hashing.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("bad glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("archive has no usable file name: {0}")]
    BadArchivePath(PathBuf),
}
