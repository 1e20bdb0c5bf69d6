use thiserror::Error;

/// Errors from index parsing.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// A basename under a known sdist extension that the filename grammar
    /// cannot split into name and version. Swallowed (entry dropped) unless
    /// parsing in strict mode.
    #[error("could not parse version from filename {0:?}")]
    UnexpectedFilename(String),

    #[error(transparent)]
    Cache(#[from] honesty_cache::CacheError),

    #[error("malformed json index document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
