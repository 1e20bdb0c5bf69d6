use thiserror::Error;

/// Errors from the audit scans.
#[derive(Error, Debug)]
pub enum CheckerError {
    #[error("{package} has no release {version}")]
    VersionNotFound { package: String, version: String },

    #[error("{package}=={version} has no sdist")]
    NoSdist { package: String, version: String },

    #[error("{package}=={version} has no wheel")]
    NoWheel { package: String, version: String },

    #[error("bad pyproject.toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Cache(#[from] honesty_cache::CacheError),

    #[error(transparent)]
    Archive(#[from] honesty_archive::ArchiveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
