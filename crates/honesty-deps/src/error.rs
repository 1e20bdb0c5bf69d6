use thiserror::Error;

/// Errors from walking and from artifact metadata introspection.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No release of the package is compatible with the interpreter
    /// version (after the cutoff and requires-python filters).
    #[error("{package} incompatible with python {python_version}")]
    IncompatibleVersion {
        package: String,
        python_version: String,
    },

    /// The package exists but nothing satisfies the specifier set.
    #[error("{package} has no {python_version}-compatible release with constraint {specifiers}")]
    NoMatchingVersion {
        package: String,
        python_version: String,
        specifiers: String,
    },

    /// The chosen version exposes neither a wheel nor an sdist.
    #[error("no wheel or sdist for {package}=={version}")]
    MissingArtifact { package: String, version: String },

    #[error("no metadata member in wheel at {0}")]
    NoMetadata(String),

    #[error("background package fetch failed: {0}")]
    Background(String),

    #[error(transparent)]
    Requirement(#[from] honesty_packaging::PackagingError),

    #[error(transparent)]
    Release(#[from] honesty_releases::ReleaseError),

    #[error(transparent)]
    Cache(#[from] honesty_cache::CacheError),

    #[error("bad archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
