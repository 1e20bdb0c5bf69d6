use thiserror::Error;

/// Errors from cache fetches and seekable HTTP reads.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A couple of packages have HTML entities in their names; rather than
    /// decoding them (or silently misfetching) we refuse them outright.
    #[error("package name {0:?} contains characters the index parser does not support")]
    PackageNameNotSupported(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} fetching {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("server did not answer a range request with Content-Range for {0}")]
    RangeNotSupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
