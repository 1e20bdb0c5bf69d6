//! The on-disk fetch cache.
//!
//! Layout under the cache root: `<aa>/<bb>/<pkg>/<basename>` where `aa` and
//! `bb` are the first two and next two characters of the canonical package
//! name (`--` when the name is too short), and `basename` is the artifact
//! basename or `index.html`/`json` for index bodies. A `<basename>.hdrs`
//! sidecar records the validator (`ETag` or `Last-Modified`) seen when the
//! body was stored.
//!
//! Artifacts are content-addressed by their upstream URL and never
//! refetched once present. Index bodies are revalidated on every fetch,
//! conditionally when a validator is on file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::CacheError;

/// Default worker-pool width; the HTTP connection pool is sized to match so
/// that all workers can be in flight against the same host at once.
pub const DEFAULT_PARALLELISM: usize = 24;

/// Index bodies (as opposed to artifacts) are revalidated on every fetch.
const INDEX_BASENAMES: &[&str] = &["index.html", "json", "691json"];

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoredHeaders {
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(rename = "last-modified", skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

impl StoredHeaders {
    fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Persistent, concurrency-safe HTTP fetch cache.
///
/// One instance owns one HTTP client and its connection pool; clones are
/// cheap and share the pool. Concurrent `fetch` calls are safe — writers
/// serialise at the filesystem rename, not in process, so the last writer
/// wins and readers never observe a torn file.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    index_url: Url,
    json_index_url: Url,
    client: reqwest::Client,
}

impl Cache {
    /// Create a cache rooted at `root`. Both index URLs are normalised to
    /// end with `/` so that relative joins behave the same for mirrors that
    /// emit relative hrefs and those that emit absolute ones.
    pub fn new(
        root: impl Into<PathBuf>,
        index_url: &str,
        json_index_url: &str,
        parallelism: usize,
    ) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(parallelism)
            .user_agent(concat!("honesty/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Cache {
            root: root.into(),
            index_url: Url::parse(&ensure_trailing_slash(index_url))?,
            json_index_url: Url::parse(&ensure_trailing_slash(json_index_url))?,
            client,
        })
    }

    /// The normalised simple index base URL.
    pub fn index_url(&self) -> &Url {
        &self.index_url
    }

    /// Fetch and return the local path of the most recently validated body.
    ///
    /// With no `url`, fetches the simple index page for `pkg` (stored as
    /// `index.html`). With a `url` — absolute, or relative to the package's
    /// index page — fetches that artifact, stored under `filename` (or the
    /// last URL path segment). Artifacts already on disk are returned
    /// without any network traffic.
    pub async fn fetch(
        &self,
        pkg: &str,
        url: Option<&str>,
        filename: Option<&str>,
    ) -> Result<PathBuf, CacheError> {
        let package_page = self.index_url.join(&format!("{pkg}/"))?;
        let (target, basename) = match url {
            None => (package_page, filename.unwrap_or("index.html").to_string()),
            Some(href) => {
                let target = package_page.join(href)?;
                let basename = match filename {
                    Some(name) => name.to_string(),
                    None => target
                        .path_segments()
                        .and_then(|mut segments| segments.next_back())
                        .unwrap_or("index.html")
                        .to_string(),
                };
                (target, basename)
            }
        };
        self.fetch_inner(pkg, target, &basename).await
    }

    /// Fetch the JSON release document for `pkg` (stored as `json`).
    pub async fn fetch_json_index(&self, pkg: &str) -> Result<PathBuf, CacheError> {
        let target = self.json_index_url.join(&format!("{pkg}/json"))?;
        self.fetch_inner(pkg, target, "json").await
    }

    async fn fetch_inner(
        &self,
        pkg: &str,
        url: Url,
        basename: &str,
    ) -> Result<PathBuf, CacheError> {
        if pkg.contains('&') || pkg.contains('#') {
            return Err(CacheError::PackageNameNotSupported(pkg.to_string()));
        }

        let dir = self.root.join(shard(pkg)).join(pkg);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(basename);
        let is_index = INDEX_BASENAMES.contains(&basename);

        if !is_index && tokio::fs::try_exists(&path).await? {
            debug!(pkg, basename, "cache hit");
            return Ok(path);
        }

        let sidecar = dir.join(format!("{basename}.hdrs"));
        let mut request = self.client.get(url.clone());
        // Only revalidate when there is a body the 304 can refer to; a
        // sidecar without a body is stale and ignored.
        if is_index && tokio::fs::try_exists(&path).await? {
            match read_sidecar(&sidecar).await {
                Some(stored) if stored.etag.is_some() => {
                    request = request.header(
                        reqwest::header::IF_NONE_MATCH,
                        stored.etag.as_deref().unwrap_or_default(),
                    );
                }
                Some(stored) if stored.last_modified.is_some() => {
                    request = request.header(
                        reqwest::header::IF_MODIFIED_SINCE,
                        stored.last_modified.as_deref().unwrap_or_default(),
                    );
                }
                _ => {}
            }
        }

        let response = request.send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_MODIFIED => {
                debug!(pkg, basename, "not modified");
                Ok(path)
            }
            reqwest::StatusCode::OK => {
                let headers = StoredHeaders {
                    etag: header_string(&response, reqwest::header::ETAG),
                    last_modified: header_string(&response, reqwest::header::LAST_MODIFIED),
                };
                self.replace_atomically(&dir, &path, basename, response)
                    .await?;
                if headers.is_empty() {
                    // A stale validator must not suppress the next refetch
                    // now that the body it described is gone.
                    if let Err(err) = tokio::fs::remove_file(&sidecar).await {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            return Err(err.into());
                        }
                    }
                } else {
                    let encoded =
                        serde_json::to_vec(&headers).expect("header sidecar serialises");
                    tokio::fs::write(&sidecar, encoded).await?;
                }
                Ok(path)
            }
            status => Err(CacheError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }

    /// Stream the response body to `<final>.<pid>` in the same directory,
    /// then rename onto the final name. Concurrent writers race benignly:
    /// whoever renames last wins, and a reader only ever sees a complete
    /// body at the canonical name.
    async fn replace_atomically(
        &self,
        dir: &Path,
        path: &Path,
        basename: &str,
        mut response: reqwest::Response,
    ) -> Result<(), CacheError> {
        let tmp = dir.join(format!("{basename}.{}", std::process::id()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// `woah` → `wo/ah`, `a` → `a/--`.
fn shard(pkg: &str) -> PathBuf {
    let first = &pkg[..pkg.len().min(2)];
    let second = if pkg.len() > 2 {
        &pkg[2..pkg.len().min(4)]
    } else {
        "--"
    };
    Path::new(first).join(second)
}

async fn read_sidecar(path: &Path) -> Option<StoredHeaders> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(headers) => Some(headers),
        Err(err) => {
            // Out-of-sync sidecar: fall back to an unconditional fetch.
            warn!(path = %path.display(), %err, "ignoring unreadable header sidecar");
            None
        }
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
