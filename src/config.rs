//! Configuration, read once from the environment and passed down by value.
//! Nothing in the library consults the environment after construction.

use std::path::PathBuf;

use honesty_archive::ExtractionCache;
use honesty_cache::{Cache, CacheError, DEFAULT_PARALLELISM};

const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";
const DEFAULT_JSON_INDEX_URL: &str = "https://pypi.org/pypi/";

/// Resolved settings for a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache root (`HONESTY_CACHE`).
    pub cache_root: PathBuf,
    /// Simple index base URL (`HONESTY_INDEX_URL`), normalised to end in `/`.
    pub index_url: String,
    /// JSON index base URL (`HONESTY_JSON_INDEX_URL`).
    pub json_index_url: String,
    /// Archive extraction root (`HONESTY_EXTDIR`).
    pub ext_root: PathBuf,
    /// Worker-pool and connection-pool width.
    pub parallelism: usize,
}

impl Config {
    /// Read the `HONESTY_*` variables, defaulting to per-user cache
    /// directories and the public index.
    pub fn from_env() -> Self {
        let user_cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Config {
            cache_root: std::env::var_os("HONESTY_CACHE")
                .map(PathBuf::from)
                .unwrap_or_else(|| user_cache.join("honesty").join("pypi")),
            index_url: std::env::var("HONESTY_INDEX_URL")
                .unwrap_or_else(|_| DEFAULT_INDEX_URL.to_string()),
            json_index_url: std::env::var("HONESTY_JSON_INDEX_URL")
                .unwrap_or_else(|_| DEFAULT_JSON_INDEX_URL.to_string()),
            ext_root: std::env::var_os("HONESTY_EXTDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| user_cache.join("honesty").join("ext")),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    pub fn cache(&self) -> Result<Cache, CacheError> {
        Cache::new(
            &self.cache_root,
            &self.index_url,
            &self.json_index_url,
            self.parallelism,
        )
    }

    pub fn extraction(&self) -> ExtractionCache {
        ExtractionCache::new(&self.ext_root)
    }
}
