//! On-disk HTTP cache for index pages and release artifacts, and a
//! random-access reader over HTTP `Range` requests.
//!
//! The cache is safe under concurrent use from multiple processes:
//! replacement goes through a write-to-sibling-then-rename protocol with
//! last-writer-wins semantics, and nothing ever appears half-written at the
//! canonical name. Index bodies are revalidated with conditional requests
//! on every fetch; artifacts are immutable once present.

pub mod cache;
pub mod error;
pub mod seekable;

pub use cache::{Cache, DEFAULT_PARALLELISM};
pub use error::CacheError;
pub use seekable::SeekableHttpFile;
