//! Archive extraction and member hashing.
//!
//! Extraction is memoised on disk: each archive unpacks once into a
//! directory named after its basename under the extraction root, with a
//! `<dir>.done` sentinel marking completion. The first call deliberately
//! extracts everything; later calls — whatever their patterns — only
//! re-walk the tree and re-filter. Extraction is cheaper than bookkeeping
//! about which patterns have been seen.

pub mod error;
pub mod extract;

pub use error::ArchiveError;
pub use extract::{ExtractionCache, normalize_newlines};
