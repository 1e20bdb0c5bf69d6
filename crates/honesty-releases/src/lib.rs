//! The canonical model of an index listing — packages, releases and files —
//! and the parsers that produce it from the two upstream representations
//! (simple HTML link listings and JSON release documents).

pub mod error;
pub mod guess;
pub mod model;
pub mod parse;

pub use error::ReleaseError;
pub use guess::{SDIST_EXTENSIONS, guess_file_type, guess_version};
pub use model::{FileEntry, FileType, Package, PackageRelease};
pub use parse::{parse_html, parse_index, parse_json};
