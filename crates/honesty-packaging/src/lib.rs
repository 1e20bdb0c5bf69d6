//! Version grammar, specifier sets, environment markers and requirement
//! parsing for the rest of the workspace.
//!
//! Everything here is pure parsing and comparison; no I/O. The grammar
//! follows the standard Python packaging rules: versions carry epoch,
//! release segments, pre/post/dev tags and a local label, specifiers are
//! comma-separated `(operator, version)` pairs, and markers are boolean
//! expressions over a fixed set of environment variables plus `extra`.

pub mod error;
pub mod markers;
pub mod names;
pub mod requirements;
pub mod specifiers;
pub mod version;

pub use error::PackagingError;
pub use markers::{EnvironmentMarkers, Marker, MarkerOp, MarkerOperand};
pub use names::canonicalize_name;
pub use requirements::{Requirement, convert_sdist_requires};
pub use specifiers::{Operator, Specifier, SpecifierSet};
pub use version::Version;
