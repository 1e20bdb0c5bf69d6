//! The dependency walker: a breadth-first resolver over the package index.
//!
//! For each requirement it selects a compatible version (against the
//! interpreter version, an optional historical cutoff, versions other edges
//! already chose, and a caller-provided installed-version oracle), then
//! discovers transitive requirements by introspecting release artifacts —
//! remotely through ranged reads for large wheels, through the cache
//! otherwise, never a full download when avoidable.
//!
//! This is not a solver: there is no backtracking, and conflicting pins are
//! recorded rather than resolved.

pub mod error;
pub mod metadata;
pub mod print;
pub mod walker;

pub use error::ResolveError;
pub use metadata::{read_metadata_remote_wheel, read_metadata_sdist, read_metadata_wheel};
pub use print::{print_deps, print_flat_deps};
pub use walker::{
    CurrentVersionsFn, DepEdge, DepNode, DepWalk, DepWalker, IndexSource, NodeKey, PackageSource,
    find_compatible_version,
};
