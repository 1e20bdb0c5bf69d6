//! honesty — audits a Python package index.
//!
//! Answers the questions a supply-chain reviewer asks about a package:
//! does the wheel faithfully reproduce the sdist, does it carry native
//! code, what build backend produced it, and what does its transitive
//! dependency graph look like against a given interpreter.
//!
//! The heavy lifting lives in the member crates; this crate is the thin
//! shell: configuration from the environment, download conveniences, and
//! the CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod requirements;

pub use config::Config;

pub use honesty_archive::ExtractionCache;
pub use honesty_cache::{Cache, SeekableHttpFile};
pub use honesty_checker::{CheckResult, build_backend, has_native_code, run_checker};
pub use honesty_deps::{DepWalker, IndexSource, print_deps, print_flat_deps};
pub use honesty_packaging::{Requirement, Version, canonicalize_name};
pub use honesty_releases::{FileType, Package, parse_index};
