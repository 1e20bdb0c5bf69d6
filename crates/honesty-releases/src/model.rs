//! Data model shared by everything downstream of the index parsers.
//!
//! Instances are created by the parsers and never mutated afterwards; the
//! dependency walker and the checker only read them. Sorting invariants are
//! established at construction: files within a release are ordered by
//! (kind, basename), and the releases map iterates in ascending version
//! order by virtue of its key type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use honesty_packaging::Version;

/// What kind of distributable a file is, derived from its basename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileType {
    Unknown,
    Sdist,
    BdistDmg,
    BdistDumb,
    BdistEgg,
    BdistMsi,
    BdistRpm,
    BdistWheel,
    BdistWininst,
}

impl FileType {
    /// Short tag used by listings.
    pub fn tag(self) -> &'static str {
        match self {
            FileType::Unknown => "unknown",
            FileType::Sdist => "sdist",
            FileType::BdistDmg => "bdist_dmg",
            FileType::BdistDumb => "bdist_dumb",
            FileType::BdistEgg => "bdist_egg",
            FileType::BdistMsi => "bdist_msi",
            FileType::BdistRpm => "bdist_rpm",
            FileType::BdistWheel => "bdist_wheel",
            FileType::BdistWininst => "bdist_wininst",
        }
    }
}

/// One distributable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute URL, e.g. `https://files.pythonhosted.org/packages/…/foo-1.0.tar.gz`
    pub url: String,
    /// `foo-1.0.tar.gz`
    pub basename: String,
    /// `sha256=<hex>`, when the index reported one.
    pub checksum: Option<String>,
    pub file_type: FileType,
    /// Version string as carried in the basename (or the release key, for
    /// JSON sources).
    pub version: String,
    /// Interpreter constraint (`>=3.6`), when the index reported one.
    pub requires_python: Option<String>,
    /// Size in bytes; only JSON sources report it.
    pub size: Option<u64>,
    /// Upload timestamp (UTC); only JSON sources report it.
    pub upload_time: Option<DateTime<Utc>>,
}

/// A single published version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRelease {
    /// The version string as published.
    pub version: String,
    pub parsed_version: Version,
    pub yanked: bool,
    /// Sorted by (kind, basename).
    pub files: Vec<FileEntry>,
    /// Per-release requirement strings. Index documents rarely carry these;
    /// the walker falls back to artifact introspection when absent.
    pub requires: Option<Vec<String>>,
}

impl PackageRelease {
    pub fn new(version: impl Into<String>, parsed_version: Version) -> Self {
        PackageRelease {
            version: version.into(),
            parsed_version,
            yanked: false,
            files: Vec::new(),
            requires: None,
        }
    }
}

/// A package and everything the index knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Package {
    /// Canonical name (keys are always canonical; display casing is the
    /// caller's business).
    pub name: String,
    /// Ascending by version.
    pub releases: BTreeMap<Version, PackageRelease>,
    /// Aggregate requirement list, when the JSON document reports one.
    pub requires: Option<Vec<String>>,
    pub homepage: Option<String>,
    pub project_urls: BTreeMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            ..Package::default()
        }
    }
}
