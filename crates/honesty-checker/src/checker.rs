use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use honesty_archive::ExtractionCache;
use honesty_cache::Cache;
use honesty_packaging::Version;
use honesty_releases::{FileEntry, FileType, Package, PackageRelease};

use crate::error::CheckerError;
use crate::flags;

/// What went wrong with one logical source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProblemKind {
    /// Present in a binary distribution, absent from the sdist.
    NotInSdist,
    /// Hashes disagree between distributions.
    DifferentHashes,
}

/// One diagnosed path; artifacts with the identical diagnosis are coalesced
/// into a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub path: String,
    pub kind: ProblemKind,
    /// Basenames of the artifacts this diagnosis applies to, sorted.
    pub artifacts: Vec<String>,
}

/// Outcome of the cross-distribution check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    /// Bitmask over [`crate::flags`].
    pub flags: u8,
    /// Sorted by (path, kind).
    pub problems: Vec<Problem>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.flags == 0
    }
}

fn find_release<'a>(
    package: &'a Package,
    version: &Version,
) -> Result<&'a PackageRelease, CheckerError> {
    package
        .releases
        .get(version)
        .ok_or_else(|| CheckerError::VersionNotFound {
            package: package.name.clone(),
            version: version.to_string(),
        })
}

async fn fetch_artifact(
    cache: &Cache,
    package: &Package,
    entry: &FileEntry,
) -> Result<std::path::PathBuf, CheckerError> {
    Ok(cache
        .fetch(&package.name, Some(&entry.url), Some(&entry.basename))
        .await?)
}

/// Cross-check every binary distribution of a release against its source
/// distribution.
///
/// Release with no sdist: reported via [`flags::NO_SDIST`], nothing else to
/// do. Sdist-only release: trivially clean. Otherwise the sdist is hashed
/// with its top-level directory stripped, each wheel/egg without stripping,
/// and every logical path shipped in a binary distribution must match a
/// path (and hash) in the sdist.
pub async fn run_checker(
    package: &Package,
    version: &Version,
    cache: &Cache,
    extraction: &ExtractionCache,
) -> Result<CheckResult, CheckerError> {
    let release = find_release(package, version)?;

    let sdists: Vec<&FileEntry> = release
        .files
        .iter()
        .filter(|f| f.file_type == FileType::Sdist)
        .collect();
    if sdists.is_empty() {
        info!(package = package.name, %version, "no sdist");
        return Ok(CheckResult {
            flags: flags::NO_SDIST,
            problems: Vec::new(),
        });
    }
    if sdists.len() == release.files.len() {
        debug!(package = package.name, %version, "only sdists, nothing to compare");
        return Ok(CheckResult::default());
    }

    // Logical path → hashes seen in any sdist. More than one sdist for a
    // release is unusual but legal.
    let mut sdist_hashes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in &sdists {
        let local = fetch_artifact(cache, package, entry).await?;
        for (path, sha) in extraction.archive_hashes(&local, true)? {
            sdist_hashes.entry(path).or_default().insert(sha);
        }
    }

    let mut grouped: BTreeMap<(String, ProblemKind), BTreeSet<String>> = BTreeMap::new();
    let mut result_flags = 0u8;
    for entry in &release.files {
        if !matches!(entry.file_type, FileType::BdistWheel | FileType::BdistEgg) {
            continue;
        }
        let local = fetch_artifact(cache, package, entry).await?;
        for (path, sha) in extraction.archive_hashes(&local, false)? {
            let kind = match sdist_hashes.get(&path) {
                None => ProblemKind::NotInSdist,
                Some(hashes) if !hashes.contains(&sha) => ProblemKind::DifferentHashes,
                Some(_) => continue,
            };
            result_flags |= match kind {
                ProblemKind::NotInSdist => flags::MISSING_FROM_SDIST,
                ProblemKind::DifferentHashes => flags::HASH_MISMATCH,
            };
            grouped
                .entry((path, kind))
                .or_default()
                .insert(entry.basename.clone());
        }
    }

    let problems = grouped
        .into_iter()
        .map(|((path, kind), artifacts)| Problem {
            path,
            kind,
            artifacts: artifacts.into_iter().collect(),
        })
        .collect();

    Ok(CheckResult {
        flags: result_flags,
        problems,
    })
}

/// Report the sdist's declared build backend: the
/// `build-system.build-backend` string from `pyproject.toml`, or
/// `no-pyproject-toml` / `no-build-backend` when absent.
pub async fn build_backend(
    package: &Package,
    version: &Version,
    cache: &Cache,
    extraction: &ExtractionCache,
) -> Result<String, CheckerError> {
    let release = find_release(package, version)?;
    let sdist = release
        .files
        .iter()
        .find(|f| f.file_type == FileType::Sdist)
        .ok_or_else(|| CheckerError::NoSdist {
            package: package.name.clone(),
            version: version.to_string(),
        })?;

    let local = fetch_artifact(cache, package, sdist).await?;
    let (root, mut names) = extraction.extract_and_get_names(&local, false, &["pyproject.toml"])?;
    if names.is_empty() {
        return Ok("no-pyproject-toml".to_string());
    }
    // Prefer the top-level file over any vendored test fixtures.
    names.sort_by_key(|(relname, _)| relname.len());
    let body = std::fs::read_to_string(root.join(&names[0].0))?;
    let document: toml::Value = toml::from_str(&body)?;
    let backend = document
        .get("build-system")
        .and_then(|table| table.get("build-backend"))
        .and_then(toml::Value::as_str)
        .unwrap_or("no-build-backend");
    Ok(backend.to_string())
}

/// True iff the release's first wheel contains native modules
/// (`*.so`/`*.dll` members).
pub async fn has_native_code(
    package: &Package,
    version: &Version,
    cache: &Cache,
    extraction: &ExtractionCache,
) -> Result<bool, CheckerError> {
    let release = find_release(package, version)?;
    let wheel = release
        .files
        .iter()
        .find(|f| f.file_type == FileType::BdistWheel)
        .ok_or_else(|| CheckerError::NoWheel {
            package: package.name.clone(),
            version: version.to_string(),
        })?;

    let local = fetch_artifact(cache, package, wheel).await?;
    let (_, names) = extraction.extract_and_get_names(&local, false, &["*.so", "*.dll"])?;
    Ok(!names.is_empty())
}
