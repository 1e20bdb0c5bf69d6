use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha1::{Digest, Sha1};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Extensions that force the zip container format; everything else goes
/// through the tar reader with compression inferred from the extension.
const ZIP_EXTENSIONS: &[&str] = &[".zip", ".egg", ".whl"];

/// Patterns used when the caller does not care beyond source files.
const DEFAULT_PATTERNS: &[&str] = &["*.py"];

/// Disk-memoised archive extraction rooted at a single directory
/// (`HONESTY_EXTDIR` for the CLI).
#[derive(Debug, Clone)]
pub struct ExtractionCache {
    root: PathBuf,
}

impl ExtractionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ExtractionCache { root: root.into() }
    }

    /// Extract `archive` (if not already done) and return the extraction
    /// root plus `(relative-path, logical-source-path)` pairs for members
    /// whose file name matches any of `patterns`.
    ///
    /// The logical source path aligns sdist and wheel layouts: with
    /// `strip_top_level` the version-stamped top directory is dropped, and a
    /// leading `src/` is removed either way.
    pub fn extract_and_get_names(
        &self,
        archive: &Path,
        strip_top_level: bool,
        patterns: &[&str],
    ) -> Result<(PathBuf, Vec<(String, String)>), ArchiveError> {
        let archive_root = self.ensure_extracted(archive)?;
        let matcher = build_matcher(patterns)?;

        let mut names = Vec::new();
        for entry in WalkDir::new(&archive_root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !matcher.is_match(entry.file_name()) {
                continue;
            }
            let relname = entry
                .path()
                .strip_prefix(&archive_root)
                .expect("walk stays under the extraction root")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let mut srckey = relname.as_str();
            if strip_top_level {
                if let Some((_, rest)) = srckey.split_once('/') {
                    srckey = rest;
                }
            }
            let srckey = srckey.strip_prefix("src/").unwrap_or(srckey);

            names.push((relname.clone(), srckey.to_string()));
        }

        Ok((archive_root, names))
    }

    /// Map logical source path → SHA-1 hex digest of the member's bytes
    /// with CRLF normalised to LF. SHA-1 is a change detector here, not a
    /// security boundary.
    pub fn archive_hashes(
        &self,
        archive: &Path,
        strip_top_level: bool,
    ) -> Result<BTreeMap<String, String>, ArchiveError> {
        self.archive_hashes_matching(archive, strip_top_level, DEFAULT_PATTERNS)
    }

    /// [`ExtractionCache::archive_hashes`] with an explicit pattern set.
    pub fn archive_hashes_matching(
        &self,
        archive: &Path,
        strip_top_level: bool,
        patterns: &[&str],
    ) -> Result<BTreeMap<String, String>, ArchiveError> {
        let (archive_root, names) = self.extract_and_get_names(archive, strip_top_level, patterns)?;
        let mut hashes = BTreeMap::new();
        for (relname, srcname) in names {
            let data = fs::read(archive_root.join(&relname))?;
            let digest = Sha1::digest(&normalize_newlines(&data));
            hashes.insert(srcname, hex::encode(digest));
        }
        Ok(hashes)
    }

    /// Unpack the whole archive unless the sentinel says it is already
    /// there. Returns the extraction directory.
    fn ensure_extracted(&self, archive: &Path) -> Result<PathBuf, ArchiveError> {
        let basename = archive
            .file_name()
            .ok_or_else(|| ArchiveError::BadArchivePath(archive.to_path_buf()))?;
        let archive_root = self.root.join(basename);
        let sentinel = sentinel_path(&archive_root);

        if !sentinel.exists() {
            debug!(archive = %archive.display(), "extracting");
            fs::create_dir_all(&archive_root)?;
            unpack(archive, &archive_root)?;
        }
        File::create(&sentinel)?;
        Ok(archive_root)
    }
}

fn sentinel_path(archive_root: &Path) -> PathBuf {
    let mut name = archive_root.as_os_str().to_os_string();
    name.push(".done");
    PathBuf::from(name)
}

fn build_matcher(patterns: &[&str]) -> Result<GlobSet, ArchiveError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn is_zip(archive: &Path) -> bool {
    let name = archive.to_string_lossy();
    ZIP_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn unpack(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive)?;
    if is_zip(archive) {
        zip::ZipArchive::new(file)?.extract(dest)?;
        return Ok(());
    }
    let name = archive.to_string_lossy();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        tar::Archive::new(flate2::read::GzDecoder::new(file)).unpack(dest)?;
    } else if name.ends_with(".tar.bz2") {
        tar::Archive::new(bzip2::read::BzDecoder::new(file)).unpack(dest)?;
    } else {
        tar::Archive::new(file).unpack(dest)?;
    }
    Ok(())
}

/// Replace CRLF with LF at the byte level; lone CR is left alone. This is
/// the transform applied before hashing so that archives built on different
/// platforms compare equal.
pub fn normalize_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}
