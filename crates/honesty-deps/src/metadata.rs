//! Requirement discovery from release artifacts.
//!
//! Wheels carry their requirements as `Requires-Dist` headers in a
//! `*.dist-info/METADATA` member; sdists (when built by setuptools) carry a
//! legacy `*.egg-info/requires.txt`. Both are read without unpacking the
//! whole archive, and the wheel path can run entirely over HTTP range
//! requests for archives too large to be worth downloading.
//!
//! Everything here is blocking; the walker runs it under `spawn_blocking`
//! because zip access over [`SeekableHttpFile`] cannot be suspended
//! mid-read.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use honesty_cache::SeekableHttpFile;
use honesty_packaging::convert_sdist_requires;

use crate::error::ResolveError;

/// Read `Requires-Dist` entries from a wheel without downloading it: the
/// zip central directory and the METADATA member are fetched with range
/// requests.
pub fn read_metadata_remote_wheel(url: &str) -> Result<Vec<String>, ResolveError> {
    let file = SeekableHttpFile::new(url)?;
    let mut archive = ZipArchive::new(file)?;
    read_wheel_requires(&mut archive, url)
}

/// Read `Requires-Dist` entries from a wheel on disk.
pub fn read_metadata_wheel(path: &Path) -> Result<Vec<String>, ResolveError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    read_wheel_requires(&mut archive, &path.display().to_string())
}

fn read_wheel_requires<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    source: &str,
) -> Result<Vec<String>, ResolveError> {
    // Favor the shortest name; most wheels only have one, but vendored test
    // fixtures can contribute deeper ones.
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| name.ends_with("/METADATA"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(String::len);
    let Some(name) = names.first() else {
        return Err(ResolveError::NoMetadata(source.to_string()));
    };

    let mut body = String::new();
    archive.by_name(name)?.read_to_string(&mut body)?;
    Ok(parse_requires_dist(&body))
}

/// Pull `Requires-Dist` values out of the RFC-822-style header block.
fn parse_requires_dist(metadata: &str) -> Vec<String> {
    let mut requires: Vec<String> = Vec::new();
    let mut in_requires = false;
    for line in metadata.lines() {
        if line.is_empty() {
            // End of headers; the body is the project description.
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous header.
            if in_requires {
                if let Some(last) = requires.last_mut() {
                    last.push(' ');
                    last.push_str(line.trim());
                }
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) if key.eq_ignore_ascii_case("requires-dist") => {
                in_requires = true;
                requires.push(value.trim().to_string());
            }
            _ => in_requires = false,
        }
    }
    requires
}

/// Read requirements from an sdist's `requires.txt`, converting the legacy
/// section-header form to standard requirement strings.
///
/// Only members at nesting depth ≤ 2 are considered, which skips test
/// fixtures buried deep inside some archives. An sdist without a
/// `requires.txt` simply has no declared requirements.
pub fn read_metadata_sdist(path: &Path) -> Result<Vec<String>, ResolveError> {
    let name = path.to_string_lossy();
    let data = if name.ends_with(".zip") {
        sdist_requires_from_zip(path)?
    } else {
        sdist_requires_from_tar(path)?
    };
    match data {
        Some(body) => Ok(convert_sdist_requires(&body)),
        None => {
            debug!(path = %path.display(), "sdist has no requires.txt");
            Ok(Vec::new())
        }
    }
}

fn wanted_requires_member(name: &str) -> bool {
    name.ends_with("/requires.txt") && name.matches('/').count() <= 2
}

fn sdist_requires_from_zip(path: &Path) -> Result<Option<String>, ResolveError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| wanted_requires_member(name))
        .map(str::to_string)
        .collect();
    names.sort_by_key(String::len);
    let Some(name) = names.first() else {
        return Ok(None);
    };
    let mut body = String::new();
    archive.by_name(name)?.read_to_string(&mut body)?;
    Ok(Some(body))
}

fn sdist_requires_from_tar(path: &Path) -> Result<Option<String>, ResolveError> {
    let file = File::open(path)?;
    let name = path.to_string_lossy();
    let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(flate2::read::GzDecoder::new(file))
    } else if name.ends_with(".tar.bz2") {
        Box::new(bzip2::read::BzDecoder::new(file))
    } else {
        Box::new(file)
    };

    // Tar has no central directory; take the shortest matching member in
    // one streaming pass.
    let mut archive = tar::Archive::new(reader);
    let mut best: Option<(String, String)> = None;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_string_lossy().to_string();
        if !wanted_requires_member(&member) {
            continue;
        }
        if best.as_ref().is_some_and(|(name, _)| name.len() <= member.len()) {
            continue;
        }
        let mut body = String::new();
        entry.read_to_string(&mut body)?;
        best = Some((member, body));
    }
    Ok(best.map(|(_, body)| body))
}
