//! Parsers for the two index representations.
//!
//! Both shapes normalise into the same [`Package`]: the simple HTML link
//! listing (kind and version inferred from basenames, `data-requires-python`
//! attached when present) and the JSON release document (authoritative
//! size, upload time and checksum). The JSON `packagetype` field is ignored
//! on purpose — it sometimes reports `sdist` for platform-suffixed dumb
//! bdists, so kind inference is re-run from the filename either way.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use honesty_cache::Cache;
use honesty_packaging::Version;

use crate::error::ReleaseError;
use crate::guess::{guess_file_type, guess_version};
use crate::model::{FileEntry, Package, PackageRelease};

// "Parsing" HTML with a regex, same as the index has been parsed since the
// beginning; entries that do not look exactly like warehouse anchors are
// skipped rather than guessed at.
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r##"href="(?P<url>[^"#]+/(?P<basename>[^#"]+))#(?P<checksum>[^="]+=[a-f0-9]+)"(?:\s+data-requires-python="(?P<requires_python>[^"]*)")?"##,
    )
    .unwrap()
});

/// Fetch (through the cache) and parse the index listing for `pkg`.
///
/// `use_json` selects the JSON release document, which additionally carries
/// sizes, upload times and aggregate requirements. `strict` propagates
/// unparseable basenames instead of dropping the entry.
pub async fn parse_index(
    pkg: &str,
    cache: &Cache,
    use_json: bool,
    strict: bool,
) -> Result<Package, ReleaseError> {
    let path = if use_json {
        cache.fetch_json_index(pkg).await?
    } else {
        cache.fetch(pkg, None, None).await?
    };
    let body = tokio::fs::read_to_string(&path).await?;
    if use_json {
        parse_json(pkg, &body, strict)
    } else {
        parse_html(pkg, &body, strict)
    }
}

/// Parse a simple HTML link listing.
pub fn parse_html(pkg: &str, html: &str, strict: bool) -> Result<Package, ReleaseError> {
    let mut package = Package::new(pkg);
    for caps in ENTRY_RE.captures_iter(html) {
        let basename = decode_entities(&caps["basename"]);
        let entry = match html_entry(&caps, &basename) {
            Ok(entry) => entry,
            Err(err) => {
                if strict {
                    return Err(err);
                }
                debug!(pkg, basename, "dropping unparseable entry");
                continue;
            }
        };
        let Ok(parsed_version) = Version::parse(&entry.version) else {
            // Legacy versions do not survive into the model.
            warn!(pkg, version = entry.version, "dropping unparseable version");
            continue;
        };
        package
            .releases
            .entry(parsed_version.clone())
            .or_insert_with(|| PackageRelease::new(entry.version.clone(), parsed_version))
            .files
            .push(entry);
    }
    finish(&mut package);
    Ok(package)
}

fn html_entry(caps: &regex::Captures<'_>, basename: &str) -> Result<FileEntry, ReleaseError> {
    let file_type = guess_file_type(basename)?;
    let (_, version) = guess_version(basename)?;
    Ok(FileEntry {
        url: decode_entities(&caps["url"]),
        basename: basename.to_string(),
        checksum: Some(caps["checksum"].to_string()),
        file_type,
        version: version.to_string(),
        requires_python: caps
            .name("requires_python")
            .map(|m| decode_entities(m.as_str())),
        size: None,
        upload_time: None,
    })
}

#[derive(Debug, Deserialize)]
struct JsonDocument {
    #[serde(default)]
    info: Option<JsonInfo>,
    releases: BTreeMap<String, Vec<JsonFile>>,
}

#[derive(Debug, Deserialize)]
struct JsonInfo {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    #[serde(default)]
    home_page: Option<String>,
    #[serde(default)]
    project_urls: Option<BTreeMap<String, Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct JsonFile {
    url: String,
    filename: String,
    #[serde(default)]
    digests: Option<JsonDigests>,
    #[serde(default)]
    requires_python: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    upload_time_iso_8601: Option<DateTime<Utc>>,
    #[serde(default)]
    yanked: bool,
}

#[derive(Debug, Deserialize)]
struct JsonDigests {
    #[serde(default)]
    sha256: Option<String>,
}

/// Parse a JSON release document (the warehouse schema).
pub fn parse_json(pkg: &str, body: &str, strict: bool) -> Result<Package, ReleaseError> {
    let document: JsonDocument = serde_json::from_str(body)?;
    let mut package = Package::new(pkg);

    if let Some(info) = document.info {
        package.requires = info.requires_dist;
        package.homepage = info.home_page.filter(|url| !url.is_empty());
        package.project_urls = info
            .project_urls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(label, url)| Some((label, url?)))
            .collect();
    }

    for (version_str, files) in document.releases {
        let Ok(parsed_version) = Version::parse(&version_str) else {
            warn!(pkg, version = version_str, "dropping unparseable version");
            continue;
        };
        let mut release = PackageRelease::new(version_str.clone(), parsed_version.clone());
        let mut all_yanked = !files.is_empty();
        for file in files {
            // `packagetype` lies for platform-suffixed archives; infer from
            // the filename like the HTML path does.
            let file_type = match guess_file_type(&file.filename) {
                Ok(file_type) => file_type,
                Err(err) => {
                    if strict {
                        return Err(err);
                    }
                    debug!(pkg, filename = file.filename, "dropping unparseable entry");
                    continue;
                }
            };
            all_yanked &= file.yanked;
            release.files.push(FileEntry {
                url: file.url,
                basename: file.filename,
                checksum: file
                    .digests
                    .and_then(|digests| digests.sha256)
                    .map(|hex| format!("sha256={hex}")),
                file_type,
                version: version_str.clone(),
                requires_python: file.requires_python,
                size: file.size,
                upload_time: file.upload_time_iso_8601,
            });
        }
        release.yanked = all_yanked && !release.files.is_empty();
        package.releases.insert(parsed_version, release);
    }

    finish(&mut package);
    Ok(package)
}

/// Establish the model's sorting invariants and drop pre-warehouse releases
/// that have no files at all.
fn finish(package: &mut Package) {
    package
        .releases
        .retain(|_, release| !release.files.is_empty());
    for release in package.releases.values_mut() {
        release
            .files
            .sort_by(|a, b| (a.file_type, &a.basename).cmp(&(b.file_type, &b.basename)));
    }
}

/// The handful of entities the index actually emits.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
