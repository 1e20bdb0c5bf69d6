//! Download conveniences over the cache, intended for the CLI. Version
//! parsing happens in the layer above.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::task::JoinSet;
use tracing::debug;

use honesty_cache::Cache;
use honesty_packaging::Version;
use honesty_releases::{FileEntry, FileType, Package, PackageRelease};

/// Look up a concrete version. No specifier semantics here.
pub fn pick_release<'a>(package: &'a Package, version: &Version) -> Result<&'a PackageRelease> {
    package
        .releases
        .get(version)
        .with_context(|| format!("no version of {} matching {version}", package.name))
}

/// Choose the sdist to operate on, preferring `.tar.gz` over `.zip`.
pub fn pick_sdist<'a>(package_name: &str, release: &'a PackageRelease) -> Result<&'a FileEntry> {
    let mut pick: Option<&FileEntry> = None;
    for file in &release.files {
        if file.file_type == FileType::Sdist
            && (pick.is_none() || pick.is_some_and(|p| p.basename.ends_with(".zip")))
        {
            pick = Some(file);
        }
    }
    pick.with_context(|| format!("{package_name}=={} no sdist", release.version))
}

/// Fetch one version's sdist through the cache; when `dest` is given, copy
/// it there under its upstream basename and return that path.
pub async fn download_one(
    package: &Package,
    version: &Version,
    dest: Option<&Path>,
    cache: &Cache,
) -> Result<PathBuf> {
    let release = pick_release(package, version)?;
    let sdist = pick_sdist(&package.name, release)?;
    let cache_path = cache
        .fetch(&package.name, Some(&sdist.url), Some(&sdist.basename))
        .await?;
    let Some(dest) = dest else {
        return Ok(cache_path);
    };
    // The cache may use arbitrary names internally; the copy keeps the
    // basename from the URL.
    let basename = sdist
        .url
        .rsplit('/')
        .next()
        .unwrap_or(&sdist.basename)
        .to_string();
    let dest_path = dest.join(basename);
    tokio::fs::copy(&cache_path, &dest_path)
        .await
        .with_context(|| format!("copying into {}", dest_path.display()))?;
    Ok(dest_path)
}

/// Download several versions concurrently, printing each resulting path.
/// Returns a non-zero bit when any download failed.
pub async fn download_many(
    package: &Package,
    versions: &[Version],
    dest: Option<&Path>,
    cache: &Cache,
) -> Result<i32> {
    if let Some(dest) = dest {
        if !dest.is_dir() {
            bail!("{} is not a directory", dest.display());
        }
    }

    let mut tasks = JoinSet::new();
    for version in versions {
        let package = package.clone();
        let version = version.clone();
        let dest = dest.map(Path::to_path_buf);
        let cache = cache.clone();
        tasks.spawn(async move {
            download_one(&package, &version, dest.as_deref(), &cache).await
        });
    }

    let mut code = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.context("download task panicked")? {
            Ok(path) => println!("{}", path.display()),
            Err(err) => {
                debug!(%err, "download failed");
                eprintln!("Error: {err:#}");
                code |= honesty_checker::flags::FATAL as i32;
            }
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn entry(basename: &str, file_type: FileType) -> FileEntry {
        FileEntry {
            url: format!("https://files.example.org/{basename}"),
            basename: basename.to_string(),
            checksum: None,
            file_type,
            version: "1.0".to_string(),
            requires_python: None,
            size: None,
            upload_time: None,
        }
    }

    #[test]
    fn test_pick_sdist_prefers_tar_gz() {
        let mut release = PackageRelease::new("1.0", v("1.0"));
        release.files.push(entry("foo-1.0.zip", FileType::Sdist));
        release.files.push(entry("foo-1.0.tar.gz", FileType::Sdist));
        release
            .files
            .push(entry("foo-1.0-py3-none-any.whl", FileType::BdistWheel));

        let picked = pick_sdist("foo", &release).unwrap();
        assert_eq!("foo-1.0.tar.gz", picked.basename);
    }

    #[test]
    fn test_pick_sdist_requires_one() {
        let mut release = PackageRelease::new("1.0", v("1.0"));
        release
            .files
            .push(entry("foo-1.0-py3-none-any.whl", FileType::BdistWheel));
        assert!(pick_sdist("foo", &release).is_err());
    }

    #[test]
    fn test_pick_release_exact_only() {
        let mut package = Package::new("foo");
        package
            .releases
            .insert(v("1.0"), PackageRelease::new("1.0", v("1.0")));
        assert!(pick_release(&package, &v("1.0")).is_ok());
        assert!(pick_release(&package, &v("2.0")).is_err());
    }
}
