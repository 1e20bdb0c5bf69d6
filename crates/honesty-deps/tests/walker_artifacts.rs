//! End-to-end walker runs where requirement discovery actually has to open
//! release artifacts: a wheel fetched through the cache, a wheel too large
//! to download (read remotely via range requests), and an sdist falling
//! back to `requires.txt`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use honesty_cache::Cache;
use honesty_deps::{DepWalker, PackageSource};
use honesty_packaging::Version;
use honesty_releases::{
    FileEntry, Package, PackageRelease, ReleaseError, guess_file_type,
};

struct FixtureSource {
    packages: HashMap<String, Package>,
}

#[async_trait]
impl PackageSource for FixtureSource {
    async fn parse_index(&self, pkg: &str) -> Result<Package, ReleaseError> {
        self.packages.get(pkg).cloned().ok_or_else(|| {
            ReleaseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unknown fixture package {pkg}"),
            ))
        })
    }
}

fn zip_bytes(contents: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (member, data) in contents {
            writer.start_file(*member, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn tar_gz_bytes(contents: &[(&str, &str)]) -> Vec<u8> {
    let cursor = std::io::Cursor::new(Vec::new());
    let encoder = flate2::write::GzEncoder::new(cursor, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (member, data) in contents {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, member, data.as_bytes())
            .unwrap();
    }
    builder
        .into_inner()
        .unwrap()
        .finish()
        .unwrap()
        .into_inner()
}

fn release_with_file(server: &MockServer, basename: &str, size: Option<u64>) -> PackageRelease {
    let version = Version::parse("1.0").unwrap();
    let mut release = PackageRelease::new("1.0", version);
    release.files.push(FileEntry {
        url: format!("{}/files/{basename}", server.uri()),
        basename: basename.to_string(),
        checksum: None,
        file_type: guess_file_type(basename).unwrap(),
        version: "1.0".to_string(),
        requires_python: None,
        size,
        upload_time: None,
    });
    release
}

fn leaf_package(name: &str) -> Package {
    let version = Version::parse("1.0").unwrap();
    let mut release = PackageRelease::new("1.0", version.clone());
    release.requires = Some(Vec::new());
    let mut package = Package::new(name);
    package.releases.insert(version, release);
    package
}

fn package_with_release(name: &str, release: PackageRelease) -> Package {
    let mut package = Package::new(name);
    package
        .releases
        .insert(release.parsed_version.clone(), release);
    package
}

async fn serve(server: &MockServer, basename: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{basename}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

async fn run_walk(server: &MockServer, packages: HashMap<String, Package>) -> Vec<String> {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(
        dir.path(),
        &server.uri(),
        &format!("{}/pypi", server.uri()),
        4,
    )
    .unwrap();
    let walker = DepWalker::new(
        cache,
        Arc::new(FixtureSource { packages }),
        "3.6.0",
        None,
        None,
    )
    .unwrap();
    let walk = walker
        .walk(&["demo".to_string()], false, None)
        .await
        .unwrap();
    let mut names: Vec<String> = walk.nodes.keys().map(|key| key.name.clone()).collect();
    names.sort();
    names.retain(|name| !name.is_empty());
    names
}

#[tokio::test]
async fn test_discovery_from_cached_wheel() {
    let server = MockServer::start().await;
    serve(
        &server,
        "demo-1.0-py3-none-any.whl",
        zip_bytes(&[
            ("demo/__init__.py", ""),
            (
                "demo-1.0.dist-info/METADATA",
                "Metadata-Version: 2.1\nName: demo\nRequires-Dist: attrs (>=19.2)\n\n",
            ),
        ]),
    )
    .await;

    let mut packages = HashMap::new();
    packages.insert(
        "demo".to_string(),
        package_with_release(
            "demo",
            release_with_file(&server, "demo-1.0-py3-none-any.whl", Some(2411)),
        ),
    );
    packages.insert("attrs".to_string(), leaf_package("attrs"));

    let names = run_walk(&server, packages).await;
    assert_eq!(vec!["attrs".to_string(), "demo".to_string()], names);
}

/// Serves `bytes=-N` and `bytes=a-b` over a fixed body, like a CDN.
struct RangeResponder {
    body: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.body.len() as u64;
        let Some(range) = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
        else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };
        let (start, end) = if let Some(n) = range.strip_prefix('-') {
            let n: u64 = n.parse().unwrap();
            (total.saturating_sub(n), total - 1)
        } else {
            let (a, b) = range.split_once('-').unwrap();
            (a.parse().unwrap(), b.parse().unwrap())
        };
        let end = (end as usize).min(self.body.len() - 1);
        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {start}-{end}/{total}").as_str(),
            )
            .set_body_bytes(self.body[start as usize..=end].to_vec())
    }
}

#[tokio::test]
async fn test_discovery_from_remote_wheel_without_download() {
    let server = MockServer::start().await;
    let wheel = zip_bytes(&[
        ("big/__init__.py", ""),
        (
            "big-1.0.dist-info/METADATA",
            "Metadata-Version: 2.1\nName: big\nRequires-Dist: attrs (>=19.2)\n\n",
        ),
    ]);
    Mock::given(method("GET"))
        .and(path("/files/big-1.0-py3-none-any.whl"))
        .respond_with(RangeResponder { body: wheel })
        .mount(&server)
        .await;

    let mut packages = HashMap::new();
    // The reported size forces the remote-read path; the walker must never
    // issue a plain (un-ranged) GET for the wheel.
    let release = release_with_file(&server, "big-1.0-py3-none-any.whl", Some(30_000_000));
    packages.insert("demo".to_string(), package_with_release("demo", release));
    packages.insert("attrs".to_string(), leaf_package("attrs"));

    let names = run_walk(&server, packages).await;
    assert_eq!(vec!["attrs".to_string(), "demo".to_string()], names);

    // Nothing was written into the artifact cache for the big wheel: the
    // only requests were ranged reads.
    for request in server.received_requests().await.unwrap() {
        if request.url.path().contains("big-1.0") {
            assert!(
                request.headers.get("range").is_some(),
                "expected only ranged requests for the big wheel"
            );
        }
    }
}

#[tokio::test]
async fn test_discovery_from_sdist_requires_txt() {
    let server = MockServer::start().await;
    serve(
        &server,
        "demo-1.0.tar.gz",
        tar_gz_bytes(&[
            ("demo-1.0/setup.py", "setup()\n"),
            (
                "demo-1.0/demo.egg-info/requires.txt",
                "attrs>=19.2\n\n[test]\npytest\n",
            ),
        ]),
    )
    .await;

    let mut packages = HashMap::new();
    packages.insert(
        "demo".to_string(),
        package_with_release("demo", release_with_file(&server, "demo-1.0.tar.gz", None)),
    );
    packages.insert("attrs".to_string(), leaf_package("attrs"));

    let names = run_walk(&server, packages).await;
    // pytest is extra-gated and the walk asked for no extras.
    assert_eq!(vec!["attrs".to_string(), "demo".to_string()], names);
}

#[tokio::test]
async fn test_missing_artifact_is_an_error() {
    let server = MockServer::start().await;
    let version = Version::parse("1.0").unwrap();
    let mut release = PackageRelease::new("1.0", version.clone());
    release.files.push(FileEntry {
        url: format!("{}/files/demo-1.0.unknownext", server.uri()),
        basename: "demo-1.0.unknownext".to_string(),
        checksum: None,
        file_type: honesty_releases::FileType::Unknown,
        version: "1.0".to_string(),
        requires_python: None,
        size: None,
        upload_time: None,
    });
    let mut packages = HashMap::new();
    packages.insert(
        "demo".to_string(),
        package_with_release("demo", release),
    );

    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(
        dir.path(),
        &server.uri(),
        &format!("{}/pypi", server.uri()),
        4,
    )
    .unwrap();
    let walker = DepWalker::new(
        cache,
        Arc::new(FixtureSource { packages }),
        "3.6.0",
        None,
        None,
    )
    .unwrap();
    assert!(matches!(
        walker.walk(&["demo".to_string()], false, None).await,
        Err(honesty_deps::ResolveError::MissingArtifact { .. })
    ));
}
