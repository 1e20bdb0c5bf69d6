//! Random-access reads over an immutable HTTP resource.
//!
//! Construction issues a single `Range: bytes=-N` request that both
//! discovers the total length (from `Content-Range`) and caches the tail of
//! the resource. Zip central directories live at the tail, so most wheel
//! metadata lookups are satisfied without another round trip; anything else
//! becomes one ranged request per read.
//!
//! This type is deliberately blocking (`std::io::Read + Seek`) so it can be
//! handed straight to a zip reader; callers inside an async context run it
//! under `spawn_blocking`.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::CacheError;

/// Tail prefetch size. Large enough for the central directory of any wheel
/// we have seen in the wild.
const DEFAULT_TAIL_SIZE: u64 = 256 * 1024;

/// A read/seek handle over a remote file, served by HTTP range requests.
#[derive(Debug)]
pub struct SeekableHttpFile {
    url: String,
    client: reqwest::blocking::Client,
    length: u64,
    pos: u64,
    /// Absolute offset of the first cached tail byte.
    tail_start: u64,
    tail: Vec<u8>,
}

impl SeekableHttpFile {
    /// Open `url`, prefetching the final 256 KiB.
    ///
    /// Fails if the server does not answer with a parseable `Content-Range`
    /// — there is no fallback to a full download here; that is the caller's
    /// decision to make.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Self::with_tail_size(url, DEFAULT_TAIL_SIZE)
    }

    pub fn with_tail_size(url: &str, tail_size: u64) -> Result<Self, CacheError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("honesty/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let response = client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes=-{tail_size}"))
            .send()?
            .error_for_status()?;

        let content_range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| CacheError::RangeNotSupported(url.to_string()))?;
        let (tail_start, length) = content_range;
        let tail = response.bytes()?.to_vec();
        debug!(url, length, tail = tail.len(), "opened remote file");

        Ok(SeekableHttpFile {
            url: url.to_string(),
            client,
            length,
            pos: 0,
            tail_start,
            tail,
        })
    }

    /// Total length of the remote resource.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn read_range(&self, start: u64, end_inclusive: u64) -> io::Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .header(
                reqwest::header::RANGE,
                format!("bytes={start}-{end_inclusive}"),
            )
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(io::Error::other)?;
        let body = response.bytes().map_err(io::Error::other)?;
        let wanted = (end_inclusive - start + 1) as usize;
        if body.len() < wanted {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short range response: wanted {wanted} bytes at {start}, got {}",
                    body.len()
                ),
            ));
        }
        Ok(body[..wanted].to_vec())
    }
}

/// Parse `bytes <start>-<end>/<total>` into `(start, total)`.
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    Some((start.parse().ok()?, total.parse().ok()?))
}

impl Read for SeekableHttpFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.pos);
        let wanted = (buf.len() as u64).min(remaining);
        if wanted == 0 {
            return Ok(0);
        }
        let start = self.pos;
        let end_inclusive = start + wanted - 1;

        let bytes = if start >= self.tail_start {
            let offset = (start - self.tail_start) as usize;
            self.tail[offset..offset + wanted as usize].to_vec()
        } else {
            self.read_range(start, end_inclusive)?
        };

        buf[..bytes.len()].copy_from_slice(&bytes);
        self.pos += bytes.len() as u64;
        Ok(bytes.len())
    }
}

impl Seek for SeekableHttpFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.length as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Serves `bytes=-N` and `bytes=a-b` ranges over a fixed body.
    struct RangeResponder {
        body: Vec<u8>,
    }

    impl Respond for RangeResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let total = self.body.len() as u64;
            let range = request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("bytes="))
                .map(str::to_string);
            let (start, end) = match range.as_deref() {
                Some(suffix) if suffix.starts_with('-') => {
                    let n: u64 = suffix[1..].parse().unwrap();
                    (total.saturating_sub(n), total - 1)
                }
                Some(bounds) => {
                    let (a, b) = bounds.split_once('-').unwrap();
                    (a.parse().unwrap(), b.parse().unwrap())
                }
                None => return ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
            };
            let slice = self.body[start as usize..=(end as usize).min(self.body.len() - 1)].to_vec();
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{end}/{total}").as_str(),
                )
                .set_body_bytes(slice)
        }
    }

    /// The sequence file from the original upstream tests: "1\n2\n…100\n".
    fn sequence_body() -> Vec<u8> {
        (1..=100).map(|i| format!("{i}\n")).collect::<String>().into_bytes()
    }

    async fn start_range_server(body: Vec<u8>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/sequence.txt"))
            .respond_with(RangeResponder { body })
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_read_and_seek() {
        let server = start_range_server(sequence_body()).await;
        let url = format!("{}/sequence.txt", server.uri());
        tokio::task::spawn_blocking(move || {
            let mut f = SeekableHttpFile::new(&url).unwrap();
            assert_eq!(292, f.len());

            let mut two = [0u8; 2];
            f.read_exact(&mut two).unwrap();
            assert_eq!(b"1\n", &two);

            f.seek(SeekFrom::End(-4)).unwrap();
            let mut four = [0u8; 4];
            f.read_exact(&mut four).unwrap();
            assert_eq!(b"100\n", &four);
            assert_eq!(292, f.stream_position().unwrap());

            // Reads past the end are clamped.
            let mut buf = [0u8; 8];
            f.seek(SeekFrom::End(-4)).unwrap();
            assert_eq!(4, f.read(&mut buf).unwrap());
            assert_eq!(0, f.read(&mut buf).unwrap());

            f.seek(SeekFrom::Start(1)).unwrap();
            f.seek(SeekFrom::Current(2)).unwrap();
            assert_eq!(3, f.stream_position().unwrap());

            assert!(f.seek(SeekFrom::Current(-10)).is_err());
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reads_outside_tail_fetch_a_range() {
        let server = start_range_server(sequence_body()).await;
        let url = format!("{}/sequence.txt", server.uri());
        tokio::task::spawn_blocking(move || {
            // Tiny tail cache: the head read must go back to the network.
            let mut f = SeekableHttpFile::with_tail_size(&url, 8).unwrap();
            let mut four = [0u8; 4];
            f.read_exact(&mut four).unwrap();
            assert_eq!(b"1\n2\n", &four);

            // And the tail is still served from memory.
            f.seek(SeekFrom::End(-4)).unwrap();
            f.read_exact(&mut four).unwrap();
            assert_eq!(b"100\n", &four);
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_no_content_range_fails_construction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/plain.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;
        let url = format!("{}/plain.txt", server.uri());
        tokio::task::spawn_blocking(move || {
            match SeekableHttpFile::new(&url) {
                Err(CacheError::RangeNotSupported(_)) => {}
                other => panic!("expected RangeNotSupported, got {other:?}"),
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_http_error_fails_construction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/missing.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let url = format!("{}/missing.txt", server.uri());
        tokio::task::spawn_blocking(move || {
            assert!(SeekableHttpFile::new(&url).is_err());
        })
        .await
        .unwrap();
    }

    /// Always returns one byte fewer than asked for.
    struct TruncatingResponder {
        body: Vec<u8>,
    }

    impl Respond for TruncatingResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let total = self.body.len() as u64;
            let range = request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string();
            if let Some(suffix) = range.strip_prefix("bytes=-") {
                let n: u64 = suffix.parse().unwrap();
                let start = total.saturating_sub(n);
                return ResponseTemplate::new(206)
                    .insert_header(
                        "Content-Range",
                        format!("bytes {start}-{}/{total}", total - 1).as_str(),
                    )
                    .set_body_bytes(self.body[start as usize..].to_vec());
            }
            let bounds = range.strip_prefix("bytes=").unwrap();
            let (a, b) = bounds.split_once('-').unwrap();
            let (start, end): (u64, u64) = (a.parse().unwrap(), b.parse().unwrap());
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{end}/{total}").as_str(),
                )
                .set_body_bytes(self.body[start as usize..end as usize].to_vec())
        }
    }

    #[tokio::test]
    async fn test_short_range_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/trunc.txt"))
            .respond_with(TruncatingResponder {
                body: sequence_body(),
            })
            .mount(&server)
            .await;
        let url = format!("{}/trunc.txt", server.uri());
        tokio::task::spawn_blocking(move || {
            let mut f = SeekableHttpFile::with_tail_size(&url, 8).unwrap();
            let mut buf = [0u8; 16];
            let err = f.read(&mut buf).unwrap_err();
            assert_eq!(io::ErrorKind::UnexpectedEof, err.kind());
        })
        .await
        .unwrap();
    }
}
