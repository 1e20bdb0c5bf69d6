//! The canonical version grammar.
//!
//! A parsed version holds epoch, release segments, an optional pre-release
//! tag (`a`/`b`/`rc`), optional post and dev numbers, and an optional local
//! label. Ordering is total: epochs first, then release segments compared
//! element-wise with zero padding, then the usual tie-breaks (dev sorts
//! earliest, pre-releases before the final release, post-releases after,
//! local labels last).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PackagingError;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:[-_\.]?(?P<pre_l>a|b|c|rc|alpha|beta|pre|preview)[-_\.]?(?P<pre_n>[0-9]+)?)?
        (?:
            -(?P<post_n1>[0-9]+)
          | [-_\.]?(?P<post_l>post|rev|r)[-_\.]?(?P<post_n2>[0-9]+)?
        )?
        (?:[-_\.]?(?P<dev_l>dev)[-_\.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
        \s*$",
    )
    .unwrap()
});

/// Pre-release tag, ordered `a < b < rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreTag {
    Alpha,
    Beta,
    Rc,
}

impl PreTag {
    fn as_str(self) -> &'static str {
        match self {
            PreTag::Alpha => "a",
            PreTag::Beta => "b",
            PreTag::Rc => "rc",
        }
    }
}

/// One segment of a local version label. Numeric segments sort after
/// alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    Alpha(String),
    Num(u64),
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (LocalSegment::Num(a), LocalSegment::Num(b)) => a.cmp(b),
            (LocalSegment::Alpha(a), LocalSegment::Alpha(b)) => a.cmp(b),
            (LocalSegment::Num(_), LocalSegment::Alpha(_)) => Ordering::Greater,
            (LocalSegment::Alpha(_), LocalSegment::Num(_)) => Ordering::Less,
        }
    }
}

/// A parsed version. Construct with [`Version::parse`] or `FromStr`.
///
/// Equality and ordering ignore insignificant trailing zeros, so
/// `"1.0" == "1.0.0"`; `Hash` is consistent with that.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreTag, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, PackagingError> {
        let invalid = || PackagingError::InvalidVersion(input.to_string());
        let lower = input.trim().to_lowercase();
        let caps = VERSION_RE.captures(&lower).ok_or_else(invalid)?;

        let parse_num = |m: Option<regex::Match<'_>>| -> Result<Option<u64>, PackagingError> {
            m.map(|m| m.as_str().parse().map_err(|_| invalid())).transpose()
        };

        let epoch = parse_num(caps.name("epoch"))?.unwrap_or(0);

        let mut release = Vec::new();
        for seg in caps["release"].split('.') {
            release.push(seg.parse().map_err(|_| invalid())?);
        }

        let pre = match caps.name("pre_l") {
            Some(tag) => {
                let tag = match tag.as_str() {
                    "a" | "alpha" => PreTag::Alpha,
                    "b" | "beta" => PreTag::Beta,
                    _ => PreTag::Rc,
                };
                Some((tag, parse_num(caps.name("pre_n"))?.unwrap_or(0)))
            }
            None => None,
        };

        // Post-releases come in two spellings: `-N` and `[.-_]?postN` (with
        // `rev`/`r` aliases and an optional number).
        let post = if let Some(n) = parse_num(caps.name("post_n1"))? {
            Some(n)
        } else if caps.name("post_l").is_some() {
            Some(parse_num(caps.name("post_n2"))?.unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            Some(parse_num(caps.name("dev_n"))?.unwrap_or(0))
        } else {
            None
        };

        let local = match caps.name("local") {
            Some(m) => m
                .as_str()
                .split(['-', '_', '.'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Num(n),
                    Err(_) => LocalSegment::Alpha(seg.to_string()),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Release segments as parsed (no zero trimming).
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<(PreTag, u64)> {
        self.pre
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// This version with any local label removed; specifier comparisons other
    /// than `==`/`===` operate on the public part only.
    pub fn without_local(&self) -> Version {
        Version {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Release segments with insignificant trailing zeros removed (always at
    /// least one segment).
    fn trimmed_release(&self) -> &[u64] {
        let mut len = self.release.len();
        while len > 1 && self.release[len - 1] == 0 {
            len -= 1;
        }
        &self.release[..len]
    }

    /// Compare release segments element-wise, padding the shorter with zeros.
    fn cmp_release(&self, other: &Self) -> Ordering {
        let n = self.release.len().max(other.release.len());
        for i in 0..n {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }

    // Pre-release rank: a dev-only version (1.0.dev1) sorts before any
    // tagged pre-release, which sorts before the final release.
    fn pre_key(&self) -> (u8, u8, u64) {
        match self.pre {
            Some((tag, n)) => (1, tag as u8, n),
            None if self.post.is_none() && self.dev.is_some() => (0, 0, 0),
            None => (2, 0, 0),
        }
    }

    fn post_key(&self) -> (u8, u64) {
        match self.post {
            Some(n) => (1, n),
            None => (0, 0),
        }
    }

    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        }
    }
}

impl FromStr for Version {
    type Err = PackagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.cmp_release(other))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post_key().cmp(&other.post_key()))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre_key().hash(state);
        self.post_key().hash(state);
        self.dev_key().hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((tag, n)) = self.pre {
            write!(f, "{}{}", tag.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if !self.local.is_empty() {
            let segs: Vec<String> = self
                .local
                .iter()
                .map(|seg| match seg {
                    LocalSegment::Num(n) => n.to_string(),
                    LocalSegment::Alpha(s) => s.clone(),
                })
                .collect();
            write!(f, "+{}", segs.join("."))?;
        }
        Ok(())
    }
}
