//! Specifier sets: ordered lists of `(operator, version)` pairs constraining
//! a version, e.g. `>=1.0,!=1.3.4,<2.0`.

use std::fmt;
use std::str::FromStr;

use crate::error::PackagingError;
use crate::version::Version;

/// Comparison operator in a specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`, optionally with a trailing `.*` prefix form
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `~=` (compatible release)
    Compatible,
    /// `===` (arbitrary string equality)
    Arbitrary,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
        }
    }
}

/// A single `operator version` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    op: Operator,
    /// Version text as written (needed for `===` and for display).
    text: String,
    /// Parsed version; for `==1.*` this is the base without the `.*`.
    version: Option<Version>,
    /// True for the `==1.*` / `!=1.*` prefix forms.
    prefix: bool,
}

impl Specifier {
    pub fn parse(input: &str) -> Result<Self, PackagingError> {
        let input = input.trim();
        let invalid = || PackagingError::InvalidSpecifier(input.to_string());

        // Longest operators first so `===` is not read as `==` + `=1.0`.
        const OPS: &[(&str, Operator)] = &[
            ("===", Operator::Arbitrary),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("~=", Operator::Compatible),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ];

        let (op, rest) = OPS
            .iter()
            .find_map(|(tok, op)| input.strip_prefix(tok).map(|rest| (*op, rest)))
            .ok_or_else(invalid)?;

        let text = rest.trim().to_string();
        if text.is_empty() {
            return Err(invalid());
        }

        let (prefix, version) = match op {
            Operator::Arbitrary => (false, None),
            Operator::Equal | Operator::NotEqual if text.ends_with(".*") => {
                let base = &text[..text.len() - 2];
                (true, Some(Version::parse(base).map_err(|_| invalid())?))
            }
            _ => (false, Some(Version::parse(&text).map_err(|_| invalid())?)),
        };

        if op == Operator::Compatible {
            let v = version.as_ref().expect("compatible specifier has a version");
            // `~=1` is meaningless: there is no segment to hold fixed.
            if v.release().len() < 2 {
                return Err(invalid());
            }
        }

        Ok(Specifier {
            op,
            text,
            version,
            prefix,
        })
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    /// Whether the written version is itself a pre-release; used to decide
    /// whether a set opts in to pre-release candidates.
    fn mentions_prerelease(&self) -> bool {
        self.version.as_ref().is_some_and(Version::is_prerelease)
    }

    /// Does `candidate` satisfy this clause?
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = match &self.version {
            Some(v) => v,
            // ===: compare the written text against the candidate's
            // canonical and literal spellings.
            None => {
                let want = self.text.to_lowercase();
                return candidate.to_string().to_lowercase() == want;
            }
        };

        match self.op {
            Operator::Equal => self.prefix_or_exact_eq(candidate, spec),
            Operator::NotEqual => !self.prefix_or_exact_eq(candidate, spec),
            Operator::LessEqual => candidate.without_local() <= *spec,
            Operator::GreaterEqual => candidate.without_local() >= *spec,
            Operator::Less => {
                let candidate = candidate.without_local();
                // An exclusive bound does not let in pre-releases of the
                // boundary version itself unless the boundary is one.
                if !spec.is_prerelease()
                    && candidate.is_prerelease()
                    && same_release(&candidate, spec)
                {
                    return false;
                }
                candidate < *spec
            }
            Operator::Greater => {
                let candidate = candidate.without_local();
                // Symmetrically, `>1.7` does not let in 1.7.post1.
                if !spec.is_postrelease()
                    && candidate.is_postrelease()
                    && same_release(&candidate, spec)
                {
                    return false;
                }
                candidate > *spec
            }
            Operator::Compatible => {
                if candidate.without_local() < *spec {
                    return false;
                }
                // Equivalent to ==X.Y.* where X.Y is the written release
                // with its final segment dropped.
                let release = spec.release();
                release_prefix_matches(candidate, spec.epoch(), &release[..release.len() - 1])
            }
            Operator::Arbitrary => unreachable!("handled above"),
        }
    }

    fn prefix_or_exact_eq(&self, candidate: &Version, spec: &Version) -> bool {
        if self.prefix {
            release_prefix_matches(candidate, spec.epoch(), spec.release())
        } else if spec.has_local() {
            candidate == spec
        } else {
            // ==1.0 matches 1.0+anything; local only participates when the
            // specifier spells one.
            candidate.without_local() == *spec
        }
    }
}

/// True when `candidate`'s release starts with `prefix` (zero-padded).
fn release_prefix_matches(candidate: &Version, epoch: u64, prefix: &[u64]) -> bool {
    if candidate.epoch() != epoch {
        return false;
    }
    let release = candidate.release();
    (0..prefix.len()).all(|i| release.get(i).copied().unwrap_or(0) == prefix[i])
}

/// True when both versions have the same epoch and (zero-padded) release
/// segments, ignoring pre/post/dev/local parts.
fn same_release(a: &Version, b: &Version) -> bool {
    let n = a.release().len().max(b.release().len());
    a.epoch() == b.epoch()
        && (0..n).all(|i| {
            a.release().get(i).copied().unwrap_or(0) == b.release().get(i).copied().unwrap_or(0)
        })
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.text)
    }
}

impl FromStr for Specifier {
    type Err = PackagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Specifier::parse(s)
    }
}

/// A comma-separated conjunction of specifiers. The empty set matches
/// every version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn parse(input: &str) -> Result<Self, PackagingError> {
        let mut specifiers = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            specifiers.push(Specifier::parse(part)?);
        }
        Ok(SpecifierSet { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// True if every clause admits `candidate`. Pre-release candidates are
    /// admitted here; [`SpecifierSet::filter`] applies the usual exclusion.
    pub fn contains(&self, candidate: &Version) -> bool {
        self.specifiers.iter().all(|s| s.contains(candidate))
    }

    /// Whether any clause spells a pre-release version, opting the whole set
    /// in to pre-release candidates.
    pub fn allows_prereleases(&self) -> bool {
        self.specifiers.iter().any(Specifier::mentions_prerelease)
    }

    /// Filter candidates, preserving input order. Pre-releases are excluded
    /// unless the set opts in, or nothing else matches (in which case the
    /// matching pre-releases are returned as a fallback).
    pub fn filter<I>(&self, candidates: I) -> Vec<Version>
    where
        I: IntoIterator<Item = Version>,
    {
        let allow_pre = self.allows_prereleases();
        let mut released = Vec::new();
        let mut prereleases = Vec::new();
        for candidate in candidates {
            if !self.contains(&candidate) {
                continue;
            }
            if candidate.is_prerelease() && !allow_pre {
                prereleases.push(candidate);
            } else {
                released.push(candidate);
            }
        }
        if released.is_empty() { prereleases } else { released }
    }
}

// Display is the round-trip form consumed by the requirement grammar.
impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for SpecifierSet {
    type Err = PackagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecifierSet::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn set(s: &str) -> SpecifierSet {
        SpecifierSet::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let s = set(">=1.0, !=1.3.4, <2.0");
        assert_eq!(">=1.0,!=1.3.4,<2.0", s.to_string());
        assert!(set("").is_empty());
        assert!(SpecifierSet::parse("$1.0").is_err());
        assert!(SpecifierSet::parse("==").is_err());
    }

    #[test]
    fn test_basic_operators() {
        assert!(set("==1.0").contains(&v("1.0")));
        assert!(set("==1.0").contains(&v("1.0.0")));
        assert!(!set("==1.0").contains(&v("1.1")));
        assert!(set("!=2.0").contains(&v("1.0")));
        assert!(set(">=1.5").contains(&v("1.5")));
        assert!(set(">=1.5").contains(&v("2.0")));
        assert!(!set(">1.5").contains(&v("1.5")));
        assert!(set("<=1.5").contains(&v("1.5")));
        assert!(!set("<1.5").contains(&v("1.5")));
        assert!(set(">=1.0,<2.0").contains(&v("1.7")));
        assert!(!set(">=1.0,<2.0").contains(&v("2.0")));
    }

    #[test]
    fn test_prefix_matching() {
        assert!(set("==1.4.*").contains(&v("1.4")));
        assert!(set("==1.4.*").contains(&v("1.4.9")));
        assert!(!set("==1.4.*").contains(&v("1.5")));
        assert!(set("!=1.4.*").contains(&v("1.5")));
        assert!(!set("!=1.4.*").contains(&v("1.4.2")));
    }

    #[test]
    fn test_compatible_release() {
        assert!(set("~=1.4.2").contains(&v("1.4.2")));
        assert!(set("~=1.4.2").contains(&v("1.4.9")));
        assert!(!set("~=1.4.2").contains(&v("1.5.0")));
        assert!(set("~=1.4").contains(&v("1.9")));
        assert!(!set("~=1.4").contains(&v("2.0")));
        assert!(SpecifierSet::parse("~=1").is_err());
    }

    #[test]
    fn test_arbitrary_equality() {
        assert!(set("===1.0").contains(&v("1.0")));
        assert!(!set("===1.0").contains(&v("1.0.0")));
    }

    #[test]
    fn test_local_versions() {
        assert!(set("==1.0").contains(&v("1.0+local")));
        assert!(set("==1.0+local").contains(&v("1.0+local")));
        assert!(!set("==1.0+local").contains(&v("1.0")));
        assert!(set(">=1.0").contains(&v("1.0+local")));
    }

    #[test]
    fn test_exclusive_bounds_and_prereleases() {
        assert!(!set("<2.0").contains(&v("2.0rc1")));
        assert!(set("<2.0").contains(&v("1.9")));
        assert!(!set(">1.7").contains(&v("1.7.post1")));
        assert!(set(">1.7").contains(&v("1.8")));
    }

    #[test]
    fn test_filter_excludes_prereleases_by_default() {
        let candidates = vec![v("1.0"), v("1.1"), v("2.0a1")];
        assert_eq!(vec![v("1.0"), v("1.1")], set("").filter(candidates));
    }

    #[test]
    fn test_filter_prerelease_fallback() {
        let candidates = vec![v("2.0a1"), v("2.0b2")];
        assert_eq!(
            vec![v("2.0a1"), v("2.0b2")],
            set("").filter(candidates.clone())
        );
        // Spelling a pre-release opts in.
        assert_eq!(
            vec![v("2.0b2")],
            set(">=2.0b1").filter(vec![v("1.0"), v("2.0b2")])
        );
    }

    #[test]
    fn test_filter_preserves_order() {
        let candidates = vec![v("1.0"), v("3.0"), v("2.0")];
        assert_eq!(
            vec![v("1.0"), v("3.0"), v("2.0")],
            set(">=1.0").filter(candidates)
        );
    }
}
