//! Requirement strings: `name[extra1,extra2] (>=1.0,<2.0) ; marker`.
//!
//! The parenthesised specifier set and the marker suffix are both optional,
//! and the specifier set may also appear bare (`foo>=1.0`). The original
//! string is kept for display; the name is canonicalised on demand.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PackagingError;
use crate::markers::Marker;
use crate::names::canonicalize_name;
use crate::specifiers::SpecifierSet;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?").unwrap());

/// A parsed requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    name: String,
    extras: BTreeSet<String>,
    specifiers: SpecifierSet,
    marker: Option<Marker>,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Self, PackagingError> {
        let invalid = || PackagingError::InvalidRequirement(input.to_string());
        let trimmed = input.trim();

        // Split off the marker at the first ';' outside quotes.
        let (body, marker_text) = split_marker(trimmed);

        let name_match = NAME_RE.find(body).ok_or_else(invalid)?;
        let name = name_match.as_str().to_string();
        let mut rest = body[name_match.end()..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(invalid)?;
            for extra in after[..close].split(',') {
                let extra = extra.trim();
                if !extra.is_empty() {
                    extras.insert(extra.to_string());
                }
            }
            rest = after[close + 1..].trim_start();
        }

        // Specifiers may be parenthesised (`(>=1.0)`) or bare (`>=1.0`).
        let spec_text = rest.trim();
        let spec_text = spec_text
            .strip_prefix('(')
            .and_then(|inner| inner.strip_suffix(')'))
            .unwrap_or(spec_text);
        let specifiers = SpecifierSet::parse(spec_text).map_err(|_| invalid())?;

        let marker = match marker_text {
            Some(text) => Some(Marker::parse(text.trim()).map_err(|_| invalid())?),
            None => None,
        };

        Ok(Requirement {
            name,
            extras,
            specifiers,
            marker,
        })
    }

    /// The name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical form used as a key everywhere.
    pub fn canonical_name(&self) -> String {
        canonicalize_name(&self.name)
    }

    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    pub fn specifiers(&self) -> &SpecifierSet {
        &self.specifiers
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }
}

/// Find the `;` that starts the marker, skipping any inside quoted strings.
fn split_marker(input: &str) -> (&str, Option<&str>) {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => return (&input[..i], Some(&input[i + 1..])),
            _ => {}
        }
    }
    (input, None)
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = PackagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Requirement::parse(s)
    }
}

/// Convert the legacy `requires.txt` section format into standard
/// requirement strings.
///
/// Section headers set a marker context applied to the lines that follow:
/// `[extra_name]` becomes `extra == 'extra_name'`, `[:marker]` applies the
/// marker verbatim, and `[extra:marker]` becomes
/// `(marker) and extra == 'extra_name'`. An empty `[]` clears the context.
pub fn convert_sdist_requires(data: &str) -> Vec<String> {
    let mut current_markers: Option<String> = None;
    let mut requirements = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            current_markers = match section.split_once(':') {
                Some(("", markers)) => Some(markers.to_string()),
                Some((extra, markers)) => Some(format!("({markers}) and extra == '{extra}'")),
                None if section.is_empty() => None,
                None => Some(format!("extra == '{section}'")),
            };
        } else if let Some(markers) = &current_markers {
            requirements.push(format!("{line}; {markers}"));
        } else {
            requirements.push(line.to_string());
        }
    }
    requirements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn req(s: &str) -> Requirement {
        Requirement::parse(s).unwrap()
    }

    #[test]
    fn test_parse_name_only() {
        let r = req("requests");
        assert_eq!("requests", r.name());
        assert!(r.extras().is_empty());
        assert!(r.specifiers().is_empty());
        assert!(r.marker().is_none());
    }

    #[test]
    fn test_parse_with_specifiers() {
        let r = req("attrs (==0.1.0)");
        assert_eq!("attrs", r.name());
        assert!(r.specifiers().contains(&Version::parse("0.1.0").unwrap()));
        assert!(!r.specifiers().contains(&Version::parse("0.2").unwrap()));

        let bare = req("attrs>=19.2,<20");
        assert_eq!("attrs", bare.name());
        assert!(bare.specifiers().contains(&Version::parse("19.3").unwrap()));
    }

    #[test]
    fn test_parse_extras() {
        let r = req("requests[security,socks]>=2.0");
        assert_eq!("requests", r.name());
        assert_eq!(
            vec!["security", "socks"],
            r.extras().iter().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_parse_marker() {
        let r = req("colorama; sys_platform == 'win32'");
        assert!(r.marker().is_some());

        let r = req("typing-extensions; python_version < '3.8'");
        assert_eq!("typing-extensions", r.canonical_name());
    }

    #[test]
    fn test_canonical_name_preserves_original() {
        let r = req("Typing_Extensions>=3.7");
        assert_eq!("Typing_Extensions", r.name());
        assert_eq!("typing-extensions", r.canonical_name());
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "requests",
            "requests[security]>=2.0",
            "attrs==19.2.0; python_version >= \"3.4\"",
        ] {
            let parsed = req(text);
            assert_eq!(parsed, req(&parsed.to_string()));
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Requirement::parse("").is_err());
        assert!(Requirement::parse("[extras]").is_err());
        assert!(Requirement::parse("name[unclosed").is_err());
        assert!(Requirement::parse("name==$$").is_err());
    }

    #[test]
    fn test_convert_sdist_requires_plain() {
        assert_eq!(vec!["a".to_string()], convert_sdist_requires("a\n"));
    }

    #[test]
    fn test_convert_sdist_requires_marker_section() {
        assert_eq!(
            vec!["a; python_version < '3.4'".to_string()],
            convert_sdist_requires("[:python_version < '3.4']\na\n")
        );
    }

    #[test]
    fn test_convert_sdist_requires_extra_sections() {
        assert_eq!(
            vec!["pytest; extra == 'test'".to_string()],
            convert_sdist_requires("[test]\npytest\n")
        );
        assert_eq!(
            vec!["wincolor; (sys_platform == 'win32') and extra == 'color'".to_string()],
            convert_sdist_requires("[color:sys_platform == 'win32']\nwincolor\n")
        );
    }

    #[test]
    fn test_convert_sdist_requires_section_reset() {
        let converted = convert_sdist_requires("base\n[]\nstill-base\n[extra]\nextra-dep\n");
        assert_eq!(
            vec![
                "base".to_string(),
                "still-base".to_string(),
                "extra-dep; extra == 'extra'".to_string(),
            ],
            converted
        );
    }

    #[test]
    fn test_converted_requires_parse_back() {
        for line in convert_sdist_requires("[color:sys_platform == 'win32']\nwincolor>=1.0\n") {
            let r = Requirement::parse(&line).unwrap();
            assert_eq!(Some("color"), r.marker().and_then(|m| m.extra_equals()));
        }
    }
}
