//! Scan `requirements.txt`-style files for the canonical names they pin.
//! Deliberately simple: comments and `-` flag lines are skipped, and a line
//! that does not parse as a requirement is an error rather than a guess.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use honesty_packaging::Requirement;

/// Canonical requirement names from one file, in file order.
pub fn requirement_names(path: &Path) -> Result<Vec<String>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut names = Vec::new();
    for line in body.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('-') {
            // Pip flags (-r, -e, --hash…) are out of scope here.
            debug!(line, "ignoring flag line");
            continue;
        }
        let requirement = Requirement::parse(line)
            .with_context(|| format!("bad requirement {line:?} in {}", path.display()))?;
        names.push(requirement.canonical_name());
    }
    Ok(names)
}

/// Canonical names from every file matching the comma-separated glob
/// patterns, files visited in sorted order.
pub fn glob_requirement_names(comma_separated_patterns: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for pattern in comma_separated_patterns.split(',') {
        if pattern.is_empty() {
            continue;
        }
        let mut paths: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("bad glob pattern {pattern:?}"))?
            .collect::<Result<_, _>>()
            .context("walking glob matches")?;
        paths.sort();
        for path in paths {
            names.extend(requirement_names(&path)?);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_requirement_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# pinned for prod").unwrap();
        writeln!(file, "Requests==2.22.0  # comment").unwrap();
        writeln!(file, "-r other.txt").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "zope.interface>=4.0").unwrap();
        drop(file);

        assert_eq!(
            vec!["requests".to_string(), "zope-interface".to_string()],
            requirement_names(&path).unwrap()
        );
    }

    #[test]
    fn test_bad_requirement_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, "===broken===\n").unwrap();
        assert!(requirement_names(&path).is_err());
    }

    #[test]
    fn test_glob_requirement_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta\n").unwrap();
        std::fs::write(dir.path().join("c.other"), "gamma\n").unwrap();

        let pattern = format!("{}/*.txt", dir.path().display());
        assert_eq!(
            vec!["alpha".to_string(), "beta".to_string()],
            glob_requirement_names(&pattern).unwrap()
        );
    }
}
