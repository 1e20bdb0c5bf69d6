//! Filename → (name, version, kind) inference.
//!
//! Index file entries do not authoritatively state their kind or version;
//! both are recovered from the basename. The grammar is the one the
//! standard build tools emit: `<name>-<version>[<platform>][-<tags>]<ext>`,
//! with the version required to start with a digit.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ReleaseError;
use crate::model::FileType;

/// Extensions that indicate a source distribution container.
pub const SDIST_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".zip", ".tar.bz2"];

/// Stripped from the basename, in order, before version parsing. `.gz`
/// before `.tar` so `.tar.gz` comes off in two steps.
const STRIP_SUFFIXES: &[&str] = &[
    ".egg", ".whl", ".zip", ".gz", ".bz2", ".tar", ".exe", ".msi", ".rpm", ".dmg", ".tgz",
];

static NUMERIC_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>.*?)-(?P<version>[0-9][^-]*?)(?P<suffix>(?P<platform>\.(macosx|linux|cygwin|win(xp)?(32)?))?(-.*)?)?$",
    )
    .unwrap()
});

fn strip_suffixes(basename: &str) -> &str {
    let mut stem = basename;
    for suffix in STRIP_SUFFIXES {
        if let Some(shorter) = stem.strip_suffix(suffix) {
            stem = shorter;
        }
    }
    stem
}

/// Split a basename into (package name, version string).
pub fn guess_version(basename: &str) -> Result<(&str, &str), ReleaseError> {
    let stem = strip_suffixes(basename);
    let caps = NUMERIC_VERSION
        .captures(stem)
        .ok_or_else(|| ReleaseError::UnexpectedFilename(basename.to_string()))?;
    let name = caps.name("name").expect("name group always captures");
    let version = caps.name("version").expect("version group always captures");
    Ok((name.as_str(), version.as_str()))
}

/// Classify a basename by extension (and, for the sdist container
/// extensions, by the presence of a platform marker that reveals a dumb
/// binary distribution in sdist clothing).
pub fn guess_file_type(basename: &str) -> Result<FileType, ReleaseError> {
    if basename.ends_with(".egg") {
        return Ok(FileType::BdistEgg);
    }
    if basename.ends_with(".whl") {
        return Ok(FileType::BdistWheel);
    }
    if basename.ends_with(".exe") {
        return Ok(FileType::BdistWininst);
    }
    if basename.ends_with(".msi") {
        return Ok(FileType::BdistMsi);
    }
    if basename.ends_with(".rpm") {
        return Ok(FileType::BdistRpm);
    }
    if basename.ends_with(".dmg") {
        return Ok(FileType::BdistDmg);
    }
    if !SDIST_EXTENSIONS.iter().any(|ext| basename.ends_with(ext)) {
        return Ok(FileType::Unknown);
    }

    let stem = strip_suffixes(basename);
    let caps = NUMERIC_VERSION
        .captures(stem)
        .ok_or_else(|| ReleaseError::UnexpectedFilename(basename.to_string()))?;
    let platform = caps.name("platform").is_some();
    let macosx_tail = caps
        .name("suffix")
        .is_some_and(|suffix| suffix.as_str().starts_with("-macosx"));
    if platform || macosx_tail {
        Ok(FileType::BdistDumb)
    } else {
        Ok(FileType::Sdist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_NAME: &str = "scipy-0.14.1rc1.dev_205726a-cp33-cp33m-macosx_10_6_intel.macosx_10_9_intel.macosx_10_9_x86_64.macosx_10_10_intel.macosx_10_10_x86_64.whl";

    #[test]
    fn test_guess_version() {
        assert_eq!(("foo", "0.1"), guess_version("foo-0.1.tar.gz").unwrap());
        assert_eq!(("foo", "0.1"), guess_version("foo-0.1-py3-none.whl").unwrap());
        assert_eq!(("foo", "0.1"), guess_version("foo-0.1-any-none.whl").unwrap());
        assert_eq!(("pypi", "2"), guess_version("pypi-2.tar.gz").unwrap());
        assert_eq!(
            ("scipy", "0.14.1rc1.dev_205726a"),
            guess_version(LONG_NAME).unwrap()
        );
        assert_eq!(
            ("javatools", "1.4.0"),
            guess_version("javatools-1.4.0.macosx-10.14-x86_64.tar.gz").unwrap()
        );
        assert!(matches!(
            guess_version("foo.tar.gz"),
            Err(ReleaseError::UnexpectedFilename(_))
        ));
    }

    #[test]
    fn test_guess_file_type() {
        assert_eq!(FileType::Sdist, guess_file_type("foo-0.1.tar.gz").unwrap());
        assert_eq!(FileType::Sdist, guess_file_type("pypi-2.tar.gz").unwrap());
        assert_eq!(
            FileType::BdistWheel,
            guess_file_type("foo-0.1-manylinux1.whl").unwrap()
        );
        assert_eq!(FileType::BdistEgg, guess_file_type("foo-0.1.egg").unwrap());
        assert_eq!(
            FileType::BdistWininst,
            guess_file_type("foo-0.1.exe").unwrap()
        );
        assert_eq!(FileType::BdistMsi, guess_file_type("foo-0.1.msi").unwrap());
        assert_eq!(FileType::BdistRpm, guess_file_type("foo-0.1.rpm").unwrap());
        assert_eq!(FileType::BdistDmg, guess_file_type("foo-0.1.dmg").unwrap());
        assert_eq!(
            FileType::Unknown,
            guess_file_type("foo-0.1.unknownext").unwrap()
        );
    }

    #[test]
    fn test_dumb_bdist_detection() {
        // A platform marker inside the stem.
        assert_eq!(
            FileType::BdistDumb,
            guess_file_type("javatools-1.4.0.macosx-10.14-x86_64.tar.gz").unwrap()
        );
        // A trailing -macosx tag without the dot-platform form.
        assert_eq!(
            FileType::BdistDumb,
            guess_file_type("pyre-check-0.0.29-macosx_10_11_x86_64.tar.gz").unwrap()
        );
        assert_eq!(
            FileType::BdistDumb,
            guess_file_type("foo-1.0.linux-x86_64.tar.gz").unwrap()
        );
        assert_eq!(
            FileType::BdistDumb,
            guess_file_type("foo-1.0.win32.zip").unwrap()
        );
    }

    #[test]
    fn test_unparseable_sdist_name_is_an_error() {
        assert!(matches!(
            guess_file_type("ibm_db.tar.gz"),
            Err(ReleaseError::UnexpectedFilename(_))
        ));
    }
}
