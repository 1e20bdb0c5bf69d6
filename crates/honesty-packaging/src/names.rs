use once_cell::sync::Lazy;
use regex::Regex;

static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

/// Canonicalize a project name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`.
///
/// Canonical names are the only form used as keys (cache shards, node keys,
/// `already_chosen`); the original casing is kept separately for display.
/// The transform is idempotent.
pub fn canonicalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_name() {
        assert_eq!("foo", canonicalize_name("foo"));
        assert_eq!("foo-bar", canonicalize_name("Foo.Bar"));
        assert_eq!("foo-bar", canonicalize_name("foo__bar"));
        assert_eq!("foo-bar", canonicalize_name("FOO-_.bar"));
        assert_eq!("zope-interface", canonicalize_name("zope.interface"));
    }

    #[test]
    fn test_canonicalize_idempotent() {
        for name in ["Foo.Bar", "a-b_c.d", "ALREADY-CANONICAL", "x"] {
            let once = canonicalize_name(name);
            assert_eq!(once, canonicalize_name(&once));
        }
    }
}
