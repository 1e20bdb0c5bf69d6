use thiserror::Error;

/// Errors produced while parsing version, specifier, marker or requirement
/// grammar. All variants carry the offending input for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackagingError {
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid specifier: {0:?}")]
    InvalidSpecifier(String),

    #[error("invalid marker: {0:?}")]
    InvalidMarker(String),

    #[error("invalid requirement: {0:?}")]
    InvalidRequirement(String),

    #[error("unknown sys_platform: {0:?}")]
    UnknownPlatform(String),
}
