//! Image references (`repository[:tag]`)

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

const DEFAULT_TAG: &str = "latest";

/// Valid tag per the registry distribution grammar
static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag regex"));

/// A repository plus tag, always with an explicit tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse `repository[:tag]`; a missing tag means `latest`.
    ///
    /// A colon that belongs to a registry port (`host:5000/repo`) is not a tag separator.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);

        match reference[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                Self::new(&reference[..split], &reference[split + 1..])
            }
            None => Self::new(reference, DEFAULT_TAG),
        }
    }

    pub fn is_valid_tag(tag: &str) -> bool {
        TAG_PATTERN.is_match(tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
