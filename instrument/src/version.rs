//! Semantic version parsing for instrument validator versions.
//!
//! Only plain `MAJOR.MINOR.PATCH` versions are accepted. Pre-release and build
//! suffixes are rejected, so ordering is a plain comparison of the three numbers.

use crate::errors::ProxyError;
use std::cmp::Ordering;
use std::fmt;

/// Which side of a conversion a version string came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionSource {
    Current,
    Target,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionSource::Current => "current",
            VersionSource::Target => "target",
        })
    }
}

/// A `MAJOR.MINOR.PATCH` version.
///
/// Components are kept as their digit strings, so there is no upper bound on
/// their size. Leading zeros are not allowed, which makes a longer component
/// always the larger one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    components: [String; 3],
}

impl Version {
    pub fn major(&self) -> &str {
        &self.components[0]
    }

    pub fn minor(&self) -> &str {
        &self.components[1]
    }

    pub fn patch(&self) -> &str {
        &self.components[2]
    }
}

fn is_numeric_identifier(component: &str) -> bool {
    match component.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        digits => digits.iter().all(u8::is_ascii_digit),
    }
}

fn cmp_component(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components
            .iter()
            .zip(&other.components)
            .map(|(a, b)| cmp_component(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Parses `MAJOR.MINOR.PATCH`. Returns `None` for anything else.
pub fn parse_core(version: &str) -> Option<Version> {
    let mut parts = version.split('.');
    let mut components: [String; 3] = Default::default();
    for slot in components.iter_mut() {
        let part = parts.next().filter(|p| is_numeric_identifier(p))?;
        *slot = part.to_string();
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Version { components })
}

/// Parses a version taking part in a conversion, naming the side that failed.
pub fn parse_version(source: VersionSource, version: &str) -> Result<Version, ProxyError> {
    parse_core(version).ok_or_else(|| {
        tracing::error!(source = %source, version, "Error parsing version");
        ProxyError::InvalidVersionFormat {
            source_kind: source,
            version: version.to_string(),
        }
    })
}
