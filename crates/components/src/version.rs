//! Version string parsing
//!
//! Component and Kubernetes versions arrive as strings such as `v1.28.4` or
//! `1.7.13`. Only the numeric `major.minor.patch` prefix is interpreted.

use std::fmt;

/// Parsed `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component (0 when absent)
    pub patch: u32,
}

impl Version {
    /// Construct a version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse `v1.28.4`, `1.28`, `1.28.4-rc.1` and similar.
    ///
    /// Returns `None` when major or minor is missing or not numeric.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(Version::parse("v1.28.4"), Some(Version::new(1, 28, 4)));
        assert_eq!(Version::parse("1.7.13"), Some(Version::new(1, 7, 13)));
        assert_eq!(Version::parse("1.25"), Some(Version::new(1, 25, 0)));
        assert_eq!(Version::parse("v1.30.0-rc.1"), Some(Version::new(1, 30, 0)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Version::parse(""), None);
        assert_eq!(Version::parse("latest"), None);
        assert_eq!(Version::parse("v1"), None);
        assert_eq!(Version::parse("1.x.3"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(Version::parse("v1.28.0").unwrap() >= Version::new(1, 28, 0));
        assert!(Version::parse("v1.27.9").unwrap() < Version::new(1, 28, 0));
    }
}
