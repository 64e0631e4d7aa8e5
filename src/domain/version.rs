use crate::error::{ReleaseError, Result};
use std::fmt;

/// Semantic version triple as used by the release workflows.
///
/// The third component is called "micro" to match the version macros in the
/// project's version header and the tracker's version names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

/// Which version component a release affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseScope {
    Major,
    Minor,
    Patch,
}

impl Version {
    /// Create a new version
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version {
            major,
            minor,
            micro,
        }
    }

    /// Parse a version from `X.Y.Z` or `vX.Y.Z`.
    pub fn parse(text: &str) -> Result<Self> {
        let clean = text.strip_prefix('v').unwrap_or(text);

        let parts: Vec<&str> = clean.split('.').collect();
        if parts.len() != 3 {
            return Err(ReleaseError::version(format!(
                "Invalid version format: '{}' - expected X.Y.Z",
                text
            )));
        }

        let major = parts[0]
            .parse::<u32>()
            .map_err(|_| ReleaseError::version(format!("Invalid major version: {}", parts[0])))?;
        let minor = parts[1]
            .parse::<u32>()
            .map_err(|_| ReleaseError::version(format!("Invalid minor version: {}", parts[1])))?;
        let micro = parts[2]
            .parse::<u32>()
            .map_err(|_| ReleaseError::version(format!("Invalid micro version: {}", parts[2])))?;

        Ok(Version {
            major,
            minor,
            micro,
        })
    }

    /// The `v`-prefixed form used for tags and tracker version names.
    pub fn tag_name(&self) -> String {
        format!("v{}", self)
    }

    /// Bump according to the release scope, zeroing lower components.
    pub fn bump(&self, scope: ReleaseScope) -> Self {
        match scope {
            ReleaseScope::Major => Version::new(self.major + 1, 0, 0),
            ReleaseScope::Minor => Version::new(self.major, self.minor + 1, 0),
            ReleaseScope::Patch => Version::new(self.major, self.minor, self.micro + 1),
        }
    }

    /// The version this one patches, if any (micro - 1).
    pub fn predecessor_patch(&self) -> Option<Version> {
        if self.micro == 0 {
            return None;
        }
        Some(Version::new(self.major, self.minor, self.micro - 1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// A new version may only ever replace a strictly lower one.
///
/// Lexicographic comparison of the (major, minor, micro) triples; equality
/// is not an upgrade.
pub fn is_valid_upgrade(old: Version, new: Version) -> bool {
    new > old
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn test_version_parse_v_prefixed() {
        let v = Version::parse("v4.19.0").unwrap();
        assert_eq!(v, Version::new(4, 19, 0));
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("v1.x.3").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_version_display_and_tag_name() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.to_string(), "1.2.3");
        assert_eq!(v.tag_name(), "v1.2.3");
    }

    #[test]
    fn test_bump() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.bump(ReleaseScope::Major), Version::new(2, 0, 0));
        assert_eq!(v.bump(ReleaseScope::Minor), Version::new(1, 3, 0));
        assert_eq!(v.bump(ReleaseScope::Patch), Version::new(1, 2, 4));
    }

    #[test]
    fn test_predecessor_patch() {
        assert_eq!(
            Version::new(1, 2, 3).predecessor_patch(),
            Some(Version::new(1, 2, 2))
        );
        assert_eq!(Version::new(1, 2, 0).predecessor_patch(), None);
    }

    #[test]
    fn test_is_valid_upgrade() {
        let base = Version::new(1, 2, 3);
        assert!(is_valid_upgrade(base, Version::new(1, 2, 4)));
        assert!(is_valid_upgrade(base, Version::new(1, 3, 0)));
        assert!(is_valid_upgrade(base, Version::new(2, 0, 0)));
        assert!(!is_valid_upgrade(base, Version::new(1, 2, 3)));
        assert!(!is_valid_upgrade(base, Version::new(1, 1, 9)));
        assert!(!is_valid_upgrade(base, Version::new(0, 9, 9)));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
        assert!(Version::new(1, 3, 0) > Version::new(1, 2, 99));
    }
}
