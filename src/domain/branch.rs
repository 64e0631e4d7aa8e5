use super::version::Version;

/// Name of the long-lived release branch for a version: `release/vX.Y.Z`.
///
/// Derived deterministically from the version; created once per release
/// line and never renamed.
pub fn release_branch_name(version: Version) -> String {
    format!("release/{}", version.tag_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_branch_name() {
        assert_eq!(
            release_branch_name(Version::new(4, 19, 0)),
            "release/v4.19.0"
        );
    }
}
