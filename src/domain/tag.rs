use super::version::Version;
use crate::error::{ReleaseError, Result};

/// Name of the Nth release-candidate tag for a version: `vX.Y.Z-rc.N`.
pub fn rc_tag_name(version: Version, rc_number: u32) -> String {
    format!("{}-rc.{}", version.tag_name(), rc_number)
}

/// Find the highest release-candidate number among existing tags.
///
/// Scans `tags` for names matching `{release_tag}-rc.N` and returns the
/// maximum N, or 0 when no RC has been cut yet.
///
/// # Arguments
/// * `tags` - All tag names known to the repository host
/// * `release_tag` - The `vX.Y.Z` tag name of the release line
pub fn last_rc_number<S: AsRef<str>>(tags: &[S], release_tag: &str) -> Result<u32> {
    let pattern = format!("^{}-rc\\.(\\d+)$", regex::escape(release_tag));
    let re = regex::Regex::new(&pattern)
        .map_err(|e| ReleaseError::version(format!("Invalid RC tag pattern: {}", e)))?;

    let mut rc = 0;
    for tag in tags {
        if let Some(captures) = re.captures(tag.as_ref()) {
            if let Ok(n) = captures[1].parse::<u32>() {
                rc = rc.max(n);
            }
        }
    }
    Ok(rc)
}
