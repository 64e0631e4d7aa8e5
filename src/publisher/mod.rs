//! Public release mirror
//!
//! Closing a release pushes the tagged code to a public mirror and creates
//! a release entry there. Only the release entry needs an API; the push
//! itself goes through the local working copy.

pub mod github;

pub use github::GitHubReleases;

use crate::error::Result;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Create a release entry on the public mirror.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ReleasePublisher: Send + Sync {
    /// Publish a release for an already-pushed tag, with notes as body.
    fn create_release(&self, tag: &str, notes: &str) -> Result<()>;
}
