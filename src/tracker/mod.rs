//! Issue-tracker abstraction
//!
//! Version bookkeeping lives in the tracker: a "version" entity groups the
//! tickets of a release, gates the release on unresolved work, and carries
//! a description recording which application versions ship it. A sentinel
//! placeholder version named [NEXT_RELEASE] collects tickets for whatever
//! release comes next.

pub mod jira;

pub use jira::JiraTracker;

use crate::domain::{NoteIssue, Version};
use crate::error::Result;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Name of the placeholder version entity tickets accumulate under until a
/// release locks it in.
pub const NEXT_RELEASE: &str = "NextRelease";

/// What the tracker knows about a version entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub exists: bool,
    pub released: bool,
    /// The "used by" apps parsed from the description
    /// (`"Version X.Y.Z - app / app / app"`)
    pub app_description: String,
}

/// Version bookkeeping and release-notes queries against the issue tracker.
///
/// An implementation caches the one version entity a release run operates
/// on after [IssueTracker::lock_version]; everything else is stateless.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait IssueTracker: Send + Sync {
    /// Select the version entity this run operates on.
    ///
    /// Fails when the version does not exist, was already released, or has
    /// tickets that are neither resolved nor closed.
    fn lock_version(&mut self, name: &str) -> Result<()>;

    /// Rename the locked placeholder to `vX.Y.Z`, set today as start date
    /// and record the consuming app versions in the description.
    fn rename_and_close_current(&self, version: Version, apps: &str) -> Result<()>;

    /// Re-create the placeholder entity for the next release line.
    fn create_placeholder_version(&self) -> Result<()>;

    /// Create a released version entity for a patch, dated today.
    fn create_version_for_patch(&self, name: &str, apps: &str) -> Result<()>;

    /// Mark the locked version as released with today's date.
    fn mark_released(&self) -> Result<()>;

    /// The "used by" apps recorded in the locked version's description,
    /// e.g. `"iOS 12.1 / Android 9.3"`. Empty when the description does not
    /// carry an app list.
    fn locked_app_description(&self) -> Result<String>;

    /// Existence/release state of a version by bare `X.Y.Z` name.
    /// An archived entity with that name is an error.
    fn version_info(&self, version: Version) -> Result<VersionInfo>;

    /// Names of all non-archived, unreleased `vX.Y.Z` versions, excluding
    /// the placeholder.
    fn unreleased_version_names(&self) -> Result<Vec<String>>;

    /// Next version to cut: the highest existing version bumped by the
    /// largest "release scope" recorded on the locked version's resolved
    /// issues (any Major forces a major bump, else any Minor a minor bump,
    /// else a patch bump).
    fn next_version(&self) -> Result<Version>;

    /// Add `version_name` to the fix-versions of the given tickets,
    /// keeping their other fix-versions intact.
    fn add_fix_version(&self, tickets: &[String], version_name: &str) -> Result<()>;

    /// Resolved-and-done issues of the locked version, for release notes.
    fn resolved_issues(&self) -> Result<Vec<NoteIssue>>;
}
