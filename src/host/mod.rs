//! Source-repository host abstraction
//!
//! This module defines the narrow contract the release workflows need from
//! the Git hosting service: branch and tag lifecycle, merge-request
//! lifecycle, release entries and commit lookups.
//!
//! The concrete implementation is [gitlab::GitLabHost]; tests use the
//! generated [MockSourceRepositoryHost].

pub mod gitlab;

pub use gitlab::GitLabHost;

use crate::error::Result;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Identity of a merge request on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestHandle {
    /// Host-assigned id (GitLab iid)
    pub id: u64,
    /// Human-facing URL, included in approval requests
    pub url: String,
}

/// Lifecycle state of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRequestState {
    Opened,
    Merged,
    Closed,
    Locked,
}

/// Mergeability snapshot of a merge request, as polled during the
/// bounded approval wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestStatus {
    pub state: MergeRequestState,
    pub mergeable: bool,
    pub draft: bool,
    pub work_in_progress: bool,
    pub has_conflicts: bool,
    pub url: String,
}

impl MergeRequestStatus {
    /// Whether the merge request can be merged right now.
    pub fn is_ready(&self) -> bool {
        self.state == MergeRequestState::Opened
            && self.mergeable
            && !self.draft
            && !self.work_in_progress
            && !self.has_conflicts
    }
}

/// Everything needed to open a merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestSpec {
    pub title: String,
    pub source_branch: String,
    pub target_branch: String,
    /// Delete the source branch once merged
    pub remove_source: bool,
    pub squash: bool,
    /// Optional label (the release MR carries "Release")
    pub label: Option<String>,
}

/// Common operations against the Git hosting service.
///
/// Implementations are stateless proxies holding only a handle to the
/// resolved project; all authoritative state lives on the remote.
/// All methods are synchronous and return [crate::error::Result].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SourceRepositoryHost: Send + Sync {
    /// Create a branch named `name` from `target` (branch, tag or commit).
    fn create_branch(&self, name: &str, target: &str) -> Result<()>;

    /// Delete a branch. Used for rollback of this run's artifacts only.
    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Create a tag named `name` pointing at `target`.
    fn create_tag(&self, name: &str, target: &str) -> Result<()>;

    /// Delete a tag. Used for rollback of this run's artifacts only.
    fn delete_tag(&self, name: &str) -> Result<()>;

    /// Id of the most recent commit on `branch`.
    fn last_commit(&self, branch: &str) -> Result<String>;

    /// Highest N among existing tags `{release_tag}-rc.N`, or 0 when the
    /// release line has no candidate yet.
    fn last_rc_number(&self, release_tag: &str) -> Result<u32>;

    /// Find an already-open merge request with this exact title, source and
    /// target, if any.
    fn find_open_mr(
        &self,
        title: &str,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<MergeRequestHandle>>;

    /// Open a merge request.
    ///
    /// Returns `None` when a merge request with the same title, source and
    /// target is already open; no duplicate is created. Callers decide
    /// whether that short-circuit is acceptable or a precondition failure.
    fn open_mr(&self, spec: &MergeRequestSpec) -> Result<Option<MergeRequestHandle>>;

    /// Current mergeability snapshot of a merge request.
    fn mr_status(&self, id: u64) -> Result<MergeRequestStatus>;

    /// Merge a merge request that reported ready.
    fn merge_mr(&self, id: u64) -> Result<()>;

    /// Close a merge request without merging.
    fn close_mr(&self, id: u64) -> Result<()>;

    /// Create a release entry named `name` for tag `tag` with `notes` as
    /// description.
    fn create_release(&self, name: &str, tag: &str, notes: &str) -> Result<()>;

    /// Web URL of the commit list for a tag, for the announcement message.
    fn tag_url(&self, tag: &str) -> Result<String>;

    /// SSH URL of the repository, for wiring the local working copy.
    fn repo_url(&self) -> Result<String>;
}
