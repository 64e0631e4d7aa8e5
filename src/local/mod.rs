//! Local working-copy abstraction
//!
//! The version-file update steps run against a local clone: switch to the
//! target branch, rewrite the version header, commit to a fresh branch and
//! push it. The orchestrator assumes the working copy is exclusively owned
//! by the running process; no locking is attempted.

pub mod git_repo;

pub use git_repo::GitWorkingCopy;

use crate::error::Result;
use std::path::PathBuf;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Local version-control plumbing needed by the release workflows.
///
/// Only `Send` is required: `git2::Repository` is not `Sync`, and the
/// orchestrator drives the working copy from a single thread anyway.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait LocalWorkingCopy: Send {
    /// Root of the working tree; the version file lives at a configured
    /// path below it.
    fn workdir(&self) -> Result<PathBuf>;

    /// Add the remote, or verify an existing remote of that name points at
    /// `url`. With `fetch_optional` a push-only remote is acceptable.
    fn ensure_remote(&self, name: &str, url: &str, fetch_optional: bool) -> Result<()>;

    /// Fail when the working tree or index has changes to tracked files.
    fn check_clean(&self) -> Result<()>;

    /// Fetch `remote` and make `branch` the current branch.
    fn switch_to_branch(&self, remote: &str, branch: &str) -> Result<()>;

    /// Bring the current branch up to date with its remote counterpart.
    /// A branch that is ahead has local-only commits; that needs a human,
    /// so it fails rather than pushing or rebasing.
    fn sync_current_branch(&self, remote: &str) -> Result<()>;

    /// Create `branch` at HEAD, stage the file at `path` (relative to the
    /// workdir) and commit it. The branch must not exist yet.
    fn commit_file_to_new_branch(&self, message: &str, branch: &str, path: &str) -> Result<()>;

    /// Push a branch or tag to `remote`.
    fn push(&self, remote: &str, refname: &str) -> Result<()>;

    /// Best-effort rollback of a failed version-file update: restore the
    /// file, switch back to `fallback_branch` and delete `new_branch`.
    fn discard_version_changes(
        &self,
        new_branch: &str,
        fallback_branch: &str,
        path: &str,
    ) -> Result<()>;
}
