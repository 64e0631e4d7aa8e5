use crate::error::{ReleaseError, Result};
use crate::local::LocalWorkingCopy;
use git2::{BranchType, Repository};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// git2-backed implementation of [LocalWorkingCopy].
///
/// Authentication for fetch/push goes through SSH keys from `~/.ssh/` or
/// the SSH agent, matching how the release captain's clone is set up.
pub struct GitWorkingCopy {
    repo: Repository,
}

impl GitWorkingCopy {
    /// Discover the repository containing `path`.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| ReleaseError::config(format!("Not in a git repository: {}", e)))?;
        Ok(GitWorkingCopy { repo })
    }

    fn credential_callbacks() -> git2::RemoteCallbacks<'static> {
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                let key_paths = vec![
                    format!("{}/.ssh/id_ed25519", home),
                    format!("{}/.ssh/id_rsa", home),
                    format!("{}/.ssh/id_ecdsa", home),
                ];

                for key_path in key_paths {
                    let path = Path::new(&key_path);
                    if path.exists() {
                        if let Ok(cred) = git2::Cred::ssh_key(
                            username_from_url.unwrap_or("git"),
                            None,
                            path,
                            None,
                        ) {
                            return Ok(cred);
                        }
                    }
                }

                if let Ok(cred) =
                    git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
                {
                    return Ok(cred);
                }
            }

            git2::Cred::default()
        });
        callbacks
    }

    fn fetch(&self, remote_name: &str) -> Result<()> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|_| {
            ReleaseError::config(format!("Remote '{}' not found", remote_name))
        })?;

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(Self::credential_callbacks());

        let refspec_heads = format!("+refs/heads/*:refs/remotes/{}/*", remote_name);
        let refspecs = &[refspec_heads.as_str(), "+refs/tags/*:refs/tags/*"];
        remote
            .fetch(refspecs, Some(&mut fetch_options), None)
            .map_err(|e| {
                ReleaseError::transient(format!(
                    "Failed to fetch from remote '{}': {}",
                    remote_name, e
                ))
            })
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| ReleaseError::precondition("HEAD is detached"))
    }

    fn checkout_branch(&self, branch: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", branch);
        let obj = self.repo.revparse_single(&refname)?;
        self.repo.checkout_tree(&obj, None)?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    /// Create the local branch from its remote-tracking counterpart when it
    /// does not exist yet.
    fn ensure_local_branch(&self, remote: &str, branch: &str) -> Result<()> {
        if self.repo.find_branch(branch, BranchType::Local).is_ok() {
            return Ok(());
        }
        let remote_ref = self
            .repo
            .find_reference(&format!("refs/remotes/{}/{}", remote, branch))
            .map_err(|_| {
                ReleaseError::precondition(format!(
                    "Branch '{}' not found locally or on remote '{}'",
                    branch, remote
                ))
            })?;
        let oid = remote_ref.target().ok_or_else(|| {
            ReleaseError::precondition(format!("Remote branch '{}' has no target", branch))
        })?;
        let commit = self.repo.find_commit(oid)?;
        self.repo.branch(branch, &commit, false)?;
        Ok(())
    }

    fn branch_oids(&self, remote: &str, branch: &str) -> Result<(git2::Oid, git2::Oid)> {
        let local = self
            .repo
            .find_branch(branch, BranchType::Local)?
            .into_reference()
            .target()
            .ok_or_else(|| {
                ReleaseError::precondition(format!("Branch '{}' has no target", branch))
            })?;
        let remote_tracking = self
            .repo
            .find_reference(&format!("refs/remotes/{}/{}", remote, branch))?
            .target()
            .ok_or_else(|| {
                ReleaseError::precondition(format!(
                    "Remote branch '{}/{}' has no target",
                    remote, branch
                ))
            })?;
        Ok((local, remote_tracking))
    }

    fn signature(&self) -> Result<git2::Signature<'_>> {
        Ok(self.repo.signature()?)
    }
}

impl LocalWorkingCopy for GitWorkingCopy {
    fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| ReleaseError::config("Repository has no working tree"))
    }

    fn ensure_remote(&self, name: &str, url: &str, fetch_optional: bool) -> Result<()> {
        match self.repo.find_remote(name) {
            Ok(remote) => {
                let push_url = remote.pushurl().or(remote.url());
                if push_url != Some(url) {
                    return Err(ReleaseError::config(format!(
                        "Remote '{}' points at {:?}, expected {}",
                        name,
                        push_url.unwrap_or("<none>"),
                        url
                    )));
                }
                if remote.url() != Some(url) && !fetch_optional {
                    return Err(ReleaseError::config(format!(
                        "Remote '{}' has no fetch URL {}",
                        name, url
                    )));
                }
                Ok(())
            }
            Err(_) => {
                self.repo.remote(name, url)?;
                info!("Added remote {} {}", name, url);
                Ok(())
            }
        }
    }

    fn check_clean(&self) -> Result<()> {
        let mut options = git2::StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .show(git2::StatusShow::IndexAndWorkdir);
        let statuses = self.repo.statuses(Some(&mut options))?;

        let mut dirty: Vec<String> = Vec::new();
        for entry in statuses.iter() {
            if let Some(path) = entry.path() {
                dirty.push(path.to_string());
            }
        }
        if dirty.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::precondition(format!(
                "Found uncommitted changes:\n{}",
                dirty.join("\n")
            )))
        }
    }

    fn switch_to_branch(&self, remote: &str, branch: &str) -> Result<()> {
        self.fetch(remote)?;
        self.ensure_local_branch(remote, branch)?;
        if self.current_branch()? != branch {
            info!("Switching to branch {}", branch);
            self.checkout_branch(branch)?;
        }
        Ok(())
    }

    fn sync_current_branch(&self, remote: &str) -> Result<()> {
        let branch = self.current_branch()?;
        let (local_oid, remote_oid) = self.branch_oids(remote, &branch)?;
        if local_oid == remote_oid {
            return Ok(());
        }

        let (ahead, behind) = self.repo.graph_ahead_behind(local_oid, remote_oid)?;
        if ahead > 0 {
            // local-only commits, let a human take action
            return Err(ReleaseError::precondition(format!(
                "{} is ahead by {} commits",
                branch, ahead
            )));
        }
        if behind > 0 {
            let remote_commit = self.repo.find_commit(remote_oid)?;
            self.repo.checkout_tree(remote_commit.as_object(), None)?;
            self.repo
                .find_reference(&format!("refs/heads/{}", branch))?
                .set_target(remote_oid, &format!("fast-forward from {}/{}", remote, branch))?;
        }
        Ok(())
    }

    fn commit_file_to_new_branch(&self, message: &str, branch: &str, path: &str) -> Result<()> {
        if self.repo.find_branch(branch, BranchType::Local).is_ok() {
            return Err(ReleaseError::precondition(format!(
                "Branch \"{}\" already existed. Delete it and try again",
                branch
            )));
        }

        let head_commit = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(branch, &head_commit, false)?;
        self.repo.set_head(&format!("refs/heads/{}", branch))?;

        let mut index = self.repo.index()?;
        index.add_path(Path::new(path))?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let signature = self.signature()?;
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit],
        )?;
        Ok(())
    }

    fn push(&self, remote_name: &str, refname: &str) -> Result<()> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|_| {
            ReleaseError::config(format!("No remote named '{}' found", remote_name))
        })?;

        // a bare name can be a branch or a tag; prefer the branch
        let refspec = if self.repo.find_branch(refname, BranchType::Local).is_ok() {
            format!("refs/heads/{}", refname)
        } else {
            format!("refs/tags/{}", refname)
        };

        let mut callbacks = Self::credential_callbacks();
        callbacks.push_update_reference(|pushed_ref, status| {
            if let Some(status) = status {
                warn!("Could not update reference {}: {}", pushed_ref, status);
                Err(git2::Error::from_str(&format!(
                    "Push failed for {}",
                    pushed_ref
                )))
            } else {
                Ok(())
            }
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        remote
            .push(&[&refspec], Some(&mut push_options))
            .map_err(|e| {
                if e.class() == git2::ErrorClass::Net {
                    ReleaseError::transient(format!("Network error during push: {}", e))
                } else {
                    ReleaseError::Git(e)
                }
            })
    }

    fn discard_version_changes(
        &self,
        new_branch: &str,
        fallback_branch: &str,
        path: &str,
    ) -> Result<()> {
        // every action here is best effort; the caller is already failing
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.path(path).force();
        if let Err(e) = self.repo.checkout_head(Some(&mut checkout)) {
            warn!("Could not restore {}: {}", path, e);
        }

        if let Err(e) = self.checkout_branch(fallback_branch) {
            warn!("Could not switch back to {}: {}", fallback_branch, e);
        }

        match self.repo.find_branch(new_branch, BranchType::Local) {
            Ok(mut branch) => {
                if let Err(e) = branch.delete() {
                    warn!("Could not delete branch {}: {}", new_branch, e);
                }
            }
            Err(_) => {}
        }
        Ok(())
    }
}
