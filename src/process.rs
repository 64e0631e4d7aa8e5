//! Release workflow orchestration
//!
//! [ReleaseProcess] sequences the steps of one workflow run (make, close,
//! patch or new RC) over injected collaborators. The source-repository host
//! and a clock are required; the issue tracker, chat, wiki, public-release
//! publisher and local working copy are wired in by the driver only when the
//! workflow needs them.
//!
//! Every step that creates a remote artifact deletes that run's artifacts
//! before propagating a failure. Cleanup failures are logged and never
//! replace the error that triggered them.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::chat::ChatNotifier;
use crate::domain::{
    build_notes, is_valid_upgrade, rc_tag_name, release_branch_name, rotate_release_captain,
    NotesFormat, Version, VersionFile,
};
use crate::error::{ReleaseError, Result};
use crate::host::{MergeRequestHandle, MergeRequestSpec, MergeRequestState, SourceRepositoryHost};
use crate::local::LocalWorkingCopy;
use crate::publisher::ReleasePublisher;
use crate::tracker::{IssueTracker, NEXT_RELEASE};
use crate::ui;
use crate::wiki::WikiStore;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Time source for the bounded merge-request poll.
///
/// `now` reports elapsed time from an arbitrary fixed origin; only
/// differences are meaningful. Tests substitute a fake that advances on
/// `sleep` instead of blocking.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [std::time::Instant] and [std::thread::sleep].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-interval poll bounds for the merge-request approval wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// How the bounded merge-request wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The merge request is open and mergeable.
    Ready,
    /// Someone merged it out-of-band while we were waiting.
    Merged,
    /// The merge request was closed out-of-band; the operator aborted.
    ClosedExternally,
    /// The deadline elapsed without the merge request becoming mergeable.
    TimedOut,
}

/// Poll a merge request until it is mergeable, externally resolved, or the
/// deadline passes.
///
/// Remote-status failures propagate immediately; the poll tolerates a
/// not-yet-mergeable answer, not an unreachable host.
pub fn wait_for_mergeable(
    host: &dyn SourceRepositoryHost,
    mr_id: u64,
    settings: PollSettings,
    clock: &dyn Clock,
) -> Result<WaitOutcome> {
    let deadline = clock.now() + settings.timeout;
    loop {
        let status = host.mr_status(mr_id)?;
        match status.state {
            MergeRequestState::Opened => {
                if status.is_ready() {
                    return Ok(WaitOutcome::Ready);
                }
            }
            MergeRequestState::Merged => return Ok(WaitOutcome::Merged),
            MergeRequestState::Closed | MergeRequestState::Locked => {
                return Ok(WaitOutcome::ClosedExternally)
            }
        }
        if clock.now() >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }
        clock.sleep(settings.interval);
    }
}

/// Chat wiring: one notifier, one channel for approval requests and an
/// optional channel/thread for release announcements.
pub struct ChatSetup {
    pub notifier: Box<dyn ChatNotifier>,
    pub dev_channel: String,
    pub announce_channel: String,
    pub announce_thread: String,
}

/// What kind of close the current release line needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTypeToClose {
    /// No release merge request is open; the fix shipped from a branch.
    Hotfix,
    /// All earlier versions are closed; normal close path.
    NewRelease,
    /// An earlier version is still open; this line closes out of order.
    OldRelease,
}

pub struct ReleaseProcess {
    project_name: String,
    private_branch: String,
    version_file: String,
    host: Box<dyn SourceRepositoryHost>,
    clock: Box<dyn Clock>,
    poll: PollSettings,
    tracker: Option<Box<dyn IssueTracker>>,
    chat: Option<ChatSetup>,
    wiki: Option<Box<dyn WikiStore>>,
    publisher: Option<Box<dyn ReleasePublisher>>,
    local: Option<Box<dyn LocalWorkingCopy>>,
    version: Option<Version>,
    rc_tag: Option<String>,
}

impl ReleaseProcess {
    pub fn new(
        project_name: impl Into<String>,
        private_branch: impl Into<String>,
        version_file: impl Into<String>,
        host: Box<dyn SourceRepositoryHost>,
        clock: Box<dyn Clock>,
    ) -> Self {
        ReleaseProcess {
            project_name: project_name.into(),
            private_branch: private_branch.into(),
            version_file: version_file.into(),
            host,
            clock,
            poll: PollSettings::default(),
            tracker: None,
            chat: None,
            wiki: None,
            publisher: None,
            local: None,
            version: None,
            rc_tag: None,
        }
    }

    /// Override the merge-request poll bounds. Tests shrink these.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn setup_tracker(&mut self, tracker: Box<dyn IssueTracker>) {
        self.tracker = Some(tracker);
    }

    pub fn setup_chat(&mut self, chat: ChatSetup) {
        self.chat = Some(chat);
    }

    pub fn setup_wiki(&mut self, wiki: Box<dyn WikiStore>) {
        self.wiki = Some(wiki);
    }

    pub fn setup_publisher(&mut self, publisher: Box<dyn ReleasePublisher>) {
        self.publisher = Some(publisher);
    }

    /// Wire the local working copy and its remotes. The private remote URL
    /// comes from the host; a public remote is added only for close runs
    /// that push to a mirror, and its fetch is allowed to fail (the mirror
    /// may lag behind).
    pub fn setup_local(
        &mut self,
        local: Box<dyn LocalWorkingCopy>,
        private_remote: &str,
        public_remote: Option<(&str, &str)>,
    ) -> Result<()> {
        let private_url = self.host.repo_url()?;
        local.ensure_remote(private_remote, &private_url, false)?;
        if let Some((name, url)) = public_remote {
            local.ensure_remote(name, url, true)?;
        }
        self.local = Some(local);
        Ok(())
    }

    /// The version this run operates on, once one of the `set_release_*`
    /// steps has fixed it.
    pub fn release_version(&self) -> Result<Version> {
        self.version()
    }

    // accessors for collaborators the current step requires

    fn version(&self) -> Result<Version> {
        self.version
            .ok_or_else(|| ReleaseError::precondition("Release version not selected yet"))
    }

    fn tracker(&self) -> Result<&dyn IssueTracker> {
        self.tracker
            .as_deref()
            .ok_or_else(|| ReleaseError::config("Issue tracker not configured"))
    }

    fn tracker_mut(&mut self) -> Result<&mut Box<dyn IssueTracker>> {
        self.tracker
            .as_mut()
            .ok_or_else(|| ReleaseError::config("Issue tracker not configured"))
    }

    fn local(&self) -> Result<&dyn LocalWorkingCopy> {
        self.local
            .as_deref()
            .ok_or_else(|| ReleaseError::config("Local working copy not configured"))
    }

    fn release_branch(&self) -> Result<String> {
        Ok(release_branch_name(self.version()?))
    }

    fn rc_tag(&self) -> Result<&str> {
        self.rc_tag
            .as_deref()
            .ok_or_else(|| ReleaseError::precondition("No release candidate tag created yet"))
    }

    /// The app versions shipping the locked release, recovered from the
    /// tracker's version description for the notes of a close run.
    fn release_apps(&self) -> Result<Vec<String>> {
        let description = self.tracker()?.locked_app_description()?;
        Ok(description
            .split(" / ")
            .filter(|app| !app.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn mr_title_for_version_update(&self) -> Result<String> {
        Ok(format!("Update version to {}", self.version()?))
    }

    fn mr_title_for_release(&self) -> Result<String> {
        Ok(format!("Release {}", self.version()?))
    }

    fn set_version(&mut self, version: Version) -> Result<()> {
        if let Some(current) = self.version {
            return Err(ReleaseError::precondition(format!(
                "Release version already selected: {}",
                current
            )));
        }
        self.version = Some(version);
        Ok(())
    }

    ////////////////////
    //  Make release
    ////////////////////

    /// Lock the "next release" placeholder in the tracker and fix the
    /// version this run will make. When no version is given, it is computed
    /// from the release scope of the placeholder's resolved tickets.
    pub fn set_release_version_to_make(&mut self, version: Option<Version>) -> Result<()> {
        self.tracker_mut()?.lock_version(NEXT_RELEASE)?;
        let version = match version {
            Some(v) => v,
            None => self.tracker()?.next_version()?,
        };
        self.set_version(version)?;
        ui::success(&format!("Release version is {}", version));
        Ok(())
    }

    /// Rewrite the version macros on the private branch and merge the change
    /// through an approved merge request.
    pub fn update_version_in_local_file(
        &self,
        private_remote: &str,
        new_branch: &str,
    ) -> Result<()> {
        self.get_branch_locally(private_remote, &self.private_branch)?;
        self.change_version_in_file()?;
        self.push_to_new_branch(new_branch, private_remote)?;
        self.merge_local_changes(new_branch, &self.private_branch)
    }

    /// Create branch `release/vX.Y.Z` from the private branch.
    pub fn create_release_branch(&self) -> Result<()> {
        let release_branch = self.release_branch()?;
        ui::step(&format!("Creating branch {}", release_branch));
        self.host
            .create_branch(&release_branch, &self.private_branch)?;
        ui::success(&format!("Created branch {}", release_branch));
        Ok(())
    }

    /// Create tag `vX.Y.Z-rc.N` from the release branch.
    pub fn create_rc_tag(&mut self, rc_num: u32) -> Result<()> {
        let tag = rc_tag_name(self.version()?, rc_num);
        let release_branch = self.release_branch()?;
        ui::step(&format!("Creating tag {}", tag));
        if let Err(e) = self.host.create_tag(&tag, &release_branch) {
            ui::error(&format!(
                "Creating tag {} for branch {} failed",
                tag, release_branch
            ));
            return Err(e);
        }
        self.rc_tag = Some(tag.clone());
        ui::success(&format!("Created tag {}", tag));
        Ok(())
    }

    /// Open the release merge request against the public branch. It stays
    /// open until the release is closed. On failure, or when the merge
    /// request turns out to already exist, this run's branch and tag are
    /// deleted before the error propagates.
    pub fn open_mr_for_release_branch(&self, public_branch: &str) -> Result<()> {
        let release_branch = self.release_branch()?;
        let rc_tag = self.rc_tag()?.to_owned();
        ui::step(&format!(
            "Opening MR to merge {} into {}",
            release_branch, public_branch
        ));
        let spec = MergeRequestSpec {
            title: self.mr_title_for_release()?,
            source_branch: release_branch.clone(),
            target_branch: public_branch.to_owned(),
            remove_source: false,
            squash: false,
            label: Some("Release".to_owned()),
        };
        let rollback = |primary: ReleaseError| -> ReleaseError {
            best_effort("delete branch", self.host.delete_branch(&release_branch));
            best_effort("delete tag", self.host.delete_tag(&rc_tag));
            primary
        };
        match self.host.open_mr(&spec) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(rollback(ReleaseError::precondition(format!(
                    "An MR to merge {} into {} is already open",
                    release_branch, public_branch
                ))))
            }
            Err(e) => return Err(rollback(e)),
        }
        ui::success(&format!(
            "Opened MR to merge {} into {}",
            release_branch, public_branch
        ));
        ui::manual_action(
            "Do NOT merge this MR until the release is closed (dependent apps are live)!",
        );
        Ok(())
    }

    /// Rename the tracker's placeholder to the concrete version and create a
    /// fresh placeholder for subsequent work.
    pub fn manage_versions(&self, apps: &str) -> Result<()> {
        let version = self.version()?;
        self.tracker()?.rename_and_close_current(version, apps)?;
        self.tracker()?.create_placeholder_version()?;
        ui::success(&format!("Versions managed; {} is current", version));
        Ok(())
    }

    /// Announce the new release candidate with its notes, or print them when
    /// no announcement channel is configured.
    pub fn post_notes(&self, apps: &[String]) -> Result<()> {
        ui::step("Generating release notes...");
        let rc_tag = self.rc_tag()?;
        let tag_url = self.host.tag_url(rc_tag)?;
        let issues = self.tracker()?.resolved_issues()?;
        let notes = format!(
            "\u{1F4E3} \u{1F4E3} *New {} version  -->  `{}`* (<{}|Link>)\n\n{}",
            self.project_name,
            rc_tag,
            tag_url,
            build_notes(&issues, apps, NotesFormat::Slack, true)
        );
        match &self.chat {
            Some(chat) if !chat.announce_channel.is_empty() => {
                chat.notifier
                    .post(&chat.announce_channel, &chat.announce_thread, &notes)?;
                ui::success(&format!(
                    "Posted release notes to #{}",
                    chat.announce_channel
                ));
            }
            _ => println!("Enjoy:\n\n{}", notes),
        }
        Ok(())
    }

    ////////////////////
    //  Close release
    ////////////////////

    /// Fix the version this run closes and lock its tracker entity.
    pub fn set_release_version_to_close(&mut self, version: Version) -> Result<()> {
        self.set_version(version)?;
        self.tracker_mut()?.lock_version(&version.tag_name())?;
        Ok(())
    }

    /// Decide how this release line closes: no open release merge request
    /// means a hotfix shipped from a branch; otherwise the earlier-versions
    /// gate separates an in-order close from an out-of-order one.
    pub fn get_release_type_to_close(&self, public_branch: &str) -> Result<ReleaseTypeToClose> {
        let open = self.host.find_open_mr(
            &self.mr_title_for_release()?,
            &self.release_branch()?,
            public_branch,
        )?;
        if open.is_none() {
            return Ok(ReleaseTypeToClose::Hotfix);
        }
        match self.confirm_all_earlier_versions_are_closed() {
            Ok(()) => Ok(ReleaseTypeToClose::NewRelease),
            Err(ReleaseError::Precondition(_)) => Ok(ReleaseTypeToClose::OldRelease),
            Err(e) => Err(e),
        }
    }

    /// Every unreleased version other than the current one must be strictly
    /// greater; an earlier open version means a release was skipped.
    pub fn confirm_all_earlier_versions_are_closed(&self) -> Result<()> {
        let current = self.version()?;
        for name in self.tracker()?.unreleased_version_names()? {
            // names not shaped like vX.Y.Z are archive/placeholder entries
            let Ok(version) = Version::parse(&name) else {
                debug!("skipping unversioned tracker entry {:?}", name);
                continue;
            };
            if version != current && version < current {
                return Err(ReleaseError::precondition(format!(
                    "Version {} is still open; close it before {}",
                    name, current
                )));
            }
        }
        Ok(())
    }

    /// Create tag `vX.Y.Z` from the last commit of the release branch.
    pub fn create_release_tag(&self) -> Result<()> {
        let version = self.version()?;
        let last_commit = self.host.last_commit(&self.release_branch()?)?;
        ui::step(&format!("Creating tag {}", version.tag_name()));
        self.host.create_tag(&version.tag_name(), &last_commit)?;
        ui::success(&format!(
            "Created tag {} from commit {}",
            version.tag_name(),
            last_commit
        ));
        Ok(())
    }

    /// Create release "Version X.Y.Z" on the private host, with notes.
    pub fn create_release_in_private_repo(&self) -> Result<()> {
        let version = self.version()?;
        let release_name = format!("Version {}", version);
        let issues = self.tracker()?.resolved_issues()?;
        let notes = build_notes(&issues, &self.release_apps()?, NotesFormat::Git, true);
        ui::step(&format!("Creating release {}", release_name));
        self.host
            .create_release(&release_name, &version.tag_name(), &notes)?;
        ui::success(&format!("Created release {}", release_name));
        Ok(())
    }

    /// Merge the long-lived release merge request into the public branch.
    /// The source branch is kept; hotfixes for older lines still need it.
    pub fn merge_release_changes_into_public_branch(&self, public_branch: &str) -> Result<()> {
        let release_branch = self.release_branch()?;
        let mr = self
            .host
            .find_open_mr(
                &self.mr_title_for_release()?,
                &release_branch,
                public_branch,
            )?
            .ok_or_else(|| {
                ReleaseError::precondition(format!(
                    "No open MR to merge {} into {}",
                    release_branch, public_branch
                ))
            })?;
        self.request_mr_approval(&format!(
            "`{}` close `{}`:\n{}",
            self.project_name,
            self.version()?,
            mr.url
        ));
        match wait_for_mergeable(self.host.as_ref(), mr.id, self.poll, self.clock.as_ref())? {
            WaitOutcome::Ready => self.host.merge_mr(mr.id)?,
            WaitOutcome::Merged => {}
            WaitOutcome::ClosedExternally => {
                return Err(ReleaseError::precondition(format!(
                    "MR {} was closed externally; close aborted",
                    mr.id
                )))
            }
            WaitOutcome::TimedOut => {
                return Err(ReleaseError::transient(format!(
                    "MR {} was not approved within {:?}",
                    mr.id, self.poll.timeout
                )))
            }
        }
        ui::success("Release changes merged into public branch");
        Ok(())
    }

    /// Push the public branch and the release tag to the public remote.
    pub fn push_to_public_repo(
        &self,
        private_remote: &str,
        public_branch: &str,
        public_remote: &str,
    ) -> Result<()> {
        self.get_branch_locally(private_remote, public_branch)?;
        let local = self.local()?;
        local.push(public_remote, public_branch)?;
        local.push(public_remote, &self.version()?.tag_name())?;
        ui::success(&format!("Pushed {} to {}", public_branch, public_remote));
        Ok(())
    }

    /// Hotfix variant: push the release branch itself and the tag.
    pub fn push_release_branch_to_public_repo(
        &self,
        private_remote: &str,
        public_remote: &str,
    ) -> Result<()> {
        let release_branch = self.release_branch()?;
        self.get_branch_locally(private_remote, &release_branch)?;
        let local = self.local()?;
        local.push(public_remote, &release_branch)?;
        local.push(public_remote, &self.version()?.tag_name())?;
        ui::success(&format!("Pushed {} to {}", release_branch, public_remote));
        Ok(())
    }

    /// Create the release on the public mirror, without issue links (they
    /// point at a private tracker).
    pub fn create_release_in_public_repo(&self) -> Result<()> {
        let publisher = self
            .publisher
            .as_deref()
            .ok_or_else(|| ReleaseError::config("Public release publisher not configured"))?;
        let issues = self.tracker()?.resolved_issues()?;
        let notes = build_notes(&issues, &self.release_apps()?, NotesFormat::Git, false);
        publisher.create_release(&self.version()?.tag_name(), &notes)?;
        ui::success("Created release in public repo");
        Ok(())
    }

    /// Mark the tracker version released with today as the release date.
    pub fn mark_version_as_released(&self) -> Result<()> {
        self.tracker()?.mark_released()?;
        ui::success(&format!("Version {} marked as released", self.version()?));
        Ok(())
    }

    /// Rotate the first name of the wiki rota list to the end. Degrades to
    /// an operator warning when the wiki is unconfigured or the page does
    /// not contain the expected schedule.
    pub fn move_release_captain_last(&self, page_id: &str) -> Result<()> {
        let Some(wiki) = self.wiki.as_deref() else {
            ui::warn("Wiki connection not available, rotate Release Captain yourself!");
            return Ok(());
        };
        let page = wiki.get_page(page_id)?;
        let Some(rotated) = rotate_release_captain(&page.body) else {
            ui::warn("Wiki page has no Release Captain schedule, rotate it yourself!");
            return Ok(());
        };
        wiki.update_page(page_id, &page.title, &rotated, page.revision + 1)?;
        ui::success("Release Captain rotated");
        Ok(())
    }

    ////////////////////
    //  Patch release
    ////////////////////

    /// Validate a patch version: its micro must be above zero, it must not
    /// exist yet, and its direct predecessor must exist and be released.
    /// Returns the predecessor's app description for reuse.
    pub fn set_release_version_after_patch(&mut self, version: Version) -> Result<String> {
        let predecessor = version.predecessor_patch().ok_or_else(|| {
            ReleaseError::precondition(format!("Patched version must be higher than {}", version))
        })?;
        let tracker = self.tracker()?;
        if tracker.version_info(version)?.exists {
            return Err(ReleaseError::precondition(format!(
                "Version {} already exists",
                version
            )));
        }
        let previous = tracker.version_info(predecessor)?;
        if !previous.exists {
            return Err(ReleaseError::precondition(format!(
                "Could not find version {} before patch",
                predecessor
            )));
        }
        if !previous.released {
            return Err(ReleaseError::precondition(
                "Attempting to patch a non-released version (RC)",
            ));
        }
        self.set_version(version)?;
        ui::success(&format!("Patch version is {}", version));
        Ok(previous.app_description)
    }

    /// Create the tracker entity for the patch version.
    pub fn create_new_version_for_patch(&self, apps: &str) -> Result<()> {
        let name = self.version()?.tag_name();
        self.tracker()?.create_version_for_patch(&name, apps)?;
        ui::success(&format!("Created version {}", name));
        Ok(())
    }

    /// Point the patched tickets' fix version at the new patch version.
    pub fn add_fix_version_to_tickets(&self, tickets: &[String]) -> Result<()> {
        let name = self.version()?.tag_name();
        self.tracker()?.add_fix_version(tickets, &name)?;
        ui::success(&format!("Fix version {} set on {} tickets", name, tickets.len()));
        Ok(())
    }

    /// Patch variant of the version-file update: the rewrite happens on the
    /// release branch instead of the private development branch.
    pub fn update_version_in_local_file_from_branch(
        &self,
        private_remote: &str,
        new_branch: &str,
        target_branch: &str,
    ) -> Result<()> {
        self.get_branch_locally(private_remote, target_branch)?;
        self.change_version_in_file()?;
        self.push_to_new_branch(new_branch, private_remote)?;
        self.merge_local_changes(new_branch, target_branch)
    }

    ////////////////////
    //  New release candidate
    ////////////////////

    /// Fix the version that gets a new candidate: it must exist in the
    /// tracker and not be released yet. Returns its app description.
    pub fn set_release_version_for_new_rc(&mut self, version: Version) -> Result<String> {
        let info = self.tracker()?.version_info(version)?;
        if !info.exists {
            return Err(ReleaseError::precondition(format!(
                "Could not find version {} for a new RC",
                version
            )));
        }
        if info.released {
            return Err(ReleaseError::precondition(
                "Cannot make a new RC for a released version",
            ));
        }
        self.set_version(version)?;
        self.tracker_mut()?.lock_version(&version.tag_name())?;
        Ok(info.app_description)
    }

    /// Branch off the highest existing candidate tag and check the branch
    /// out locally for the operator's changes. Returns the candidate number
    /// the branch was cut from.
    pub fn create_branch_from_last_rc(&self, remote: &str, branch: &str) -> Result<u32> {
        let version = self.version()?;
        let rc = self.host.last_rc_number(&version.tag_name())?;
        if rc == 0 {
            return Err(ReleaseError::precondition(format!(
                "No RC found for version {}",
                version
            )));
        }
        ui::step(&format!("Creating branch {}", branch));
        self.host
            .create_branch(branch, &rc_tag_name(version, rc))?;
        ui::success(&format!("Created branch {}", branch));
        self.get_branch_locally(remote, branch)?;
        ui::step(&format!("Current branch is now {}.", branch));
        Ok(rc)
    }

    pub fn push_branch(&self, remote: &str, branch: &str) -> Result<()> {
        ui::step(&format!("Pushing branch {}", branch));
        self.local()?.push(remote, branch)?;
        ui::success(&format!("Pushed branch {}", branch));
        Ok(())
    }

    /// Open a merge request on the private host and request its approval.
    pub fn open_private_mr(
        &self,
        source_branch: &str,
        target_branch: &str,
        description: &str,
        remove_source: bool,
    ) -> Result<MergeRequestHandle> {
        ui::step(&format!(
            "Opening MR to merge {} into {}",
            source_branch, target_branch
        ));
        let spec = MergeRequestSpec {
            title: description.to_owned(),
            source_branch: source_branch.to_owned(),
            target_branch: target_branch.to_owned(),
            remove_source,
            squash: false,
            label: None,
        };
        let mr = self.host.open_mr(&spec)?.ok_or_else(|| {
            ReleaseError::precondition(format!(
                "Failed to open MR to merge {} into {}",
                source_branch, target_branch
            ))
        })?;
        ui::success(&format!(
            "Opened MR to merge {} into {}",
            source_branch, target_branch
        ));
        self.request_mr_approval(&format!(
            "`{}` patch `{}` to {}:\n{}",
            self.project_name, source_branch, target_branch, mr.url
        ));
        Ok(mr)
    }

    /// Wait for approval and merge. No rollback: the branch carries the
    /// operator's manual changes.
    pub fn merge_private_mr(&self, mr_id: u64) -> Result<()> {
        match wait_for_mergeable(self.host.as_ref(), mr_id, self.poll, self.clock.as_ref())? {
            WaitOutcome::Ready => self.host.merge_mr(mr_id)?,
            WaitOutcome::Merged => {}
            WaitOutcome::ClosedExternally => {
                return Err(ReleaseError::precondition(format!(
                    "MR {} was closed externally; process aborted",
                    mr_id
                )))
            }
            WaitOutcome::TimedOut => {
                return Err(ReleaseError::transient(format!(
                    "MR {} was not approved within {:?}",
                    mr_id, self.poll.timeout
                )))
            }
        }
        ui::success("MR merged");
        Ok(())
    }

    ////////////////////
    //  Shared internals
    ////////////////////

    /// Bring `branch` up to date in the local working copy: refuse to touch
    /// a dirty tree, switch, then fast-forward to the remote.
    fn get_branch_locally(&self, remote: &str, branch: &str) -> Result<()> {
        let local = self.local()?;
        local.check_clean()?;
        local.switch_to_branch(remote, branch)?;
        local.sync_current_branch(remote)
    }

    /// Rewrite the three version macros in the working copy, validating a
    /// strict increase. Everything else in the file is preserved
    /// byte-for-byte.
    fn change_version_in_file(&self) -> Result<()> {
        let new_version = self.version()?;
        let path = self.local()?.workdir()?.join(&self.version_file);
        let text = std::fs::read_to_string(&path)?;
        let file = VersionFile::parse(&text)?;
        let old_version = file.current();
        ui::step(&format!(
            "Updating version: {} -> {}",
            old_version, new_version
        ));
        if !is_valid_upgrade(old_version, new_version) {
            return Err(ReleaseError::version(format!(
                "Invalid version: {} -> {}",
                old_version, new_version
            )));
        }
        std::fs::write(&path, file.render_with(new_version))?;
        Ok(())
    }

    /// Commit the edited version file to a fresh branch and push it. The
    /// local tree is switched back and the local branch removed whether or
    /// not the push succeeded; only the remote branch survives.
    fn push_to_new_branch(&self, new_branch: &str, remote: &str) -> Result<()> {
        let local = self.local()?;
        let title = self.mr_title_for_version_update()?;
        let fallback = &self.private_branch;
        let result = local
            .commit_file_to_new_branch(&title, new_branch, &self.version_file)
            .and_then(|()| {
                ui::success(&format!("Changes committed to {}", new_branch));
                local.push(remote, new_branch)
            });
        best_effort(
            "clean up local version-change branch",
            local.discard_version_changes(new_branch, fallback, &self.version_file),
        );
        result?;
        ui::success(&format!("Branch {} pushed", new_branch));
        Ok(())
    }

    /// Open a merge request for the pushed version change, request approval,
    /// wait and merge. On an already-open duplicate, a timeout or an
    /// external close, the merge request is closed and the remote branch
    /// deleted before the error propagates.
    fn merge_local_changes(&self, new_branch: &str, target_branch: &str) -> Result<()> {
        let spec = MergeRequestSpec {
            title: self.mr_title_for_version_update()?,
            source_branch: new_branch.to_owned(),
            target_branch: target_branch.to_owned(),
            remove_source: true,
            squash: true,
            label: None,
        };
        let mr = match self.host.open_mr(&spec) {
            Ok(Some(mr)) => mr,
            Ok(None) => {
                best_effort("delete branch", self.host.delete_branch(new_branch));
                return Err(ReleaseError::precondition(format!(
                    "An MR for branch {} is already open",
                    new_branch
                )));
            }
            Err(e) => {
                best_effort("delete branch", self.host.delete_branch(new_branch));
                return Err(e);
            }
        };
        ui::success(&format!("MR {} opened (version upgrade):\n  {}", mr.id, mr.url));
        ui::manual_action(
            "Release process will continue after the MR has been approved.\n\
             Cancel by manually closing the MR.",
        );
        self.request_mr_approval(&format!(
            "`{}` release `{}`:\n{}",
            self.project_name,
            self.version()?,
            mr.url
        ));
        let outcome =
            wait_for_mergeable(self.host.as_ref(), mr.id, self.poll, self.clock.as_ref())?;
        match outcome {
            WaitOutcome::Ready => {
                self.host.merge_mr(mr.id)?;
            }
            WaitOutcome::Merged => {}
            WaitOutcome::ClosedExternally | WaitOutcome::TimedOut => {
                if outcome == WaitOutcome::TimedOut {
                    best_effort("close MR", self.host.close_mr(mr.id));
                }
                best_effort("delete branch", self.host.delete_branch(new_branch));
                return Err(match outcome {
                    WaitOutcome::TimedOut => ReleaseError::transient(format!(
                        "MR {} was not approved within {:?}",
                        mr.id, self.poll.timeout
                    )),
                    _ => ReleaseError::precondition(format!(
                        "MR {} was closed externally; process aborted",
                        mr.id
                    )),
                });
            }
        }
        ui::success("MR merged for version upgrade");
        Ok(())
    }

    /// Ask for approval on the dev channel, or print the instruction when
    /// chat is not wired up.
    fn request_mr_approval(&self, reason: &str) {
        match &self.chat {
            Some(chat) if !chat.dev_channel.is_empty() => {
                let text = format!("Hello <!channel>,\n\nPlease approve the MR for {}", reason);
                if let Err(e) = chat.notifier.post(&chat.dev_channel, "", &text) {
                    warn!("posting approval request failed: {}", e);
                    ui::manual_action(&format!(
                        "You need to request MR approval yourself because chat failed,\n{}",
                        reason
                    ));
                }
            }
            _ => ui::manual_action(&format!(
                "You need to request MR approval yourself because chat is not available,\n{}",
                reason
            )),
        }
    }
}

/// Log-and-continue for cleanup steps; the primary error stays primary.
fn best_effort(what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("cleanup failed ({}): {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MergeRequestStatus, MockSourceRepositoryHost};
    use std::sync::Mutex;

    /// Clock that only moves when slept on.
    struct FakeClock {
        now: Mutex<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            FakeClock {
                now: Mutex::new(Duration::ZERO),
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }
    }

    fn status(state: MergeRequestState, mergeable: bool) -> MergeRequestStatus {
        MergeRequestStatus {
            state,
            mergeable,
            draft: false,
            work_in_progress: false,
            has_conflicts: false,
            url: "https://example.invalid/mr/7".to_owned(),
        }
    }

    #[test]
    fn test_wait_returns_ready_after_three_poll_intervals() {
        let mut host = MockSourceRepositoryHost::new();
        let mut polls = 0;
        host.expect_mr_status().times(4).returning(move |_| {
            polls += 1;
            Ok(status(MergeRequestState::Opened, polls > 3))
        });
        let clock = FakeClock::new();
        let settings = PollSettings::default();

        let outcome = wait_for_mergeable(&host, 7, settings, &clock).unwrap();

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(clock.now(), settings.interval * 3);
    }

    #[test]
    fn test_wait_times_out_when_never_mergeable() {
        let mut host = MockSourceRepositoryHost::new();
        host.expect_mr_status()
            .returning(|_| Ok(status(MergeRequestState::Opened, false)));
        let clock = FakeClock::new();
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
        };

        let outcome = wait_for_mergeable(&host, 7, settings, &clock).unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(clock.now() >= settings.timeout);
    }

    #[test]
    fn test_wait_aborts_on_external_close() {
        let mut host = MockSourceRepositoryHost::new();
        host.expect_mr_status()
            .times(1)
            .returning(|_| Ok(status(MergeRequestState::Closed, false)));
        let clock = FakeClock::new();

        let outcome = wait_for_mergeable(&host, 7, PollSettings::default(), &clock).unwrap();

        assert_eq!(outcome, WaitOutcome::ClosedExternally);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_wait_accepts_externally_merged_mr() {
        let mut host = MockSourceRepositoryHost::new();
        host.expect_mr_status()
            .times(1)
            .returning(|_| Ok(status(MergeRequestState::Merged, false)));
        let clock = FakeClock::new();

        let outcome = wait_for_mergeable(&host, 7, PollSettings::default(), &clock).unwrap();

        assert_eq!(outcome, WaitOutcome::Merged);
    }
}
