// tests/process_test.rs
//
// Workflow-step behavior against mocked collaborators: rollback of this
// run's artifacts on failure, the earlier-versions gate, close-type
// detection and the precondition checks of the version-selection steps.

use mockall::predicate::*;
use std::time::Duration;

use release_captain::domain::{NoteIssue, Version};
use release_captain::host::{
    MergeRequestHandle, MergeRequestState, MergeRequestStatus, MockSourceRepositoryHost,
};
use release_captain::process::{MockClock, ReleaseProcess, ReleaseTypeToClose, SystemClock};
use release_captain::tracker::{MockIssueTracker, VersionInfo, NEXT_RELEASE};
use release_captain::ReleaseError;

fn version(text: &str) -> Version {
    Version::parse(text).unwrap()
}

fn idle_clock() -> MockClock {
    let mut clock = MockClock::new();
    clock.expect_now().returning(|| Duration::ZERO);
    clock.expect_sleep().never();
    clock
}

fn locking_tracker(name: &'static str) -> MockIssueTracker {
    let mut tracker = MockIssueTracker::new();
    tracker
        .expect_lock_version()
        .with(eq(name))
        .times(1)
        .returning(|_| Ok(()));
    tracker
}

fn process(host: MockSourceRepositoryHost) -> ReleaseProcess {
    ReleaseProcess::new(
        "media-sdk",
        "develop",
        "src/version.h",
        Box::new(host),
        Box::new(SystemClock::new()),
    )
}

fn ready_status() -> MergeRequestStatus {
    MergeRequestStatus {
        state: MergeRequestState::Opened,
        mergeable: true,
        draft: false,
        work_in_progress: false,
        has_conflicts: false,
        url: "https://code.example.com/mr/11".to_owned(),
    }
}

#[test]
fn test_failed_release_mr_rolls_back_branch_and_tag_once() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_create_branch()
        .with(eq("release/v2.1.0"), eq("develop"))
        .times(1)
        .returning(|_, _| Ok(()));
    host.expect_create_tag()
        .with(eq("v2.1.0-rc.1"), eq("release/v2.1.0"))
        .times(1)
        .returning(|_, _| Ok(()));
    // a same-titled MR is already open: the short-circuit must trigger
    // rollback of exactly this run's branch and tag
    host.expect_open_mr().times(1).returning(|_| Ok(None));
    host.expect_delete_branch()
        .with(eq("release/v2.1.0"))
        .times(1)
        .returning(|_| Ok(()));
    host.expect_delete_tag()
        .with(eq("v2.1.0-rc.1"))
        .times(1)
        .returning(|_| Ok(()));

    let mut process = process(host);
    process.setup_tracker(Box::new(locking_tracker(NEXT_RELEASE)));
    process
        .set_release_version_to_make(Some(version("2.1.0")))
        .unwrap();
    process.create_release_branch().unwrap();
    process.create_rc_tag(1).unwrap();

    let result = process.open_mr_for_release_branch("master");
    assert!(matches!(result, Err(ReleaseError::Precondition(_))));
}

#[test]
fn test_release_mr_open_failure_still_rolls_back() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_create_tag().returning(|_, _| Ok(()));
    host.expect_open_mr()
        .times(1)
        .returning(|_| Err(ReleaseError::transient("502 from host")));
    host.expect_delete_branch()
        .with(eq("release/v2.1.0"))
        .times(1)
        .returning(|_| Ok(()));
    host.expect_delete_tag()
        .with(eq("v2.1.0-rc.1"))
        .times(1)
        .returning(|_| Ok(()));

    let mut process = process(host);
    process.setup_tracker(Box::new(locking_tracker(NEXT_RELEASE)));
    process
        .set_release_version_to_make(Some(version("2.1.0")))
        .unwrap();
    process.create_rc_tag(1).unwrap();

    let result = process.open_mr_for_release_branch("master");
    assert!(matches!(result, Err(ReleaseError::Transient(_))));
}

#[test]
fn test_rollback_failure_does_not_mask_the_open_error() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_create_tag().returning(|_, _| Ok(()));
    host.expect_open_mr().times(1).returning(|_| Ok(None));
    host.expect_delete_branch()
        .times(1)
        .returning(|_| Err(ReleaseError::transient("branch deletion failed")));
    host.expect_delete_tag().times(1).returning(|_| Ok(()));

    let mut process = process(host);
    process.setup_tracker(Box::new(locking_tracker(NEXT_RELEASE)));
    process
        .set_release_version_to_make(Some(version("2.1.0")))
        .unwrap();
    process.create_rc_tag(1).unwrap();

    // the primary cause (MR already open) survives the failed cleanup
    let result = process.open_mr_for_release_branch("master");
    assert!(matches!(result, Err(ReleaseError::Precondition(_))));
}

#[test]
fn test_earlier_open_version_fails_the_gate_naming_it() {
    let mut tracker = locking_tracker("v2.0.0");
    tracker
        .expect_unreleased_version_names()
        .returning(|| Ok(vec!["v1.0.0".to_owned(), "v2.0.0".to_owned()]));

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_to_close(version("2.0.0"))
        .unwrap();

    let err = process
        .confirm_all_earlier_versions_are_closed()
        .unwrap_err();
    assert!(err.to_string().contains("v1.0.0"));
}

#[test]
fn test_only_later_open_versions_pass_the_gate() {
    let mut tracker = locking_tracker("v2.0.0");
    tracker.expect_unreleased_version_names().returning(|| {
        Ok(vec![
            "v2.0.0".to_owned(),
            "v2.1.0".to_owned(),
            // placeholder entries without a version shape are ignored
            "NextRelease".to_owned(),
        ])
    });

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_to_close(version("2.0.0"))
        .unwrap();

    assert!(process.confirm_all_earlier_versions_are_closed().is_ok());
}

#[test]
fn test_close_type_is_hotfix_without_an_open_release_mr() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_find_open_mr()
        .with(eq("Release 2.0.1"), eq("release/v2.0.1"), eq("master"))
        .times(1)
        .returning(|_, _, _| Ok(None));

    let mut process = process(host);
    process.setup_tracker(Box::new(locking_tracker("v2.0.1")));
    process
        .set_release_version_to_close(version("2.0.1"))
        .unwrap();

    assert_eq!(
        process.get_release_type_to_close("master").unwrap(),
        ReleaseTypeToClose::Hotfix
    );
}

#[test]
fn test_close_type_depends_on_the_earlier_versions_gate() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_find_open_mr().returning(|_, _, _| {
        Ok(Some(MergeRequestHandle {
            id: 11,
            url: "https://code.example.com/mr/11".to_owned(),
        }))
    });
    let mut tracker = locking_tracker("v2.0.0");
    tracker
        .expect_unreleased_version_names()
        .returning(|| Ok(vec!["v1.9.0".to_owned(), "v2.0.0".to_owned()]));

    let mut process = process(host);
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_to_close(version("2.0.0"))
        .unwrap();

    assert_eq!(
        process.get_release_type_to_close("master").unwrap(),
        ReleaseTypeToClose::OldRelease
    );
}

#[test]
fn test_merge_private_mr_merges_once_ready() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_mr_status()
        .with(eq(11))
        .times(1)
        .returning(|_| Ok(ready_status()));
    host.expect_merge_mr()
        .with(eq(11))
        .times(1)
        .returning(|_| Ok(()));

    let process = ReleaseProcess::new(
        "media-sdk",
        "develop",
        "src/version.h",
        Box::new(host),
        Box::new(idle_clock()),
    );
    process.merge_private_mr(11).unwrap();
}

#[test]
fn test_merge_private_mr_aborts_on_external_close() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_mr_status().times(1).returning(|_| {
        Ok(MergeRequestStatus {
            state: MergeRequestState::Closed,
            mergeable: false,
            ..ready_status()
        })
    });
    host.expect_merge_mr().never();

    let process = ReleaseProcess::new(
        "media-sdk",
        "develop",
        "src/version.h",
        Box::new(host),
        Box::new(idle_clock()),
    );
    let result = process.merge_private_mr(11);
    assert!(matches!(result, Err(ReleaseError::Precondition(_))));
}

#[test]
fn test_patch_version_must_not_exist_yet() {
    let mut tracker = MockIssueTracker::new();
    tracker
        .expect_version_info()
        .with(eq(version("2.0.1")))
        .returning(|_| {
            Ok(VersionInfo {
                exists: true,
                released: false,
                app_description: String::new(),
            })
        });

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));

    let err = process
        .set_release_version_after_patch(version("2.0.1"))
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn test_patch_requires_a_released_predecessor() {
    let mut tracker = MockIssueTracker::new();
    tracker
        .expect_version_info()
        .with(eq(version("2.0.1")))
        .returning(|_| {
            Ok(VersionInfo {
                exists: false,
                released: false,
                app_description: String::new(),
            })
        });
    tracker
        .expect_version_info()
        .with(eq(version("2.0.0")))
        .returning(|_| {
            Ok(VersionInfo {
                exists: true,
                released: false,
                app_description: String::new(),
            })
        });

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));

    let err = process
        .set_release_version_after_patch(version("2.0.1"))
        .unwrap_err();
    assert!(err.to_string().contains("non-released"));
}

#[test]
fn test_patch_returns_the_predecessors_app_description() {
    let mut tracker = MockIssueTracker::new();
    tracker
        .expect_version_info()
        .with(eq(version("2.0.1")))
        .returning(|_| {
            Ok(VersionInfo {
                exists: false,
                released: false,
                app_description: String::new(),
            })
        });
    tracker
        .expect_version_info()
        .with(eq(version("2.0.0")))
        .returning(|_| {
            Ok(VersionInfo {
                exists: true,
                released: true,
                app_description: "iOS 12.1 / Android 9.3".to_owned(),
            })
        });

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));

    let apps = process
        .set_release_version_after_patch(version("2.0.1"))
        .unwrap();
    assert_eq!(apps, "iOS 12.1 / Android 9.3");
}

#[test]
fn test_patch_version_micro_must_be_above_zero() {
    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(MockIssueTracker::new()));

    let result = process.set_release_version_after_patch(version("2.1.0"));
    assert!(matches!(result, Err(ReleaseError::Precondition(_))));
}

#[test]
fn test_new_rc_rejects_a_released_version() {
    let mut tracker = MockIssueTracker::new();
    tracker.expect_version_info().returning(|_| {
        Ok(VersionInfo {
            exists: true,
            released: true,
            app_description: String::new(),
        })
    });

    let mut process = process(MockSourceRepositoryHost::new());
    process.setup_tracker(Box::new(tracker));

    let result = process.set_release_version_for_new_rc(version("2.0.0"));
    assert!(matches!(result, Err(ReleaseError::Precondition(_))));
}

#[test]
fn test_new_rc_needs_an_existing_candidate_tag() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_last_rc_number()
        .with(eq("v2.0.0"))
        .returning(|_| Ok(0));
    host.expect_create_branch().never();

    let mut tracker = locking_tracker("v2.0.0");
    tracker.expect_version_info().returning(|_| {
        Ok(VersionInfo {
            exists: true,
            released: false,
            app_description: String::new(),
        })
    });

    let mut process = process(host);
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_for_new_rc(version("2.0.0"))
        .unwrap();

    let err = process
        .create_branch_from_last_rc("origin", "task/fix-v2.0.0")
        .unwrap_err();
    assert!(err.to_string().contains("No RC found"));
}

#[test]
fn test_private_release_notes_list_apps_from_the_locked_version() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_create_release()
        .withf(|name, tag, notes| {
            name == "Version 2.0.0"
                && tag == "v2.0.0"
                && notes.contains("Target apps")
                && notes.contains("iOS 12.1")
                && notes.contains("Android 9.3")
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let mut tracker = locking_tracker("v2.0.0");
    tracker.expect_resolved_issues().returning(|| {
        Ok(vec![NoteIssue {
            issue_type: "Bug".to_owned(),
            key: "SDK-1".to_owned(),
            summary: "Fix crash".to_owned(),
            url: "https://issues.example.com/browse/SDK-1".to_owned(),
        }])
    });
    // no apps passed on a close run; the version description supplies them
    tracker
        .expect_locked_app_description()
        .returning(|| Ok("iOS 12.1 / Android 9.3".to_owned()));

    let mut process = process(host);
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_to_close(version("2.0.0"))
        .unwrap();
    process.create_release_in_private_repo().unwrap();
}

#[test]
fn test_post_notes_prints_when_chat_is_unconfigured() {
    let mut host = MockSourceRepositoryHost::new();
    host.expect_create_tag().returning(|_, _| Ok(()));
    host.expect_tag_url()
        .with(eq("v2.1.0-rc.1"))
        .returning(|_| Ok("https://code.example.com/tags/v2.1.0-rc.1".to_owned()));

    let mut tracker = locking_tracker(NEXT_RELEASE);
    tracker.expect_resolved_issues().returning(|| {
        Ok(vec![NoteIssue {
            issue_type: "Bug".to_owned(),
            key: "SDK-1".to_owned(),
            summary: "Fix crash".to_owned(),
            url: "https://issues.example.com/browse/SDK-1".to_owned(),
        }])
    });

    let mut process = process(host);
    process.setup_tracker(Box::new(tracker));
    process
        .set_release_version_to_make(Some(version("2.1.0")))
        .unwrap();
    process.create_rc_tag(1).unwrap();

    // no chat wired: the notes go to stdout and the step still succeeds
    process.post_notes(&["iOS 12.1".to_owned()]).unwrap();
}
