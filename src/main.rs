use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use release_captain::chat::SlackNotifier;
use release_captain::config::{self, Config};
use release_captain::domain::{release_branch_name, Version};
use release_captain::host::GitLabHost;
use release_captain::local::GitWorkingCopy;
use release_captain::process::{ChatSetup, ReleaseProcess, ReleaseTypeToClose, SystemClock};
use release_captain::publisher::GitHubReleases;
use release_captain::tracker::JiraTracker;
use release_captain::ui;
use release_captain::wiki::ConfluenceWiki;

mod cli;

use cli::{Args, Command};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::Make {
            release_version,
            apps,
        } => make_release(&config, release_version.as_deref(), &apps),
        Command::Close { release_version } => close_release(&config, &release_version),
        Command::Patch {
            release_version,
            tickets,
        } => patch_release(&config, &release_version, &tickets),
        Command::NewRc {
            release_version,
            branch,
        } => make_another_rc(&config, &release_version, branch.as_deref()),
    }
}

/// Build the orchestrator with the collaborators every workflow needs:
/// the Git host, the issue tracker and (when configured) chat.
fn base_process(config: &Config) -> Result<ReleaseProcess> {
    let gitlab_token = required_token("GITLAB_TOKEN")?;
    let jira_token = required_token("JIRA_TOKEN")?;

    ui::step("GitLab initializing");
    let host = GitLabHost::new(&config.gitlab.host_url, &gitlab_token, &config.project_name)?;
    ui::success("GitLab initialized");

    let mut process = ReleaseProcess::new(
        config.project_name.as_str(),
        config.private_branch.as_str(),
        config.version_file.as_str(),
        Box::new(host),
        Box::new(SystemClock::new()),
    );

    ui::step("Jira initializing");
    process.setup_tracker(Box::new(JiraTracker::new(
        &config.jira.url,
        &jira_token,
        &config.project_name,
    )?));
    ui::success("Jira initialized");

    if let Some(slack_token) = optional_token("SLACK_TOKEN") {
        ui::step("Slack initializing");
        process.setup_chat(ChatSetup {
            notifier: Box::new(SlackNotifier::new(&slack_token)),
            dev_channel: config.chat.dev_channel.clone(),
            announce_channel: config.chat.announce_channel.clone(),
            announce_thread: config.chat.announce_thread.clone(),
        });
        ui::success("Slack initialized");
    }

    Ok(process)
}

fn make_release(config: &Config, release_version: Option<&str>, apps: &[String]) -> Result<()> {
    let mut process = base_process(config)?;
    let requested = release_version.map(Version::parse).transpose()?;
    process.set_release_version_to_make(requested)?;

    let local = GitWorkingCopy::discover(".")?;
    process.setup_local(Box::new(local), &config.gitlab.remote_name, None)?;

    let version = process.release_version()?;
    let update_branch = format!("task/update-version-to-{}", version);
    process.update_version_in_local_file(&config.gitlab.remote_name, &update_branch)?;

    process.create_release_branch()?;
    process.create_rc_tag(1)?;
    process.open_mr_for_release_branch(&config.public_branch)?;
    process.manage_versions(&apps.join(" / "))?;
    process.post_notes(apps)?;
    Ok(())
}

fn close_release(config: &Config, release_version: &str) -> Result<()> {
    let mut process = base_process(config)?;
    process.set_release_version_to_close(Version::parse(release_version)?)?;

    let local = GitWorkingCopy::discover(".")?;
    let public_remote = if config.github.remote_name.is_empty() {
        None
    } else {
        Some((
            config.github.remote_name.as_str(),
            config.github.remote_url.as_str(),
        ))
    };
    process.setup_local(Box::new(local), &config.gitlab.remote_name, public_remote)?;

    if !config.github.owner.is_empty() {
        ui::step("GitHub initializing");
        let github_token = required_token("GITHUB_TOKEN")?;
        process.setup_publisher(Box::new(GitHubReleases::new(
            &github_token,
            &config.github.owner,
            &config.project_name,
        )));
        ui::success("GitHub initialized");
    }

    if !config.wiki.url.is_empty() {
        if let Some(confluence_token) = optional_token("CONFLUENCE_TOKEN") {
            ui::step("Confluence initializing");
            process.setup_wiki(Box::new(ConfluenceWiki::new(
                &config.wiki.url,
                &confluence_token,
            )));
            ui::success("Confluence configured");
        }
    }

    let release_type = process.get_release_type_to_close(&config.public_branch)?;

    process.create_release_tag()?;
    process.create_release_in_private_repo()?;

    match release_type {
        ReleaseTypeToClose::Hotfix => {
            // no release MR is open; the fix ships straight from its branch
            if !config.github.remote_name.is_empty() {
                process.push_release_branch_to_public_repo(
                    &config.gitlab.remote_name,
                    &config.github.remote_name,
                )?;
            }
        }
        ReleaseTypeToClose::NewRelease | ReleaseTypeToClose::OldRelease => {
            process.merge_release_changes_into_public_branch(&config.public_branch)?;
            if !config.github.remote_name.is_empty() {
                process.push_to_public_repo(
                    &config.gitlab.remote_name,
                    &config.public_branch,
                    &config.github.remote_name,
                )?;
            }
        }
    }

    if !config.github.owner.is_empty() {
        process.create_release_in_public_repo()?;
    }
    process.mark_version_as_released()?;

    // the rota advances only when the newest line closes
    if release_type == ReleaseTypeToClose::NewRelease {
        if config.wiki.page_id.is_empty() {
            ui::warn("No rota page configured, rotate Release Captain yourself!");
        } else {
            process.move_release_captain_last(&config.wiki.page_id)?;
        }
    }
    Ok(())
}

fn patch_release(config: &Config, release_version: &str, tickets: &[String]) -> Result<()> {
    let mut process = base_process(config)?;
    let version = Version::parse(release_version)?;
    let app_description = process.set_release_version_after_patch(version)?;

    process.create_new_version_for_patch(&app_description)?;
    process.add_fix_version_to_tickets(tickets)?;

    let local = GitWorkingCopy::discover(".")?;
    process.setup_local(Box::new(local), &config.gitlab.remote_name, None)?;

    // the version-file update lands on the patched line's release branch
    let predecessor = version
        .predecessor_patch()
        .ok_or_else(|| anyhow!("patch version {} has no predecessor", version))?;
    let update_branch = format!("task/update-version-to-{}", version);
    process.update_version_in_local_file_from_branch(
        &config.gitlab.remote_name,
        &update_branch,
        &release_branch_name(predecessor),
    )?;
    Ok(())
}

fn make_another_rc(config: &Config, release_version: &str, branch: Option<&str>) -> Result<()> {
    let mut process = base_process(config)?;
    let version = Version::parse(release_version)?;
    process.set_release_version_for_new_rc(version)?;

    let local = GitWorkingCopy::discover(".")?;
    process.setup_local(Box::new(local), &config.gitlab.remote_name, None)?;

    let work_branch = match branch {
        Some(name) => name.to_owned(),
        None => format!("task/fix-{}", version.tag_name()),
    };
    let last_rc = process.create_branch_from_last_rc(&config.gitlab.remote_name, &work_branch)?;

    if !wait_for_local_changes()? {
        bail!("Process canceled");
    }

    process.push_branch(&config.gitlab.remote_name, &work_branch)?;
    let mr = process.open_private_mr(
        &work_branch,
        &release_branch_name(version),
        &format!("Changes for {} rc.{}", version.tag_name(), last_rc + 1),
        true,
    )?;
    process.merge_private_mr(mr.id)?;
    process.create_rc_tag(last_rc + 1)?;
    Ok(())
}

/// Block until the operator reports their local changes are in place.
fn wait_for_local_changes() -> Result<bool> {
    ui::manual_action("Apply changes locally.");
    loop {
        print!("Type \"DONE!\" or \"Cancel\" here when done and hit Enter: ");
        use std::io::Write;
        std::io::stdout().flush()?;
        let mut feedback = String::new();
        std::io::stdin().read_line(&mut feedback)?;
        match feedback.trim() {
            "DONE!" => return Ok(true),
            "Cancel" => return Ok(false),
            _ => {}
        }
    }
}

fn required_token(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow!("environment variable {} is not set", name))
}

fn optional_token(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|token| !token.is_empty())
}
