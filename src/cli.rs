use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "release-captain",
    about = "Drive a release across GitLab, Jira, Slack, Confluence and GitHub"
)]
pub struct Args {
    #[arg(short, long, help = "Custom configuration file path")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make a new release: version bump, release branch, first RC tag,
    /// release MR and notes
    Make {
        #[arg(
            short,
            long,
            help = "Release version X.Y.Z (computed from the tracker when omitted)"
        )]
        release_version: Option<String>,

        #[arg(short, long, help = "App version shipping this release, e.g. \"iOS 1.2\"")]
        apps: Vec<String>,
    },

    /// Close a release: final tag, release entries, merge into the public
    /// branch and push to the public mirror
    Close {
        #[arg(short, long, help = "Release version X.Y.Z to close")]
        release_version: String,
    },

    /// Prepare a patch release on top of an already released version
    Patch {
        #[arg(short, long, help = "Patch version X.Y.Z (micro above zero)")]
        release_version: String,

        #[arg(short, long, help = "Ticket fixed by the patch, e.g. SDK-123")]
        tickets: Vec<String>,
    },

    /// Cut a new release candidate from the last one, with manual changes
    NewRc {
        #[arg(short, long, help = "Release version X.Y.Z getting the new candidate")]
        release_version: String,

        #[arg(short, long, help = "Working branch for the candidate changes")]
        branch: Option<String>,
    },
}
