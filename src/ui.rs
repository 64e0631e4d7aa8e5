//! Operator-facing console output.
//!
//! Each workflow step prints a start line and a `v`-prefixed confirmation
//! once it succeeded, so a release run reads as a checklist. Warnings are
//! used when an optional collaborator is unconfigured and the operator has
//! to act manually.

use console::style;

pub fn step(message: &str) {
    println!("{}", message);
}

pub fn success(message: &str) {
    println!("{} {}", style("v").green(), message);
}

pub fn warn(message: &str) {
    println!("{} {}", style("WARNING:").yellow(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red(), message);
}

/// Multi-line instruction the operator must follow by hand, e.g. when chat
/// is not configured and an approval request cannot be posted.
pub fn manual_action(message: &str) {
    println!("{}\n{}", style("**** Manual action needed:").bold(), message);
}
