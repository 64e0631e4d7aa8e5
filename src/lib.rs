//! release-captain - drive a software release across the systems involved
//!
//! One release touches a private GitLab project, a Jira project, Slack
//! channels, a Confluence rota page, a public GitHub mirror and a local
//! working copy. This crate wraps each behind a narrow trait and sequences
//! the four workflows (make, close, patch, new RC) in
//! [process::ReleaseProcess].

pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod host;
pub mod local;
pub mod process;
pub mod publisher;
pub mod tracker;
pub mod ui;
pub mod wiki;

pub use error::{ReleaseError, Result};
