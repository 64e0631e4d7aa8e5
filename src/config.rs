use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ReleaseError, Result};

/// Represents the complete configuration for release-captain.
///
/// Contains project identity, branch names, the version-file location, and
/// per-service sections for the Git host, issue tracker, chat, wiki and the
/// public mirror. Secrets never live here; they come from the environment.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Branch where day-to-day development happens.
    #[serde(default = "default_private_branch")]
    pub private_branch: String,

    /// Branch the release merge request targets.
    #[serde(default = "default_public_branch")]
    pub public_branch: String,

    /// Path of the version-macro file, relative to the working copy root.
    #[serde(default = "default_version_file")]
    pub version_file: String,

    #[serde(default)]
    pub gitlab: GitHostConfig,

    #[serde(default)]
    pub jira: TrackerConfig,

    #[serde(default)]
    pub github: PublicRepoConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub wiki: WikiConfig,
}

fn default_project_name() -> String {
    "SDK".to_string()
}

fn default_private_branch() -> String {
    "develop".to_string()
}

fn default_public_branch() -> String {
    "master".to_string()
}

fn default_version_file() -> String {
    "include/version.h".to_string()
}

fn default_remote_name() -> String {
    "origin".to_string()
}

/// Connection details for the private Git host.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHostConfig {
    #[serde(default)]
    pub host_url: String,

    /// Name of the local remote pointing at the private host.
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
}

impl Default for GitHostConfig {
    fn default() -> Self {
        GitHostConfig {
            host_url: String::new(),
            remote_name: default_remote_name(),
        }
    }
}

/// Connection details for the issue tracker.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TrackerConfig {
    #[serde(default)]
    pub url: String,
}

/// The public mirror the closed release is pushed and published to.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PublicRepoConfig {
    #[serde(default)]
    pub owner: String,

    /// Name of the local remote pointing at the mirror.
    #[serde(default)]
    pub remote_name: String,

    #[serde(default)]
    pub remote_url: String,
}

/// Chat channels. The dev channel receives approval requests; the announce
/// channel (optional) receives release notes.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub dev_channel: String,

    #[serde(default)]
    pub announce_channel: String,

    #[serde(default)]
    pub announce_thread: String,
}

/// Wiki page holding the release-captain rota. Both fields empty means the
/// rotation step degrades to a printed instruction.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WikiConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub page_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            project_name: default_project_name(),
            private_branch: default_private_branch(),
            public_branch: default_public_branch(),
            version_file: default_version_file(),
            gitlab: GitHostConfig::default(),
            jira: TrackerConfig::default(),
            github: PublicRepoConfig::default(),
            chat: ChatConfig::default(),
            wiki: WikiConfig::default(),
        }
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `releasecaptain.toml` in current directory
/// 3. `.releasecaptain.toml` in user config directory
/// 4. Default configuration if no file found
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        fs::read_to_string(path)?
    } else if Path::new("./releasecaptain.toml").exists() {
        fs::read_to_string("./releasecaptain.toml")?
    } else if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join(".releasecaptain.toml");
        if config_path.exists() {
            fs::read_to_string(config_path)?
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    let config: Config =
        toml::from_str(&config_str).map_err(|e| ReleaseError::config(e.to_string()))?;
    Ok(config)
}
