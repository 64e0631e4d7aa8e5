use crate::error::{ReleaseError, Result};
use crate::publisher::ReleasePublisher;
use reqwest::blocking::Client;
use serde_json::json;

/// GitHub implementation of [ReleasePublisher] over the releases REST API.
pub struct GitHubReleases {
    client: Client,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubReleases {
    pub fn new(token: &str, owner: &str, repo: &str) -> Self {
        GitHubReleases {
            client: Client::new(),
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }
}

impl ReleasePublisher for GitHubReleases {
    fn create_release(&self, tag: &str, notes: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "https://api.github.com/repos/{}/{}/releases",
                self.owner, self.repo
            ))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "release-captain")
            .json(&json!({
                "tag_name": tag,
                "name": tag,
                "body": notes,
            }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReleaseError::integration(format!(
                "GitHub release creation failed: {} {}",
                status, body
            )));
        }
        Ok(())
    }
}
