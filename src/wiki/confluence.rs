use crate::error::{ReleaseError, Result};
use crate::wiki::{WikiPage, WikiStore};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;

/// Confluence implementation of [WikiStore] over the content REST API,
/// using the storage representation round-trip.
pub struct ConfluenceWiki {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    title: String,
    body: ContentBody,
    version: ContentVersion,
}

#[derive(Deserialize)]
struct ContentBody {
    storage: ContentStorage,
}

#[derive(Deserialize)]
struct ContentStorage {
    value: String,
}

#[derive(Deserialize)]
struct ContentVersion {
    number: u64,
}

impl ConfluenceWiki {
    pub fn new(base_url: &str, token: &str) -> Self {
        ConfluenceWiki {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn check(&self, result: reqwest::Result<Response>) -> Result<Response> {
        let response = result?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ReleaseError::integration(format!(
            "Confluence request failed: {} {}",
            status, body
        )))
    }
}

impl WikiStore for ConfluenceWiki {
    fn get_page(&self, page_id: &str) -> Result<WikiPage> {
        let response = self.check(
            self.client
                .get(format!(
                    "{}/rest/api/content/{}?expand=body.storage,version",
                    self.base_url, page_id
                ))
                .bearer_auth(&self.token)
                .send(),
        )?;
        let content: ContentResponse = response.json()?;
        Ok(WikiPage {
            title: content.title,
            body: content.body.storage.value,
            revision: content.version.number,
        })
    }

    fn update_page(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
        next_revision: u64,
    ) -> Result<()> {
        let payload = json!({
            "type": "page",
            "title": title,
            "version": { "number": next_revision },
            "body": {
                "storage": {
                    "value": body,
                    "representation": "storage",
                }
            }
        });
        self.check(
            self.client
                .put(format!("{}/rest/api/content/{}", self.base_url, page_id))
                .bearer_auth(&self.token)
                .json(&payload)
                .send(),
        )?;
        Ok(())
    }
}
