use crate::chat::ChatNotifier;
use crate::error::{ReleaseError, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Slack implementation of [ChatNotifier] over `chat.postMessage`.
pub struct SlackNotifier {
    client: Client,
    token: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: String,
}

impl SlackNotifier {
    pub fn new(token: &str) -> Self {
        SlackNotifier {
            client: Client::new(),
            token: token.to_string(),
        }
    }
}

impl ChatNotifier for SlackNotifier {
    fn post(&self, channel: &str, thread: &str, text: &str) -> Result<()> {
        let mut body = json!({ "channel": channel, "text": text });
        if !thread.is_empty() {
            body["thread_ts"] = json!(thread);
        }

        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::integration(format!(
                "Slack request failed: {}",
                status
            )));
        }

        // Slack reports application errors in-band with HTTP 200
        let result: PostMessageResponse = response.json()?;
        if !result.ok {
            return Err(ReleaseError::integration(format!(
                "Slack rejected the message: {}",
                result.error
            )));
        }
        Ok(())
    }
}
