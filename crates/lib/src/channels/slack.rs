//! Slack channel: Web API sends (chat.postMessage, reactions.add) and
//! response_url replies for slash commands. Inbound delivery arrives via the
//! Events API webhook in `server`.

use crate::channels::message::OutboundMessage;
use crate::config::ResponseVisibility;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Outbound send capability used by handlers and the session driver.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Send plain text to a conversation.
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), String>;
    /// Send a structured message (text and/or attachments) to a conversation.
    async fn send_message(&self, channel_id: &str, message: &OutboundMessage)
        -> Result<(), String>;
    /// Add an emoji reaction to a message. Default is a no-op for channels without reactions.
    async fn add_reaction(&self, _channel_id: &str, _ts: &str, _name: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Bot identity from auth.test, fetched once during startup.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

/// Slack Web API connector.
pub struct SlackChannel {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(token: String) -> Self {
        Self {
            token,
            base_url: slack_api_base(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<(), String> {
        let url = format!("{}/{}", self.base_url, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", method, status, body));
        }
        let data: ApiEnvelope = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err(format!(
                "{} returned ok: false ({})",
                method,
                data.error.unwrap_or_default()
            ));
        }
        Ok(())
    }

    /// Call auth.test to learn the bot's user id and display name.
    pub async fn auth_test(&self) -> Result<BotIdentity, String> {
        let url = format!("{}/auth.test", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("auth.test failed: {} {}", status, body));
        }
        let data: AuthTestResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err(format!(
                "auth.test returned ok: false ({})",
                data.error.unwrap_or_default()
            ));
        }
        Ok(BotIdentity {
            user_id: data.user_id.ok_or("auth.test missing user_id")?,
            name: data.user.unwrap_or_else(|| "bot".to_string()),
        })
    }

    /// Reply to a slash command via its response_url with the configured visibility.
    pub async fn respond(
        &self,
        response_url: &str,
        message: &OutboundMessage,
        visibility: ResponseVisibility,
    ) -> Result<(), String> {
        let mut body = serde_json::to_value(message).map_err(|e| e.to_string())?;
        body["response_type"] = json!(visibility.response_type());
        let res = self
            .client
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("response_url post failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatChannel for SlackChannel {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), String> {
        self.call(
            "chat.postMessage",
            json!({ "channel": channel_id, "text": text }),
        )
        .await
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), String> {
        let mut body = serde_json::to_value(message).map_err(|e| e.to_string())?;
        body["channel"] = json!(channel_id);
        self.call("chat.postMessage", body).await
    }

    async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str) -> Result<(), String> {
        self.call(
            "reactions.add",
            json!({ "channel": channel_id, "timestamp": ts, "name": name }),
        )
        .await
    }
}

/// Resolve the Slack API base URL (SLACK_API_BASE override for tests or proxies).
pub fn slack_api_base() -> String {
    std::env::var("SLACK_API_BASE").unwrap_or_else(|_| SLACK_API_BASE.to_string())
}
