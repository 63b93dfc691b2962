//! Discord control surface
//!
//! REST calls create, fetch and edit the control message (one embed plus
//! one button row) and acknowledge button presses. Presses arrive over the
//! gateway websocket, see `gateway.rs`.

use super::gateway::{self, GatewayConfig};
use super::{ControlSurface, MessageRef, UserAction};
use crate::error::{Error, Result};
use crate::render::{Action, RenderedPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interaction callback type 6: acknowledge without changing the message
const DEFERRED_UPDATE_MESSAGE: u8 = 6;

const COMPONENT_ACTION_ROW: u8 = 1;
const COMPONENT_BUTTON: u8 = 2;
const BUTTON_SUCCESS: u8 = 3;
const BUTTON_DANGER: u8 = 4;

// Embed limits enforced by the API, in characters
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;

struct GatewayTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Discord channel hosting the control message
pub struct DiscordSurface {
    bot_token: String,
    channel_id: String,
    api_base: String,
    gateway_url: String,
    client: reqwest::Client,
    gateway: Mutex<Option<GatewayTask>>,
}

impl DiscordSurface {
    pub fn new(bot_token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_id: channel_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            gateway_url: gateway::DEFAULT_GATEWAY_URL.to_string(),
            client: reqwest::Client::new(),
            gateway: Mutex::new(None),
        }
    }

    /// Point REST calls somewhere else (proxies, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Point the gateway connection somewhere else (tests)
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    fn message_url(&self, message_id: Option<&str>) -> String {
        match message_id {
            Some(id) => format!("{}/channels/{}/messages/{}", self.api_base, self.channel_id, id),
            None => format!("{}/channels/{}/messages", self.api_base, self.channel_id),
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis.
fn truncate(text: &str, limit: usize) -> Cow<'_, str> {
    if text.chars().count() <= limit {
        return Cow::Borrowed(text);
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    Cow::Owned(cut)
}

/// Build the create/edit body for a rendered payload.
pub fn message_body(payload: &RenderedPayload, timestamp: DateTime<Utc>) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = payload
        .fields
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": truncate(&f.name, FIELD_NAME_LIMIT),
                "value": truncate(&f.value, FIELD_VALUE_LIMIT),
                "inline": false,
            })
        })
        .collect();
    let style = match payload.action {
        Action::Connect => BUTTON_SUCCESS,
        Action::Disconnect => BUTTON_DANGER,
    };

    serde_json::json!({
        "embeds": [{
            "title": truncate(&payload.title, TITLE_LIMIT),
            "description": truncate(&payload.description, DESCRIPTION_LIMIT),
            "color": payload.color.rgb(),
            "fields": fields,
            "timestamp": timestamp.to_rfc3339(),
        }],
        "components": [{
            "type": COMPONENT_ACTION_ROW,
            "components": [{
                "type": COMPONENT_BUTTON,
                "style": style,
                "label": payload.action.label(),
                "emoji": { "name": payload.action.emoji() },
                "custom_id": payload.action.id(),
            }],
        }],
    })
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    Err(Error::Surface(format!(
        "Discord API error {} while {}: {}",
        status, what, error_text
    )))
}

#[async_trait]
impl ControlSurface for DiscordSurface {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self, actions: mpsc::Sender<UserAction>) -> Result<()> {
        let mut slot = self.gateway.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        if self.bot_token.is_empty() {
            return Err(Error::Config("Discord bot token is empty".to_string()));
        }

        let (stop, stop_rx) = watch::channel(false);
        let config = GatewayConfig {
            url: self.gateway_url.clone(),
            token: self.bot_token.clone(),
        };
        let task = tokio::spawn(gateway::run(config, actions, stop_rx));
        *slot = Some(GatewayTask { stop, task });

        tracing::info!(channel_id = %self.channel_id, "Discord surface started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(GatewayTask { stop, mut task }) = self.gateway.lock().await.take() else {
            return Ok(());
        };
        let _ = stop.send(true);
        if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
            tracing::warn!("Discord gateway did not stop in time, aborting");
            task.abort();
        }
        tracing::info!("Discord surface stopped");
        Ok(())
    }

    async fn resolve_message(&self, id: &str) -> Result<Option<MessageRef>> {
        let response = self
            .client
            .get(self.message_url(Some(id)))
            .header("Authorization", self.authorization())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let message: DiscordMessage = check(response, "fetching control message")
            .await?
            .json()
            .await?;
        Ok(Some(MessageRef::new(message.id)))
    }

    async fn create_message(&self, payload: &RenderedPayload) -> Result<MessageRef> {
        tracing::debug!(channel_id = %self.channel_id, "Posting control message");
        let response = self
            .client
            .post(self.message_url(None))
            .header("Authorization", self.authorization())
            .json(&message_body(payload, Utc::now()))
            .send()
            .await?;

        let message: DiscordMessage = check(response, "posting control message")
            .await?
            .json()
            .await?;
        Ok(MessageRef::new(message.id))
    }

    async fn update_message(&self, message: &MessageRef, payload: &RenderedPayload) -> Result<()> {
        let response = self
            .client
            .patch(self.message_url(Some(&message.id)))
            .header("Authorization", self.authorization())
            .json(&message_body(payload, Utc::now()))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::SurfaceMissing(message.id.clone()));
        }
        check(response, "editing control message").await?;
        Ok(())
    }

    async fn acknowledge(&self, action: &UserAction) -> Result<()> {
        let url = format!(
            "{}/interactions/{}/{}/callback",
            self.api_base, action.interaction_id, action.token
        );
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "type": DEFERRED_UPDATE_MESSAGE }))
            .send()
            .await?;
        check(response, "acknowledging interaction").await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
}
