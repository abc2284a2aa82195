//! LINE Messaging API channel.
//!
//! Inbound: verifies the `X-Line-Signature` header (base64 HMAC-SHA256 of
//! the raw body keyed by the channel secret) and extracts text message
//! events. Outbound: answers a reply token through the reply endpoint.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use madoguchi_config::LineConfig;
use madoguchi_core::channel::{InboundMessage, ReplyChannel, ReplyHandle};
use madoguchi_core::error::ChannelError;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_URL: &str = "https://api.line.me";

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE rejects text messages longer than this many characters.
const MAX_TEXT_CHARS: usize = 5000;

// ── Webhook payload ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

impl WebhookEvent {
    /// The inbound text message carried by this event, if it is one.
    fn into_text_message(self) -> Option<InboundMessage> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message?;
        if message.kind != "text" {
            return None;
        }
        Some(InboundMessage {
            user_id: self.source?.user_id?,
            text: message.text?,
            reply_handle: ReplyHandle(self.reply_token?),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage>,
}

#[derive(Serialize)]
struct TextMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

// ── Channel ───────────────────────────────────────────────────────────────

/// LINE channel adapter.
pub struct LineChannel {
    channel_secret: String,
    access_token: String,
    api_url: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(channel_secret: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_api_url(channel_secret, access_token, DEFAULT_API_URL)
    }

    pub fn with_api_url(
        channel_secret: impl Into<String>,
        access_token: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            channel_secret: channel_secret.into(),
            access_token: access_token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Build from configuration. Credentials must already be validated.
    pub fn from_config(config: &LineConfig) -> Result<Self, ChannelError> {
        let secret = config
            .channel_secret
            .clone()
            .ok_or_else(|| ChannelError::NotConfigured("LINE channel secret".into()))?;
        let token = config
            .channel_access_token
            .clone()
            .ok_or_else(|| ChannelError::NotConfigured("LINE channel access token".into()))?;
        Ok(match &config.api_url {
            Some(url) => Self::with_api_url(secret, token, url),
            None => Self::new(secret, token),
        })
    }

    /// Validate a base64 HMAC-SHA256 signature of `body`.
    ///
    /// Uses constant-time comparison to prevent timing attacks.
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> bool {
        let Ok(provided) = BASE64.decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.channel_secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&provided).is_ok()
    }

    /// Verify and parse a webhook request into text messages.
    ///
    /// Non-text events (follow, stickers, images, ...) are logged and skipped.
    pub fn parse_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Vec<InboundMessage>, ChannelError> {
        let signature = signature.ok_or(ChannelError::InvalidSignature)?;
        if !self.verify_signature(body, signature) {
            return Err(ChannelError::InvalidSignature);
        }

        let payload: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        let total = payload.events.len();
        let messages: Vec<InboundMessage> = payload
            .events
            .into_iter()
            .filter_map(|event| {
                if event
                    .delivery_context
                    .as_ref()
                    .is_some_and(|c| c.is_redelivery)
                {
                    info!(kind = %event.kind, "LINE redelivered event");
                }
                let kind = event.kind.clone();
                let message = event.into_text_message();
                if message.is_none() {
                    debug!(kind = %kind, "Skipping non-text LINE event");
                }
                message
            })
            .collect();

        debug!(total, text = messages.len(), "LINE webhook parsed");
        Ok(messages)
    }

    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.api_url)
    }
}

/// Cut `text` to what LINE accepts.
fn clamp_text(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    fn name(&self) -> &str {
        "line"
    }

    async fn reply(&self, handle: &ReplyHandle, text: &str) -> Result<(), ChannelError> {
        let body = ReplyRequest {
            reply_token: &handle.0,
            messages: vec![TextMessage {
                kind: "text",
                text: clamp_text(text),
            }],
        };

        let response = self
            .client
            .post(self.reply_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "line".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "LINE reply rejected");
            return Err(ChannelError::DeliveryFailed {
                channel: "line".into(),
                reason: format!("HTTP {}: {}", status.as_u16(), error_body),
            });
        }

        debug!(chars = text.chars().count(), "LINE reply delivered");
        Ok(())
    }
}
