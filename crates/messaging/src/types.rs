//! Wire types crossing the messaging adapter boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.starts_with("image/") {
                return true;
            }
        }
        let lower = self.filename.to_lowercase();
        [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".tiff"]
            .iter()
            .any(|ext| lower.ends_with(ext))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sticker {
    pub name: String,
}

/// A forwarded-message snapshot attached to an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardedMessage {
    pub content: String,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Reference to another message (a reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: String,
    pub author_id: Option<String>,
    pub author_is_bot: bool,
    pub content: Option<String>,
}

/// What the gateway hands the core for every incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub author_id: String,
    pub author_is_bot: bool,
    pub author_name: String,
    pub content: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub is_dm: bool,
    /// User ids mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// True when this bot was mentioned directly.
    #[serde(default)]
    pub mentions_bot: bool,
    pub reference: Option<MessageReference>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub forwards: Vec<ForwardedMessage>,
    pub created_at: DateTime<Utc>,
}

/// One message observed in a channel, as captured in sensory snapshots and
/// history fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
    pub mentions_bot: bool,
    pub reference_id: Option<String>,
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub can_read: bool,
    pub can_send: bool,
}

/// The closed set of autonomous actions the poller can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reply,
    React,
    Post,
    ReachOut,
}

/// Produced by the daily-life graph; consumed by the action poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCommand {
    pub action_type: ActionType,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Author of the message being replied to — the principal the incoming
    /// turn is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_content: Option<String>,
    #[serde(default)]
    pub target_is_bot: bool,
    /// Other humans recently active in the channel; their trust also moves.
    #[serde(default)]
    pub context_user_ids: Vec<String>,
    /// Recent channel messages for multi-party knowledge attribution.
    #[serde(default)]
    pub context_messages: Vec<ContextMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl ActionCommand {
    pub fn post(channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Post,
            channel_id: channel_id.into(),
            target_message_id: None,
            content: Some(content.into()),
            emoji: None,
            target_author_id: None,
            target_author_name: None,
            target_content: None,
            target_is_bot: false,
            context_user_ids: Vec::new(),
            context_messages: Vec::new(),
        }
    }

    pub fn react(
        channel_id: impl Into<String>,
        target_message_id: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            action_type: ActionType::React,
            channel_id: channel_id.into(),
            target_message_id: Some(target_message_id.into()),
            content: None,
            emoji: Some(emoji.into()),
            target_author_id: None,
            target_author_name: None,
            target_content: None,
            target_is_bot: false,
            context_user_ids: Vec::new(),
            context_messages: Vec::new(),
        }
    }
}
