//! The messaging adapter seam.  The actual gateway (Discord client) lives
//! outside the core and implements this trait; everything in the core talks
//! to it and nothing else.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChannelInfo, MessageSnapshot};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("channel {0} not found or not accessible")]
    ChannelUnavailable(String),
    #[error("message {0} not found")]
    MessageNotFound(String),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("gateway call timed out")]
    Timeout,
}

#[async_trait]
pub trait MessagingAdapter: Send + Sync {
    /// Send one (already chunked) message; returns the platform message id.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to_message_id: Option<&str>,
    ) -> Result<String, AdapterError>;

    /// Edit a previously sent message (streaming rendering).
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), AdapterError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError>;

    /// Last `limit` messages in a channel, newest first.
    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageSnapshot>, AdapterError>;

    /// Channels visible to the bot with read/send permission flags.
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, AdapterError>;

    /// Show the typing indicator, best-effort.
    async fn trigger_typing(&self, channel_id: &str) -> Result<(), AdapterError>;

    /// Attach files (path, filename) to the channel.  Gateways without file
    /// support may keep the default no-op.
    async fn send_attachments(
        &self,
        channel_id: &str,
        files: &[(String, String)],
    ) -> Result<(), AdapterError> {
        let _ = (channel_id, files);
        Ok(())
    }
}
