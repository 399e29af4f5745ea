//! Sensory snapshot and planning types for the daily-life loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use whisperengine_messaging::MessageSnapshot;

/// Messages older than this are invisible to perceive.
pub const PERCEIVE_WINDOW_MINUTES: i64 = 15;
/// Perceive keeps at most this many scored messages.
pub const PERCEIVE_TOP_K: usize = 5;
/// Interest-cosine floor below which a message is not worth attention.
pub const RELEVANCE_THRESHOLD: f32 = 0.55;
/// Probability of actually posting into a quiet eligible channel per tick.
pub const QUIET_POST_PROBABILITY: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channel_id: String,
    pub channel_name: String,
    /// Last ~20 messages, oldest first.
    pub messages: Vec<MessageSnapshot>,
}

/// Periodic capture of the bot's observable environment, shipped to the
/// cognition queue as the daily-life graph's input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorySnapshot {
    pub bot_name: String,
    pub timestamp: DateTime<Utc>,
    pub channels: Vec<ChannelSnapshot>,
    pub watch_channels: Vec<String>,
    /// Message ids that mentioned the bot since the last snapshot.
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl SensorySnapshot {
    pub fn find_message(&self, message_id: &str) -> Option<(&ChannelSnapshot, &MessageSnapshot)> {
        self.channels.iter().find_map(|ch| {
            ch.messages
                .iter()
                .find(|m| m.id == message_id)
                .map(|m| (ch, m))
        })
    }
}

/// Perceive output: a message worth the planner's attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub message: MessageSnapshot,
    pub score: f32,
    pub relevance_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanIntent {
    Reply,
    React,
    Post,
    Ignore,
}

/// Plan output: one intended action, pre-content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub intent: PlanIntent,
    #[serde(default)]
    pub target_message_id: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_message(id: &str) -> SensorySnapshot {
        SensorySnapshot {
            bot_name: "elena".to_string(),
            timestamp: Utc::now(),
            channels: vec![ChannelSnapshot {
                channel_id: "c1".to_string(),
                channel_name: "general".to_string(),
                messages: vec![MessageSnapshot {
                    id: id.to_string(),
                    content: "hello".to_string(),
                    author_id: "u1".to_string(),
                    author_name: "User".to_string(),
                    is_bot: false,
                    created_at: Utc::now(),
                    mentions_bot: false,
                    reference_id: None,
                    channel_id: "c1".to_string(),
                }],
            }],
            watch_channels: Vec::new(),
            mentions: Vec::new(),
        }
    }

    #[test]
    fn find_message_locates_channel_and_message() {
        let snapshot = snapshot_with_message("m42");
        let (channel, message) = snapshot.find_message("m42").unwrap();
        assert_eq!(channel.channel_id, "c1");
        assert_eq!(message.id, "m42");
        assert!(snapshot.find_message("missing").is_none());
    }

    #[test]
    fn snapshot_serde_round_trip() {
        let snapshot = snapshot_with_message("m1");
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SensorySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bot_name, "elena");
        assert_eq!(back.channels.len(), 1);
    }
}
