//! Universe events: cross-bot, privacy-filtered notifications about a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Events whose propagation depth reaches this value are dropped; gossip can
/// never re-gossip.
pub const MAX_PROPAGATION_DEPTH: u8 = 1;

/// Topics that are never shared across bots, matched as substrings of the
/// event topic and summary.
pub const SENSITIVE_TOPICS: &[&str] = &[
    "health", "medical", "doctor", "therapy", "medication", "diagnosis",
    "finance", "money", "debt", "salary", "income", "bankrupt",
    "relationship", "dating", "partner", "divorce", "breakup",
    "legal", "lawsuit", "arrest", "crime", "court",
    "secret", "private", "confidential", "don't tell",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Major life event (new job, moved, etc.).
    UserUpdate,
    /// User is notably happy/sad.
    EmotionalSpike,
    /// User revealed a new interest or hobby.
    TopicDiscovery,
    /// User completed something meaningful.
    GoalAchieved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserUpdate => "user_update",
            EventType::EmotionalSpike => "emotional_spike",
            EventType::TopicDiscovery => "topic_discovery",
            EventType::GoalAchieved => "goal_achieved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseEvent {
    pub event_type: EventType,
    pub user_id: String,
    pub source_bot: String,
    /// Privacy-safe one-liner — never the user's raw text.
    pub summary: String,
    pub topic: String,
    /// 0 = from user interaction, 1 = derived from another event.
    pub propagation_depth: u8,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UniverseEvent {
    pub fn new(
        event_type: EventType,
        user_id: impl Into<String>,
        source_bot: impl Into<String>,
        summary: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            user_id: user_id.into(),
            source_bot: source_bot.into(),
            summary: summary.into(),
            topic: topic.into(),
            propagation_depth: 0,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// True when the topic or summary touches a sensitive subject.
    pub fn is_sensitive(&self) -> bool {
        let topic = self.topic.to_lowercase();
        let summary = self.summary.to_lowercase();
        SENSITIVE_TOPICS
            .iter()
            .any(|kw| topic.contains(kw) || summary.contains(kw))
    }

    /// Deterministic job id: one gossip dispatch per
    /// `(user, source bot, event type)` at a time.
    pub fn job_id(&self) -> String {
        format!(
            "gossip_{}_{}_{}",
            self.user_id,
            self.source_bot,
            self.event_type.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_topic_is_sensitive() {
        let event = UniverseEvent::new(
            EventType::EmotionalSpike,
            "u1",
            "elena",
            "seems to be going through a tough time",
            "health",
        );
        assert!(event.is_sensitive());
    }

    #[test]
    fn sensitive_keyword_in_summary_is_caught() {
        let event = UniverseEvent::new(
            EventType::UserUpdate,
            "u1",
            "elena",
            "mentioned a new medication routine",
            "wellness",
        );
        assert!(event.is_sensitive());
    }

    #[test]
    fn career_topic_is_not_sensitive() {
        let event = UniverseEvent::new(
            EventType::UserUpdate,
            "u1",
            "elena",
            "has news about their career",
            "career",
        );
        assert!(!event.is_sensitive());
    }

    #[test]
    fn job_id_is_deterministic() {
        let event = UniverseEvent::new(EventType::UserUpdate, "u1", "elena", "s", "career");
        assert_eq!(event.job_id(), "gossip_u1_elena_user_update");
    }

    #[test]
    fn serde_round_trip() {
        let event = UniverseEvent::new(EventType::GoalAchieved, "u1", "elena", "s", "t");
        let json = serde_json::to_string(&event).unwrap();
        let back: UniverseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::GoalAchieved);
        assert_eq!(back.propagation_depth, 0);
    }
}
