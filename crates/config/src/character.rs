//! Character definition as consumed by the core.  Authoring and loading of
//! the full character format is an external concern; this is the slice the
//! runtime needs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    pub name: String,
    pub display_name: String,
    pub system_prompt: String,
    /// Topics the character gravitates toward; drives snapshot scoring.
    pub interests: Vec<String>,
    /// Named drives with short descriptions, injected into planning prompts.
    pub drives: HashMap<String, String>,
    /// Responses used when the response path fails unexpectedly.
    pub error_messages: Vec<String>,
    /// Scripted "cold" lines used while a user is in moderation timeout.
    pub cold_responses: Vec<String>,
    pub emoji_sets: EmojiSets,
    pub reactions: ReactionStyle,
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            system_prompt: String::new(),
            interests: Vec::new(),
            drives: HashMap::new(),
            error_messages: vec![
                "I'm having a bit of trouble processing that right now. Please try again later."
                    .to_string(),
            ],
            cold_responses: vec!["I don't have anything to say to you right now.".to_string()],
            emoji_sets: EmojiSets::default(),
            reactions: ReactionStyle::default(),
        }
    }
}

impl CharacterProfile {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Interests with a generic fallback so perceive always has something to
    /// score against.
    pub fn interests_or_default(&self) -> Vec<String> {
        if self.interests.is_empty() {
            ["art", "science", "philosophy", "music"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.interests.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiSets {
    pub positive: Vec<String>,
    pub thinking: Vec<String>,
    pub agreement: Vec<String>,
    pub excitement: Vec<String>,
    pub supportive: Vec<String>,
    pub signature: Vec<String>,
}

impl Default for EmojiSets {
    fn default() -> Self {
        Self {
            positive: str_vec(&["❤️", "✨", "🔥", "💯"]),
            thinking: str_vec(&["🤔", "💭", "👀"]),
            agreement: str_vec(&["👍", "💯", "✅"]),
            excitement: str_vec(&["🎉", "🙌", "⭐"]),
            supportive: str_vec(&["💜", "🫂", "💪"]),
            signature: Vec::new(),
        }
    }
}

fn str_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionStyle {
    pub enabled: bool,
    /// Base probability of reacting to an eligible message.
    pub base_rate: f64,
    pub delay_min_secs: u64,
    pub delay_max_secs: u64,
}

impl Default for ReactionStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            base_rate: 0.3,
            delay_min_secs: 2,
            delay_max_secs: 15,
        }
    }
}
