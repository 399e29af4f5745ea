//! Autonomous emoji reactions, independent of the daily-life loop.
//!
//! Decisions are rule-based — no model calls — and bounded by per-channel
//! hourly caps, per-user cooldowns, and a daily global cap kept in broker
//! counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tracing::debug;

use whisperengine_config::{CharacterProfile, ReactionConfig};
use whisperengine_queue::{Broker, KeyLayout};

/// Sentiment and intent word sets for reaction decisions.
const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "beautiful", "brilliant", "cool", "excellent",
    "fantastic", "good", "great", "happy", "incredible", "love", "nice",
    "perfect", "super", "thanks", "wonderful", "wow", "yay", "excited",
    "proud", "congrats", "congratulations", "celebrate",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "hate", "terrible", "awful", "horrible", "sad", "angry",
    "frustrated", "annoyed", "disappointed", "worried", "scared",
];

const QUESTION_STARTERS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could",
    "would", "should", "is", "are", "do", "does", "did", "has", "have",
];

const SUPPORT_TRIGGERS: &[&str] = &[
    "struggling", "rough", "difficult", "stressed", "overwhelmed", "tired",
    "exhausted", "anxious", "nervous", "scared", "afraid", "alone",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionDecision {
    pub should_react: bool,
    pub emojis: Vec<String>,
    pub delay_seconds: f64,
    pub reason: String,
}

impl ReactionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_react: false,
            emojis: Vec::new(),
            delay_seconds: 0.0,
            reason: reason.into(),
        }
    }
}

/// Cheap content analysis backing the decision.
#[derive(Debug, Clone)]
pub struct MessageAnalysis {
    pub sentiment: &'static str,
    pub is_question: bool,
    pub needs_support: bool,
    pub is_excited: bool,
    pub word_count: usize,
}

pub fn analyze_message(content: &str) -> MessageAnalysis {
    let lower = content.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(*w)).count();
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(*w)).count();
    let sentiment = if positive > negative && positive >= 1 {
        "positive"
    } else if negative > positive && negative >= 1 {
        "negative"
    } else {
        "neutral"
    };

    let first_word = words.first().copied().unwrap_or("");
    let is_question = content.contains('?') || QUESTION_STARTERS.contains(&first_word);
    let needs_support = words.iter().any(|w| SUPPORT_TRIGGERS.contains(w));
    let is_excited = (!content.is_empty() && content == content.to_uppercase() && content.chars().any(|c| c.is_alphabetic()))
        || content.matches('!').count() >= 2;

    MessageAnalysis {
        sentiment,
        is_question,
        needs_support,
        is_excited,
        word_count: words.len(),
    }
}

pub struct ReactionAgent {
    bot_name: String,
    character: CharacterProfile,
    limits: ReactionConfig,
    broker: Arc<dyn Broker>,
    keys: KeyLayout,
    rng: Mutex<StdRng>,
}

impl ReactionAgent {
    pub fn new(
        bot_name: impl Into<String>,
        character: CharacterProfile,
        limits: ReactionConfig,
        broker: Arc<dyn Broker>,
        keys: KeyLayout,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            character,
            limits,
            broker,
            keys,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic RNG for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Decide whether to react and with which emojis.
    pub async fn decide(
        &self,
        content: &str,
        author_id: &str,
        author_is_bot: bool,
        channel_id: &str,
        is_command: bool,
    ) -> ReactionDecision {
        let style = &self.character.reactions;
        if !style.enabled {
            return ReactionDecision::skip("reactions_disabled");
        }
        if author_is_bot {
            return ReactionDecision::skip("author_is_bot");
        }
        if is_command || content.starts_with(['/', '!', '.']) {
            return ReactionDecision::skip("is_command");
        }
        if content.len() < 5 {
            return ReactionDecision::skip("too_short");
        }

        if let Some(reason) = self.rate_limited(channel_id, author_id).await {
            return ReactionDecision::skip(format!("cooldown:{reason}"));
        }

        let analysis = analyze_message(content);

        let mut probability = style.base_rate;
        if analysis.sentiment == "positive" {
            probability += 0.2;
        }
        if analysis.is_excited {
            probability += 0.15;
        }
        if analysis.word_count < 10 {
            probability *= 0.7;
        }

        let mut rng = self.rng.lock().await;
        let roll: f64 = rng.r#gen();
        if roll > probability {
            return ReactionDecision::skip(format!("random_skip:{roll:.2}>{probability:.2}"));
        }

        let (emojis, category) = self.select_emojis(&analysis, &mut rng);
        if emojis.is_empty() {
            return ReactionDecision::skip("no_emoji_match");
        }

        let delay = rng.gen_range(style.delay_min_secs as f64..=style.delay_max_secs as f64);
        ReactionDecision {
            should_react: true,
            emojis,
            delay_seconds: delay,
            reason: format!("category:{category}"),
        }
    }

    fn select_emojis(&self, analysis: &MessageAnalysis, rng: &mut StdRng) -> (Vec<String>, &'static str) {
        let sets = &self.character.emoji_sets;
        let mut candidates: Vec<String> = Vec::new();
        let mut category = "neutral";

        if analysis.needs_support {
            candidates.extend(sets.supportive.iter().cloned());
            category = "support";
        } else if analysis.is_excited || analysis.sentiment == "positive" {
            if rng.gen_bool(0.7) {
                candidates.extend(sets.positive.iter().cloned());
                category = "positive";
            } else {
                candidates.extend(sets.excitement.iter().cloned());
                category = "excitement";
            }
        } else if analysis.is_question {
            candidates.extend(sets.thinking.iter().cloned());
            category = "thinking";
        } else if rng.gen_bool(0.5) {
            candidates.extend(sets.positive.iter().take(2).cloned());
            category = "light_positive";
        }

        if !sets.signature.is_empty() && rng.gen_bool(0.2) {
            candidates.extend(sets.signature.iter().cloned());
            if category == "neutral" {
                category = "signature";
            }
        }

        if candidates.is_empty() {
            return (Vec::new(), "no_match");
        }

        let count = if rng.gen_bool(0.8) { 1 } else { 2 };
        let mut picked = Vec::new();
        for _ in 0..count.min(candidates.len()) {
            let idx = rng.gen_range(0..candidates.len());
            picked.push(candidates.swap_remove(idx));
        }
        (picked, category)
    }

    async fn rate_limited(&self, channel_id: &str, user_id: &str) -> Option<&'static str> {
        let now = Utc::now();
        let daily_key = self
            .keys
            .reaction_daily(&self.bot_name, &now.format("%Y-%m-%d").to_string());
        let channel_key = self.keys.reaction_channel(
            &self.bot_name,
            channel_id,
            &now.format("%Y-%m-%d-%H").to_string(),
        );
        let user_key = self.keys.reaction_user(&self.bot_name, user_id);

        if let Ok(Some(raw)) = self.broker.get(&daily_key).await {
            if raw.parse::<u32>().unwrap_or(0) >= self.limits.daily_max {
                return Some("daily_limit");
            }
        }
        if let Ok(Some(raw)) = self.broker.get(&channel_key).await {
            if raw.parse::<u32>().unwrap_or(0) >= self.limits.channel_hourly_max {
                return Some("channel_limit");
            }
        }
        if let Ok(Some(raw)) = self.broker.get(&user_key).await {
            if let Ok(last) = raw.parse::<DateTime<Utc>>() {
                if (now - last).num_seconds() < self.limits.same_user_cooldown_secs {
                    return Some("user_cooldown");
                }
            }
        }
        None
    }

    /// Record a sent reaction in all three counters.
    pub async fn record(&self, channel_id: &str, user_id: &str) {
        let now = Utc::now();
        let daily_key = self
            .keys
            .reaction_daily(&self.bot_name, &now.format("%Y-%m-%d").to_string());
        let channel_key = self.keys.reaction_channel(
            &self.bot_name,
            channel_id,
            &now.format("%Y-%m-%d-%H").to_string(),
        );
        let user_key = self.keys.reaction_user(&self.bot_name, user_id);

        // Counter TTLs: daily survives 48h, hourly 2h, user for its cooldown.
        let _ = self.broker.incr_with_expiry(&daily_key, 172_800).await;
        let _ = self.broker.incr_with_expiry(&channel_key, 7_200).await;
        let _ = self
            .broker
            .set_ex(
                &user_key,
                &now.to_rfc3339(),
                self.limits.same_user_cooldown_secs.max(0) as u64,
            )
            .await;
        debug!(channel_id, user_id, "reaction recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisperengine_queue::InMemoryBroker;

    fn agent(base_rate: f64) -> ReactionAgent {
        let mut character = CharacterProfile::default();
        character.reactions.base_rate = base_rate;
        ReactionAgent::new(
            "elena",
            character,
            ReactionConfig::default(),
            Arc::new(InMemoryBroker::new()),
            KeyLayout::new(""),
        )
        .with_seed(42)
    }

    #[test]
    fn analysis_detects_signals() {
        let a = analyze_message("what an amazing and wonderful day, congrats!");
        assert_eq!(a.sentiment, "positive");

        let b = analyze_message("how does this work?");
        assert!(b.is_question);

        let c = analyze_message("I'm so stressed and overwhelmed lately");
        assert!(c.needs_support);

        let d = analyze_message("THIS IS INCREDIBLE");
        assert!(d.is_excited);
    }

    #[tokio::test]
    async fn bots_and_commands_are_never_reacted_to() {
        let agent = agent(1.0);
        let bot = agent.decide("amazing work", "u1", true, "c1", false).await;
        assert!(!bot.should_react);
        assert_eq!(bot.reason, "author_is_bot");

        let command = agent.decide("/help me here", "u1", false, "c1", false).await;
        assert!(!command.should_react);
        assert_eq!(command.reason, "is_command");
    }

    #[tokio::test]
    async fn short_messages_are_skipped() {
        let agent = agent(1.0);
        let decision = agent.decide("ok", "u1", false, "c1", false).await;
        assert_eq!(decision.reason, "too_short");
    }

    #[tokio::test]
    async fn certain_rate_reacts_with_delay_in_range() {
        let agent = agent(1.0);
        let decision = agent
            .decide(
                "this is truly amazing wonderful fantastic news and I am so happy about it!",
                "u1",
                false,
                "c1",
                false,
            )
            .await;
        assert!(decision.should_react, "reason: {}", decision.reason);
        assert!(!decision.emojis.is_empty());
        assert!(decision.emojis.len() <= 2);
        assert!(decision.delay_seconds >= 2.0 && decision.delay_seconds <= 15.0);
    }

    #[tokio::test]
    async fn zero_rate_never_reacts_to_neutral_text() {
        let agent = agent(0.0);
        // Neutral, non-excited text gets no probability boosts.
        let decision = agent
            .decide("the library opens at nine most weekdays here", "u1", false, "c1", false)
            .await;
        assert!(!decision.should_react);
    }

    #[tokio::test]
    async fn user_cooldown_blocks_repeat_reactions() {
        let agent = agent(1.0);
        agent.record("c1", "u1").await;
        let decision = agent
            .decide("another amazing wonderful message right away!", "u1", false, "c1", false)
            .await;
        assert_eq!(decision.reason, "cooldown:user_cooldown");
    }

    #[tokio::test]
    async fn daily_cap_blocks_after_limit() {
        let mut character = CharacterProfile::default();
        character.reactions.base_rate = 1.0;
        let broker = Arc::new(InMemoryBroker::new());
        let limits = ReactionConfig { daily_max: 2, ..Default::default() };
        let agent = ReactionAgent::new("elena", character, limits, broker, KeyLayout::new(""))
            .with_seed(1);

        agent.record("c1", "u1").await;
        agent.record("c2", "u2").await;

        let decision = agent
            .decide("truly amazing wonderful fantastic stuff!", "u3", false, "c3", false)
            .await;
        assert_eq!(decision.reason, "cooldown:daily_limit");
    }

    #[tokio::test]
    async fn supportive_content_draws_supportive_emojis() {
        let mut character = CharacterProfile::default();
        character.reactions.base_rate = 1.0;
        let supportive = character.emoji_sets.supportive.clone();
        let agent = ReactionAgent::new(
            "elena",
            character,
            ReactionConfig::default(),
            Arc::new(InMemoryBroker::new()),
            KeyLayout::new(""),
        )
        .with_seed(3);

        let decision = agent
            .decide(
                "I'm really struggling lately and I feel so overwhelmed by everything going on",
                "u1",
                false,
                "c1",
                false,
            )
            .await;
        assert!(decision.should_react);
        assert!(decision.emojis.iter().all(|e| supportive.contains(e)));
        assert_eq!(decision.reason, "category:support");
    }
}
