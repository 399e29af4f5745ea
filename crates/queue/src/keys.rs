//! Stable Redis key layout shared across the runtime.  Every key goes
//! through these constructors so the prefix is applied uniformly.

#[derive(Debug, Clone)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// List of JSON `ActionCommand`s awaiting the action poller.
    pub fn pending_actions(&self, bot: &str) -> String {
        format!("{}pending_actions:{bot}", self.prefix)
    }

    /// List of JSON broadcast payloads for cross-bot ingest.
    pub fn broadcast_queue(&self, bot: &str) -> String {
        format!("{}broadcast:queue:{bot}", self.prefix)
    }

    /// TTL=60s debounce for immediate daily-life triggers.
    pub fn trigger_debounce(&self, bot: &str) -> String {
        format!("{}bot:{bot}:trigger_debounce", self.prefix)
    }

    /// Timestamp of the bot's last autonomous action (60 s self-cooldown).
    pub fn last_autonomous_action(&self, bot: &str) -> String {
        format!("{}bot:{bot}:last_autonomous_action", self.prefix)
    }

    /// Daily reaction counter, keyed by date (`YYYY-MM-DD`).
    pub fn reaction_daily(&self, bot: &str, date: &str) -> String {
        format!("{}reaction:{bot}:daily:{date}", self.prefix)
    }

    /// Per-channel hourly reaction counter (`YYYY-MM-DD-HH`).
    pub fn reaction_channel(&self, bot: &str, channel_id: &str, hour: &str) -> String {
        format!("{}reaction:{bot}:channel:{channel_id}:{hour}", self.prefix)
    }

    /// Last-reaction marker per user (cooldown).
    pub fn reaction_user(&self, bot: &str, user_id: &str) -> String {
        format!("{}reaction:{bot}:user:{user_id}", self.prefix)
    }

    /// Pending artifact metadata list (5-minute TTL).
    pub fn pending_artifacts(&self, user_id: &str) -> String {
        format!("{}pending_images:{user_id}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_documented_keys() {
        let keys = KeyLayout::new("");
        assert_eq!(keys.pending_actions("elena"), "pending_actions:elena");
        assert_eq!(keys.broadcast_queue("elena"), "broadcast:queue:elena");
        assert_eq!(keys.trigger_debounce("elena"), "bot:elena:trigger_debounce");
        assert_eq!(
            keys.last_autonomous_action("elena"),
            "bot:elena:last_autonomous_action"
        );
        assert_eq!(
            keys.reaction_channel("elena", "123", "2026-08-01-09"),
            "reaction:elena:channel:123:2026-08-01-09"
        );
        assert_eq!(keys.pending_artifacts("u1"), "pending_images:u1");
    }

    #[test]
    fn prefix_is_applied_everywhere() {
        let keys = KeyLayout::new("we:");
        assert_eq!(keys.pending_actions("elena"), "we:pending_actions:elena");
        assert_eq!(keys.reaction_daily("elena", "2026-08-01"), "we:reaction:elena:daily:2026-08-01");
    }
}
