//! Moderation timeouts.  A timed-out user gets a scripted "cold" line from
//! the character's configured set and no memory write of the bot's reply;
//! positive trust deltas stay blocked until expiry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use whisperengine_config::CharacterProfile;

#[derive(Default)]
pub struct TimeoutManager {
    timeouts: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_timeout(&self, user_id: &str, until: DateTime<Utc>) {
        self.timeouts
            .lock()
            .await
            .insert(user_id.to_string(), until);
    }

    pub async fn clear(&self, user_id: &str) {
        self.timeouts.lock().await.remove(user_id);
    }

    pub async fn is_timed_out(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut timeouts = self.timeouts.lock().await;
        match timeouts.get(user_id) {
            Some(until) if *until > now => true,
            Some(_) => {
                // Expired entries are swept lazily.
                timeouts.remove(user_id);
                false
            }
            None => false,
        }
    }
}

/// Pick a scripted cold response for a timed-out user.
pub fn cold_response(character: &CharacterProfile) -> String {
    let pool = &character.cold_responses;
    if pool.is_empty() {
        return "I don't have anything to say to you right now.".to_string();
    }
    let idx = rand::thread_rng().gen_range(0..pool.len());
    pool[idx].clone()
}

/// Pick a fallback error line for unexpected response-path failures.
pub fn error_response(character: &CharacterProfile) -> String {
    let pool = &character.error_messages;
    if pool.is_empty() {
        return "I'm having a bit of trouble processing that right now. Please try again later."
            .to_string();
    }
    let idx = rand::thread_rng().gen_range(0..pool.len());
    pool[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn timeout_expires() {
        let manager = TimeoutManager::new();
        let now = Utc::now();
        manager.set_timeout("u1", now + Duration::minutes(5)).await;
        assert!(manager.is_timed_out("u1", now).await);
        assert!(!manager.is_timed_out("u1", now + Duration::minutes(6)).await);
        // Lazy sweep removed the entry.
        assert!(!manager.is_timed_out("u1", now).await);
    }

    #[tokio::test]
    async fn unknown_user_is_not_timed_out() {
        let manager = TimeoutManager::new();
        assert!(!manager.is_timed_out("nobody", Utc::now()).await);
    }

    #[test]
    fn cold_and_error_responses_never_empty() {
        let character = CharacterProfile::default();
        assert!(!cold_response(&character).is_empty());
        assert!(!error_response(&character).is_empty());

        let mut bare = CharacterProfile::default();
        bare.cold_responses.clear();
        bare.error_messages.clear();
        assert!(!cold_response(&bare).is_empty());
        assert!(!error_response(&bare).is_empty());
    }
}
