//! Ingress gatekeeping: validation, DM blocking, blocked senders, and
//! cross-post (spam) suppression.  Everything here runs before any memory or
//! model work.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::types::InboundMessage;

/// Hard inbound content ceiling; longer messages get a short user-visible
/// error instead of processing.
pub const MAX_INBOUND_CHARS: usize = 2000;

/// Why an inbound message was suppressed before processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressVerdict {
    Accept,
    /// Content failed validation; reply with the short message and stop.
    Invalid(&'static str),
    /// Dropped with no user-visible reply.
    Drop(&'static str),
    /// DM from a non-allowlisted user; reply with the DM policy text.
    DmBlocked,
}

pub struct IngressPolicy {
    pub enable_dm_block: bool,
    pub dm_allowed_user_ids: Vec<String>,
    pub blocked_user_ids: Vec<String>,
}

impl IngressPolicy {
    /// Gate one inbound message.  Bots are never blocked here — bot-to-bot
    /// eligibility is decided by the autonomy layer.
    pub fn check(&self, message: &InboundMessage) -> IngressVerdict {
        if self.blocked_user_ids.iter().any(|b| b == &message.author_id) {
            return IngressVerdict::Drop("blocked_user");
        }

        if message.is_dm
            && self.enable_dm_block
            && !self.dm_allowed_user_ids.iter().any(|a| a == &message.author_id)
        {
            return IngressVerdict::DmBlocked;
        }

        // Sticker-only / attachment-only / forward-only messages are valid;
        // empty means nothing at all arrived.
        let has_side_content = !message.attachments.is_empty()
            || !message.stickers.is_empty()
            || !message.forwards.is_empty();
        if message.content.trim().is_empty() && !has_side_content {
            return IngressVerdict::Invalid("I didn't catch anything in that message.");
        }

        if message.content.chars().count() > MAX_INBOUND_CHARS {
            return IngressVerdict::Invalid(
                "That message is a bit too long for me — could you split it up?",
            );
        }

        IngressVerdict::Accept
    }
}

// ── Cross-post detection ──────────────────────────────────────────────────────

/// Flags identical content posted to several channels in a short window.
pub struct CrosspostDetector {
    window: Duration,
    channel_threshold: usize,
    /// `(user, content hash)` → (channels seen, first seen, already warned).
    seen: Mutex<HashMap<(String, String), CrosspostRecord>>,
}

struct CrosspostRecord {
    channels: Vec<String>,
    first_seen: DateTime<Utc>,
    warned: bool,
}

/// Result of a cross-post check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrosspostVerdict {
    pub is_spam: bool,
    /// True the first time this content crosses the threshold — warn once.
    pub should_warn: bool,
}

impl CrosspostDetector {
    pub fn new() -> Self {
        Self {
            window: Duration::minutes(10),
            channel_threshold: 3,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn fingerprint(content: &str) -> String {
        let normalized = content.trim().to_lowercase();
        format!("{:x}", Sha256::digest(normalized.as_bytes()))
    }

    pub async fn check(
        &self,
        user_id: &str,
        channel_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> CrosspostVerdict {
        if content.trim().len() < 20 {
            // Short interjections repeat naturally; only long content counts.
            return CrosspostVerdict { is_spam: false, should_warn: false };
        }

        let key = (user_id.to_string(), Self::fingerprint(content));
        let mut seen = self.seen.lock().await;

        // Window sweep keeps the map bounded.
        seen.retain(|_, rec| now - rec.first_seen <= self.window);

        let record = seen.entry(key).or_insert_with(|| CrosspostRecord {
            channels: Vec::new(),
            first_seen: now,
            warned: false,
        });

        if !record.channels.iter().any(|c| c == channel_id) {
            record.channels.push(channel_id.to_string());
        }

        let is_spam = record.channels.len() >= self.channel_threshold;
        let should_warn = is_spam && !record.warned;
        if should_warn {
            record.warned = true;
        }
        CrosspostVerdict { is_spam, should_warn }
    }
}

impl Default for CrosspostDetector {
    fn default() -> Self {
        Self::new()
    }
}
