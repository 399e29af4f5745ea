//! Channel activity monitor feeding snapshot channel selection.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Per-channel message timestamps within a sliding window.
pub struct ActivityMonitor {
    window: Duration,
    events: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl ActivityMonitor {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
            events: Mutex::new(HashMap::new()),
        }
    }

    pub async fn record_message(&self, channel_id: &str, at: DateTime<Utc>) {
        let mut events = self.events.lock().await;
        let queue = events.entry(channel_id.to_string()).or_default();
        queue.push_back(at);
        let cutoff = at - self.window;
        while queue.front().is_some_and(|t| *t < cutoff) {
            queue.pop_front();
        }
    }

    /// The `n` most active channels in the window ending at `now`,
    /// most-active first.
    pub async fn top_channels(&self, now: DateTime<Utc>, n: usize) -> Vec<String> {
        let cutoff = now - self.window;
        let events = self.events.lock().await;
        let mut counts: Vec<(String, usize)> = events
            .iter()
            .map(|(channel, times)| {
                let recent = times.iter().filter(|t| **t >= cutoff).count();
                (channel.clone(), recent)
            })
            .filter(|(_, count)| *count > 0)
            .collect();
        counts.sort_by(|(ac, a), (bc, b)| b.cmp(a).then_with(|| ac.cmp(bc)));
        counts.into_iter().take(n).map(|(c, _)| c).collect()
    }
}
