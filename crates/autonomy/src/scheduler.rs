//! Daily-life scheduler: periodically snapshots the environment and ships it
//! to the remote brain via the cognition queue.  Lives next to the messaging
//! adapter.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use whisperengine_config::AutonomyConfig;
use whisperengine_messaging::{InboundMessage, MessagingAdapter};
use whisperengine_queue::{Broker, KeyLayout, QueueName, TaskQueue};

use crate::activity::ActivityMonitor;
use crate::models::{ChannelSnapshot, SensorySnapshot};

/// Messages per channel captured in a snapshot.
const SNAPSHOT_MESSAGES: usize = 20;
/// Activity-driven channels pulled into each snapshot.
const ACTIVE_CHANNEL_LIMIT: usize = 10;
/// Random exploration channels per periodic snapshot.
const EXPLORATION_CHANNELS: usize = 3;
/// Debounce window for immediate triggers.
const TRIGGER_DEBOUNCE_SECS: u64 = 60;
/// A snapshot message younger than this counts as channel activity.
const ACTIVITY_WINDOW_SECS: i64 = 900;

pub struct DailyLifeScheduler {
    bot_name: String,
    flags: AutonomyConfig,
    adapter: Arc<dyn MessagingAdapter>,
    activity: Arc<ActivityMonitor>,
    queue: Arc<TaskQueue>,
    broker: Arc<dyn Broker>,
    keys: KeyLayout,
    last_activity: Mutex<DateTime<Utc>>,
}

impl DailyLifeScheduler {
    pub fn new(
        bot_name: impl Into<String>,
        flags: AutonomyConfig,
        adapter: Arc<dyn MessagingAdapter>,
        activity: Arc<ActivityMonitor>,
        queue: Arc<TaskQueue>,
        broker: Arc<dyn Broker>,
        keys: KeyLayout,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            flags,
            adapter,
            activity,
            queue,
            broker,
            keys,
            last_activity: Mutex::new(Utc::now()),
        }
    }

    /// Long-lived scheduler loop.  Sleeps a random interval between passes
    /// and drains the current pass cleanly on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.flags.enable_autonomous_activity {
            info!("daily-life scheduler disabled");
            return;
        }
        info!(bot = %self.bot_name, "daily-life scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = self.snapshot_and_send().await {
                warn!(%err, "scheduler pass failed");
            }

            let delay = {
                let min = self.flags.scheduler_min_interval_secs;
                let max = self.flags.scheduler_max_interval_secs.max(min + 1);
                rand::thread_rng().gen_range(min..max)
            };
            debug!(delay, "scheduler sleeping");
            tokio::select! {
                _ = tokio::time::sleep(StdDuration::from_secs(delay)) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("daily-life scheduler stopped");
    }

    /// One periodic pass: capture, track silence, enqueue.
    pub async fn snapshot_and_send(&self) -> anyhow::Result<()> {
        let snapshot = self.build_snapshot(None).await;

        let now = Utc::now();
        let has_recent_activity = snapshot
            .as_ref()
            .map(|s| {
                s.channels.iter().any(|ch| {
                    ch.messages
                        .iter()
                        .any(|m| (now - m.created_at).num_seconds() < ACTIVITY_WINDOW_SECS)
                })
            })
            .unwrap_or(false);

        if has_recent_activity {
            *self.last_activity.lock().await = now;
        } else {
            let silence = now - *self.last_activity.lock().await;
            if silence > Duration::seconds(self.flags.dream_threshold_secs) {
                info!(silence_secs = silence.num_seconds(), "silence threshold exceeded; enqueueing reverie");
                self.queue
                    .enqueue(
                        "run_reverie_cycle",
                        QueueName::Cognition,
                        Some(format!("reverie_{}", self.bot_name)),
                        None,
                        serde_json::json!({ "bot_name": self.bot_name }),
                    )
                    .await?;
                *self.last_activity.lock().await = now;
            }
        }

        let Some(snapshot) = snapshot else {
            debug!("no channels to snapshot");
            return Ok(());
        };

        self.enqueue_snapshot(&snapshot).await?;
        info!(channels = snapshot.channels.len(), "snapshot sent to remote brain");
        Ok(())
    }

    async fn enqueue_snapshot(&self, snapshot: &SensorySnapshot) -> anyhow::Result<()> {
        self.queue
            .enqueue(
                "process_daily_life",
                QueueName::Cognition,
                None,
                None,
                serde_json::json!({ "snapshot": snapshot }),
            )
            .await?;
        Ok(())
    }

    /// Capture the environment: watchlist ∪ most-active ∪ exploration ∪
    /// focus channel, last ~20 messages each.
    pub async fn build_snapshot(&self, focus_channel_id: Option<&str>) -> Option<SensorySnapshot> {
        let mut selected: BTreeSet<String> = BTreeSet::new();

        if let Some(focus) = focus_channel_id {
            selected.insert(focus.to_string());
        }
        for channel in &self.flags.watch_channel_ids {
            selected.insert(channel.clone());
        }
        for channel in self
            .activity
            .top_channels(Utc::now(), ACTIVE_CHANNEL_LIMIT)
            .await
        {
            selected.insert(channel);
        }

        // Exploration: a few random readable+sendable channels, only on
        // periodic (non-focused) passes.
        if focus_channel_id.is_none() {
            match self.adapter.list_channels().await {
                Ok(channels) => {
                    let mut candidates: Vec<String> = channels
                        .into_iter()
                        .filter(|c| c.can_read && c.can_send && !selected.contains(&c.id))
                        .map(|c| c.id)
                        .collect();
                    let mut rng = rand::thread_rng();
                    for _ in 0..EXPLORATION_CHANNELS.min(candidates.len()) {
                        let idx = rng.gen_range(0..candidates.len());
                        selected.insert(candidates.swap_remove(idx));
                    }
                }
                Err(err) => debug!(%err, "channel listing failed; skipping exploration"),
            }
        }

        let mut channels = Vec::new();
        let mut mentions = Vec::new();
        for channel_id in &selected {
            match self
                .adapter
                .fetch_recent_messages(channel_id, SNAPSHOT_MESSAGES)
                .await
            {
                Ok(messages) if !messages.is_empty() => {
                    for m in &messages {
                        if m.mentions_bot {
                            mentions.push(m.id.clone());
                        }
                    }
                    let mut oldest_first = messages;
                    oldest_first.sort_by_key(|m| m.created_at);
                    channels.push(ChannelSnapshot {
                        channel_id: channel_id.clone(),
                        channel_name: channel_id.clone(),
                        messages: oldest_first,
                    });
                }
                Ok(_) => {}
                Err(err) => debug!(%err, channel_id, "channel snapshot failed"),
            }
        }

        if channels.is_empty() {
            return None;
        }

        Some(SensorySnapshot {
            bot_name: self.bot_name.clone(),
            timestamp: Utc::now(),
            channels,
            watch_channels: self.flags.watch_channel_ids.clone(),
            mentions,
        })
    }

    /// Immediate trigger for high-signal inbound messages.  Debounced to one
    /// trigger per minute unless the bot was mentioned directly.
    pub async fn trigger_immediate(&self, message: &InboundMessage, reason: &str) -> anyhow::Result<()> {
        if !self.flags.enable_autonomous_activity {
            return Ok(());
        }

        if !message.mentions_bot {
            let debounce_key = self.keys.trigger_debounce(&self.bot_name);
            let acquired = self
                .broker
                .set_nx_ex(&debounce_key, "1", TRIGGER_DEBOUNCE_SECS)
                .await?;
            if !acquired {
                debug!(reason, "immediate trigger debounced");
                return Ok(());
            }
        }

        info!(reason, "immediate daily-life trigger");
        *self.last_activity.lock().await = Utc::now();

        if let Some(snapshot) = self.build_snapshot(Some(&message.channel_id)).await {
            self.enqueue_snapshot(&snapshot).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use whisperengine_messaging::{AdapterError, ChannelInfo, MessageSnapshot};
    use whisperengine_queue::InMemoryBroker;

    struct FakeAdapter {
        channels: Vec<ChannelInfo>,
        messages: Vec<MessageSnapshot>,
    }

    #[async_trait]
    impl MessagingAdapter for FakeAdapter {
        async fn send_message(
            &self,
            _channel_id: &str,
            _content: &str,
            _reply_to: Option<&str>,
        ) -> Result<String, AdapterError> {
            Ok("sent".to_string())
        }
        async fn edit_message(&self, _c: &str, _m: &str, _t: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn add_reaction(&self, _c: &str, _m: &str, _e: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn fetch_recent_messages(
            &self,
            channel_id: &str,
            _limit: usize,
        ) -> Result<Vec<MessageSnapshot>, AdapterError> {
            Ok(self
                .messages
                .iter()
                .filter(|m| m.channel_id == channel_id)
                .cloned()
                .collect())
        }
        async fn list_channels(&self) -> Result<Vec<ChannelInfo>, AdapterError> {
            Ok(self.channels.clone())
        }
        async fn trigger_typing(&self, _c: &str) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn snapshot_message(id: &str, channel: &str) -> MessageSnapshot {
        MessageSnapshot {
            id: id.to_string(),
            content: "hello".to_string(),
            author_id: "u1".to_string(),
            author_name: "User".to_string(),
            is_bot: false,
            created_at: Utc::now(),
            mentions_bot: false,
            reference_id: None,
            channel_id: channel.to_string(),
        }
    }

    fn scheduler(flags: AutonomyConfig, adapter: FakeAdapter) -> (Arc<DailyLifeScheduler>, Arc<TaskQueue>, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::new());
        let queue = Arc::new(TaskQueue::new(broker.clone()));
        let scheduler = Arc::new(DailyLifeScheduler::new(
            "elena",
            flags,
            Arc::new(adapter),
            Arc::new(ActivityMonitor::new(15)),
            queue.clone(),
            broker.clone(),
            KeyLayout::new(""),
        ));
        (scheduler, queue, broker)
    }

    fn inbound(channel: &str, mentions_bot: bool) -> InboundMessage {
        InboundMessage {
            id: "m1".to_string(),
            author_id: "u1".to_string(),
            author_is_bot: false,
            author_name: "User".to_string(),
            content: "hey".to_string(),
            channel_id: channel.to_string(),
            guild_id: None,
            is_dm: false,
            mentions: Vec::new(),
            mentions_bot,
            reference: None,
            attachments: Vec::new(),
            stickers: Vec::new(),
            forwards: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn enabled_flags() -> AutonomyConfig {
        AutonomyConfig {
            enable_autonomous_activity: true,
            watch_channel_ids: vec!["watch1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn snapshot_includes_watchlist_channels() {
        let adapter = FakeAdapter {
            channels: Vec::new(),
            messages: vec![snapshot_message("m1", "watch1")],
        };
        let (scheduler, _, _) = scheduler(enabled_flags(), adapter);
        let snapshot = scheduler.build_snapshot(None).await.unwrap();
        assert_eq!(snapshot.channels.len(), 1);
        assert_eq!(snapshot.channels[0].channel_id, "watch1");
        assert_eq!(snapshot.watch_channels, vec!["watch1".to_string()]);
    }

    #[tokio::test]
    async fn empty_environment_yields_no_snapshot() {
        let adapter = FakeAdapter { channels: Vec::new(), messages: Vec::new() };
        let (scheduler, _, _) = scheduler(enabled_flags(), adapter);
        assert!(scheduler.build_snapshot(None).await.is_none());
    }

    #[tokio::test]
    async fn periodic_pass_enqueues_daily_life_job() {
        let adapter = FakeAdapter {
            channels: Vec::new(),
            messages: vec![snapshot_message("m1", "watch1")],
        };
        let (scheduler, queue, _) = scheduler(enabled_flags(), adapter);
        scheduler.snapshot_and_send().await.unwrap();

        let job = queue.pop(QueueName::Cognition).await.unwrap().unwrap();
        assert_eq!(job.task, "process_daily_life");
        assert_eq!(job.payload["snapshot"]["bot_name"], "elena");
    }

    #[tokio::test]
    async fn immediate_trigger_is_debounced_except_mentions() {
        let adapter = FakeAdapter {
            channels: Vec::new(),
            messages: vec![snapshot_message("m1", "chan1")],
        };
        let (scheduler, queue, _) = scheduler(enabled_flags(), adapter);

        scheduler.trigger_immediate(&inbound("chan1", false), "trusted_user").await.unwrap();
        scheduler.trigger_immediate(&inbound("chan1", false), "trusted_user").await.unwrap();
        // One debounced → exactly one job so far.
        assert!(queue.pop(QueueName::Cognition).await.unwrap().is_some());
        assert!(queue.pop(QueueName::Cognition).await.unwrap().is_none());

        // A direct mention bypasses the debounce.
        scheduler.trigger_immediate(&inbound("chan1", true), "mention").await.unwrap();
        assert!(queue.pop(QueueName::Cognition).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn disabled_activity_never_triggers() {
        let adapter = FakeAdapter {
            channels: Vec::new(),
            messages: vec![snapshot_message("m1", "chan1")],
        };
        let flags = AutonomyConfig::default();
        let (scheduler, queue, _) = scheduler(flags, adapter);
        scheduler.trigger_immediate(&inbound("chan1", true), "mention").await.unwrap();
        assert!(queue.pop(QueueName::Cognition).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prolonged_silence_enqueues_reverie() {
        let adapter = FakeAdapter { channels: Vec::new(), messages: Vec::new() };
        let mut flags = enabled_flags();
        flags.dream_threshold_secs = 7200;
        let (scheduler, queue, _) = scheduler(flags, adapter);

        // Pretend the last activity was three hours ago.
        *scheduler.last_activity.lock().await = Utc::now() - Duration::hours(3);
        scheduler.snapshot_and_send().await.unwrap();

        let job = queue.pop(QueueName::Cognition).await.unwrap().unwrap();
        assert_eq!(job.task, "run_reverie_cycle");
        assert_eq!(job.job_id, "reverie_elena");
    }
}
