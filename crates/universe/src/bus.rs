//! The universe event bus: publication gatekeeping and gossip construction.
//!
//! Publication never touches other bots directly; it enqueues a
//! `run_gossip_dispatch` job and the worker writes gossip memories into the
//! recipients' collections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use whisperengine_memory::{MemoryEntry, MemoryRole, MemoryType};
use whisperengine_queue::{QueueName, TaskQueue};

use crate::event::{MAX_PROPAGATION_DEPTH, UniverseEvent};

/// Why a publication attempt did not go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { job_id: String },
    Disabled,
    Blocked { reason: &'static str },
}

/// User-level opt-out hook.  The default policy shares for everyone; the
/// runtime wires the persisted privacy settings in.
pub trait SharingPolicy: Send + Sync {
    fn allows_sharing(&self, user_id: &str) -> bool;
}

pub struct ShareWithConsent;

impl SharingPolicy for ShareWithConsent {
    fn allows_sharing(&self, _user_id: &str) -> bool {
        true
    }
}

/// Counters for blocked/published events, keyed by reason/type.  Exposed for
/// diagnostics and asserted on in tests.
#[derive(Default)]
pub struct UniverseMetrics {
    blocked: Mutex<HashMap<String, u64>>,
    published: Mutex<u64>,
}

impl UniverseMetrics {
    pub async fn record_blocked(&self, reason: &str) {
        let mut blocked = self.blocked.lock().await;
        *blocked.entry(reason.to_string()).or_default() += 1;
        info!(reason, "universe_event_blocked");
    }

    pub async fn blocked_count(&self, reason: &str) -> u64 {
        self.blocked.lock().await.get(reason).copied().unwrap_or(0)
    }

    pub async fn record_published(&self) {
        *self.published.lock().await += 1;
    }

    pub async fn published_count(&self) -> u64 {
        *self.published.lock().await
    }
}

pub struct UniverseBus {
    enabled: bool,
    queue: Arc<TaskQueue>,
    policy: Arc<dyn SharingPolicy>,
    metrics: Arc<UniverseMetrics>,
}

impl UniverseBus {
    pub fn new(
        enabled: bool,
        queue: Arc<TaskQueue>,
        policy: Arc<dyn SharingPolicy>,
        metrics: Arc<UniverseMetrics>,
    ) -> Self {
        Self {
            enabled,
            queue,
            policy,
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<UniverseMetrics> {
        self.metrics.clone()
    }

    /// Gate and enqueue an event for worker-side gossip dispatch.
    pub async fn publish(&self, event: UniverseEvent) -> PublishOutcome {
        if !self.enabled {
            debug!("universe events disabled; publish skipped");
            return PublishOutcome::Disabled;
        }

        if event.propagation_depth > MAX_PROPAGATION_DEPTH {
            warn!(depth = event.propagation_depth, "event blocked by propagation depth");
            self.metrics.record_blocked("propagation_depth").await;
            return PublishOutcome::Blocked { reason: "propagation_depth" };
        }

        if event.is_sensitive() {
            // Silent drop: the user is never notified.
            self.metrics.record_blocked("sensitive_topic").await;
            return PublishOutcome::Blocked { reason: "sensitive_topic" };
        }

        if !self.policy.allows_sharing(&event.user_id) {
            self.metrics.record_blocked("user_opt_out").await;
            return PublishOutcome::Blocked { reason: "user_opt_out" };
        }

        let job_id = event.job_id();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "event serialization failed");
                return PublishOutcome::Blocked { reason: "serialization" };
            }
        };

        match self
            .queue
            .enqueue(
                "run_gossip_dispatch",
                QueueName::Social,
                Some(job_id.clone()),
                None,
                payload,
            )
            .await
        {
            Ok(Some(id)) => {
                self.metrics.record_published().await;
                info!(
                    event_type = event.event_type.as_str(),
                    user_id = %event.user_id,
                    "universe event published"
                );
                PublishOutcome::Published { job_id: id }
            }
            Ok(None) => {
                debug!(job_id, "gossip already pending for this event key");
                PublishOutcome::Blocked { reason: "duplicate" }
            }
            Err(err) => {
                warn!(%err, "gossip enqueue failed");
                PublishOutcome::Blocked { reason: "broker_unavailable" }
            }
        }
    }
}

/// Build the gossip memory injected into one recipient bot's collection.
/// The entry carries the privacy-safe summary only, and its propagation
/// depth marks it so the detector can never re-fire from it.
pub fn gossip_entry(event: &UniverseEvent, recipient_bot: &str) -> MemoryEntry {
    let content = format!(
        "{} mentioned that this user {}",
        event.source_bot, event.summary
    );
    let mut entry = MemoryEntry::new(&event.user_id, recipient_bot, MemoryRole::System, content);
    entry.memory_type = MemoryType::Gossip;
    entry.propagation_depth = Some(event.propagation_depth + 1);
    entry
        .metadata
        .insert("source_bot".to_string(), serde_json::json!(event.source_bot));
    entry.metadata.insert(
        "event_type".to_string(),
        serde_json::json!(event.event_type.as_str()),
    );
    entry
        .metadata
        .insert("topic".to_string(), serde_json::json!(event.topic));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use whisperengine_queue::InMemoryBroker;

    fn bus(enabled: bool) -> (UniverseBus, Arc<TaskQueue>) {
        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryBroker::new())));
        let bus = UniverseBus::new(
            enabled,
            queue.clone(),
            Arc::new(ShareWithConsent),
            Arc::new(UniverseMetrics::default()),
        );
        (bus, queue)
    }

    fn event(topic: &str) -> UniverseEvent {
        UniverseEvent::new(EventType::UserUpdate, "u1", "elena", "has news", topic)
    }

    #[tokio::test]
    async fn publishable_event_lands_on_social_queue() {
        let (bus, queue) = bus(true);
        let outcome = bus.publish(event("career")).await;
        assert!(matches!(outcome, PublishOutcome::Published { .. }));

        let job = queue.pop(QueueName::Social).await.unwrap().unwrap();
        assert_eq!(job.task, "run_gossip_dispatch");
        assert_eq!(job.payload["topic"], "career");
    }

    #[tokio::test]
    async fn disabled_bus_publishes_nothing() {
        let (bus, queue) = bus(false);
        assert_eq!(bus.publish(event("career")).await, PublishOutcome::Disabled);
        assert!(queue.pop(QueueName::Social).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sensitive_topic_is_blocked_with_metric() {
        let (bus, queue) = bus(true);
        let metrics = bus.metrics();
        assert_eq!(metrics.blocked_count("sensitive_topic").await, 0);

        let outcome = bus.publish(event("health")).await;
        assert_eq!(outcome, PublishOutcome::Blocked { reason: "sensitive_topic" });
        assert_eq!(metrics.blocked_count("sensitive_topic").await, 1);
        assert!(queue.pop(QueueName::Social).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deep_propagation_is_blocked() {
        let (bus, queue) = bus(true);
        let mut deep = event("career");
        deep.propagation_depth = 2;
        let outcome = bus.publish(deep).await;
        assert_eq!(outcome, PublishOutcome::Blocked { reason: "propagation_depth" });
        assert!(queue.pop(QueueName::Social).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn opted_out_user_is_blocked() {
        struct NoSharing;
        impl SharingPolicy for NoSharing {
            fn allows_sharing(&self, _user: &str) -> bool {
                false
            }
        }

        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryBroker::new())));
        let bus = UniverseBus::new(
            true,
            queue.clone(),
            Arc::new(NoSharing),
            Arc::new(UniverseMetrics::default()),
        );
        let outcome = bus.publish(event("career")).await;
        assert_eq!(outcome, PublishOutcome::Blocked { reason: "user_opt_out" });
    }

    #[tokio::test]
    async fn duplicate_event_key_is_deduplicated() {
        let (bus, _queue) = bus(true);
        assert!(matches!(
            bus.publish(event("career")).await,
            PublishOutcome::Published { .. }
        ));
        assert_eq!(
            bus.publish(event("career")).await,
            PublishOutcome::Blocked { reason: "duplicate" }
        );
    }

    #[test]
    fn gossip_entry_marks_propagation_and_type() {
        let entry = gossip_entry(&event("career"), "marcus");
        assert_eq!(entry.bot_name, "marcus");
        assert_eq!(entry.memory_type, MemoryType::Gossip);
        assert_eq!(entry.propagation_depth, Some(1));
        assert!(entry.content.contains("elena"));
        assert_eq!(entry.user_id, "u1");
    }
}
