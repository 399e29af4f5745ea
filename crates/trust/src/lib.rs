//! Trust/relationship manager: a score-driven state machine over the
//! relational store, with a short-TTL per-process cache.

pub mod stages;
pub mod store;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use stages::{StageTable, TrustEvent, TrustStage};
pub use store::{
    InMemoryRelationshipStore, PgRelationshipStore, Relationship, RelationshipStore,
    TRUST_MAX, TRUST_MIN, TrustDeltaOutcome, TrustError,
};

/// Minimum trust another bot needs with the user before gossip reaches it.
pub const MIN_TRUST_FOR_GOSSIP: i32 = 20;

const CACHE_CAPACITY: usize = 512;
const CACHE_TTL: Duration = Duration::from_secs(60);

/// A relationship enriched with the stage view derived from the score.
#[derive(Debug, Clone)]
pub struct RelationshipView {
    pub relationship: Relationship,
    pub level: u8,
    pub level_label: String,
    /// Stage-derived traits merged with manually unlocked ones.
    pub active_traits: Vec<String>,
}

pub struct TrustManager {
    bot_name: String,
    store: Arc<dyn RelationshipStore>,
    stages: StageTable,
    cache: Mutex<LruCache<String, (Relationship, Instant)>>,
}

impl TrustManager {
    pub fn new(bot_name: impl Into<String>, store: Arc<dyn RelationshipStore>) -> Self {
        Self::with_stages(bot_name, store, StageTable::default())
    }

    /// Character evolution configs may override the stage table.
    pub fn with_stages(
        bot_name: impl Into<String>,
        store: Arc<dyn RelationshipStore>,
        stages: StageTable,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            store,
            stages,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    async fn invalidate(&self, user_id: &str) {
        self.cache.lock().await.pop(user_id);
    }

    /// Current relationship with stage view; auto-creates with defaults and
    /// caches for [`CACHE_TTL`].
    pub async fn get_relationship(&self, user_id: &str) -> Result<RelationshipView, TrustError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some((cached, at)) = cache.get(user_id) {
                if at.elapsed() < CACHE_TTL {
                    return Ok(self.view_of(cached.clone()));
                }
            }
        }

        let relationship = self.store.fetch_or_create(user_id, &self.bot_name).await?;
        self.cache
            .lock()
            .await
            .put(user_id.to_string(), (relationship.clone(), Instant::now()));
        Ok(self.view_of(relationship))
    }

    fn view_of(&self, relationship: Relationship) -> RelationshipView {
        let stage = self.stages.stage_for(relationship.trust_score);
        let mut active_traits = self.stages.active_traits(relationship.trust_score);
        for t in &relationship.unlocked_traits {
            if !active_traits.contains(t) {
                active_traits.push(t.clone());
            }
        }
        RelationshipView {
            level: stage.level,
            level_label: stage.label.clone(),
            active_traits,
            relationship,
        }
    }

    /// Atomically adjust trust by `delta`.  Returns the milestone message
    /// when the change crosses a stage boundary upward.
    pub async fn update_trust(
        &self,
        user_id: &str,
        delta: i32,
    ) -> Result<Option<String>, TrustError> {
        let outcome = self
            .store
            .apply_trust_delta(user_id, &self.bot_name, delta)
            .await?;
        self.invalidate(user_id).await;

        info!(
            user_id,
            bot = %self.bot_name,
            old = outcome.old_score,
            new = outcome.new_score,
            delta,
            "trust_update"
        );

        let milestone = self
            .stages
            .check_milestone(outcome.old_score, outcome.new_score);
        if milestone.is_some() {
            self.store
                .set_last_milestone(user_id, &self.bot_name, Utc::now())
                .await?;
            self.invalidate(user_id).await;
        }
        Ok(milestone)
    }

    /// Apply a trust event from the unified delta table.  Positive events
    /// are suppressed while the user is in a moderation timeout.
    pub async fn apply_event(
        &self,
        user_id: &str,
        event: TrustEvent,
        moderation_timeout_active: bool,
    ) -> Result<Option<String>, TrustError> {
        if moderation_timeout_active && event.is_positive() {
            debug!(user_id, ?event, "positive trust delta blocked by moderation timeout");
            return Ok(None);
        }
        self.update_trust(user_id, event.delta()).await
    }

    pub async fn unlock_trait(&self, user_id: &str, trait_name: &str) -> Result<(), TrustError> {
        self.store
            .unlock_trait(user_id, &self.bot_name, trait_name)
            .await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    pub async fn update_preference(
        &self,
        user_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), TrustError> {
        self.store
            .set_preference(user_id, &self.bot_name, key, value)
            .await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    pub async fn delete_preference(&self, user_id: &str, key: &str) -> Result<(), TrustError> {
        self.store
            .delete_preference(user_id, &self.bot_name, key)
            .await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    pub async fn add_insight(&self, user_id: &str, insight: &str) -> Result<(), TrustError> {
        self.store
            .add_insight(user_id, &self.bot_name, insight)
            .await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    /// Admin affordance: reset the relationship to defaults.
    pub async fn clear(&self, user_id: &str) -> Result<(), TrustError> {
        self.store.clear(user_id, &self.bot_name).await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    /// Timestamp of the last interaction; drives reverie scheduling.
    pub async fn get_last_interaction(
        &self,
        user_id: &str,
    ) -> Result<Option<DateTime<Utc>>, TrustError> {
        self.store.last_interaction(user_id, &self.bot_name).await
    }

    /// The user's preferred nickname, when one has been extracted.
    pub async fn preferred_nickname(&self, user_id: &str) -> Option<String> {
        self.get_relationship(user_id)
            .await
            .ok()?
            .relationship
            .preferences
            .get("nickname")
            .and_then(|v| v.as_str().map(str::to_string))
    }
}
