//! Process-wide runtime context: every client and manager the bot process
//! needs, built once at startup and passed explicitly to constructors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Mutex;
use tracing::info;

use whisperengine_autonomy::ActivityMonitor;
use whisperengine_config::{AppConfig, CharacterProfile};
use whisperengine_embedding::{Embedder, HashEmbedder, HttpEmbedder};
use whisperengine_llm::{ChatProvider, OpenAiCompatClient};
use whisperengine_memory::{
    BotSelfMemory, InMemoryIndex, MemoryStore, QdrantIndex, SessionManager,
};
use whisperengine_messaging::{CrosspostDetector, IngressPolicy};
use whisperengine_queue::{
    ArtifactRegistry, Broker, InMemoryBroker, KeyLayout, RedisBroker, TaskQueue,
};
use whisperengine_trust::{
    InMemoryRelationshipStore, PgRelationshipStore, RelationshipStore, TrustManager,
};
use whisperengine_universe::{ShareWithConsent, UniverseBus, UniverseMetrics};

use crate::moderation::TimeoutManager;
use crate::quota::{InMemoryQuotaStore, PgQuotaStore, QuotaManager};

/// Creates bot-scoped memory stores on demand.  Gossip dispatch uses this to
/// write into *recipient* collections; each bot still gets its own physical
/// collection.
#[async_trait]
pub trait BotMemoryFactory: Send + Sync {
    async fn store_for(&self, bot_name: &str) -> Result<Arc<MemoryStore>>;
}

pub struct QdrantMemoryFactory {
    vector_url: String,
    embedder: Arc<dyn Embedder>,
    confidence_threshold: f32,
    cache: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl QdrantMemoryFactory {
    pub fn new(
        vector_url: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            vector_url: vector_url.into(),
            embedder,
            confidence_threshold,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BotMemoryFactory for QdrantMemoryFactory {
    async fn store_for(&self, bot_name: &str) -> Result<Arc<MemoryStore>> {
        let mut cache = self.cache.lock().await;
        if let Some(store) = cache.get(bot_name) {
            return Ok(store.clone());
        }
        let collection = format!("whisperengine_memory_{bot_name}");
        let index = QdrantIndex::connect(&self.vector_url, collection)?;
        let store = Arc::new(MemoryStore::new(
            bot_name,
            Arc::new(index),
            self.embedder.clone(),
            self.confidence_threshold,
        ));
        store.ensure_collection().await?;
        cache.insert(bot_name.to_string(), store.clone());
        Ok(store)
    }
}

/// In-process factory: one in-memory collection per bot.  Tests use this to
/// observe cross-bot gossip landing in the right collection.
#[derive(Default)]
pub struct InMemoryBotFactory {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

#[async_trait]
impl BotMemoryFactory for InMemoryBotFactory {
    async fn store_for(&self, bot_name: &str) -> Result<Arc<MemoryStore>> {
        let mut stores = self.stores.lock().await;
        Ok(stores
            .entry(bot_name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryStore::new(
                    bot_name,
                    Arc::new(InMemoryIndex::new(format!("whisperengine_memory_{bot_name}"))),
                    Arc::new(HashEmbedder),
                    0.7,
                ))
            })
            .clone())
    }
}

pub struct RuntimeContext {
    pub config: AppConfig,
    pub character: CharacterProfile,
    pub memory: Arc<MemoryStore>,
    pub self_memory: Arc<BotSelfMemory>,
    pub trust: Arc<TrustManager>,
    pub relationship_store: Arc<dyn RelationshipStore>,
    pub queue: Arc<TaskQueue>,
    pub broker: Arc<dyn Broker>,
    pub keys: KeyLayout,
    pub llm: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub sessions: Arc<SessionManager>,
    pub artifacts: Arc<ArtifactRegistry>,
    pub universe: Arc<UniverseBus>,
    pub universe_metrics: Arc<UniverseMetrics>,
    pub moderation: Arc<TimeoutManager>,
    pub quota: Arc<QuotaManager>,
    pub memory_factory: Arc<dyn BotMemoryFactory>,
    pub crosspost: Arc<CrosspostDetector>,
    pub ingress: IngressPolicy,
    pub activity: Arc<ActivityMonitor>,
}

impl RuntimeContext {
    /// Production wiring: Qdrant, Redis, Postgres, HTTP embedding and LLM
    /// backends.  Fails fast when configuration is invalid.
    pub async fn initialize(config: AppConfig, character: CharacterProfile) -> Result<Arc<Self>> {
        config.validate()?;
        let bot_name = config.bot.name.clone();

        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
            config.embedding.base_url.clone(),
            config.embedding.model_name.clone(),
        ));

        let llm: Arc<dyn ChatProvider> = Arc::new(OpenAiCompatClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            Duration::from_secs(config.llm.request_timeout_secs),
        ));

        let index = QdrantIndex::connect(&config.vector.url(), config.memory_collection())
            .context("connecting to vector engine")?;
        let memory = Arc::new(MemoryStore::new(
            &bot_name,
            Arc::new(index),
            embedder.clone(),
            config.emotion.roberta_confidence_threshold,
        ));
        memory.ensure_collection().await?;

        let broker: Arc<dyn Broker> = Arc::new(
            RedisBroker::connect(&config.broker.url)
                .await
                .context("connecting to broker")?,
        );
        let queue = Arc::new(TaskQueue::new(broker.clone()));
        let keys = KeyLayout::new(config.bot.redis_key_prefix.clone());

        let pool = PgPoolOptions::new()
            .max_connections(config.sql.max_connections)
            .connect(&config.sql.url)
            .await
            .context("connecting to relational store")?;
        let pg_store = PgRelationshipStore::new(pool.clone());
        pg_store.ensure_schema().await?;
        let relationship_store: Arc<dyn RelationshipStore> = Arc::new(pg_store);
        let trust = Arc::new(TrustManager::new(&bot_name, relationship_store.clone()));

        let quota_store = PgQuotaStore::new(pool);
        quota_store.ensure_schema().await?;
        let quota = Arc::new(QuotaManager::new(
            Box::new(quota_store),
            config.quota.daily_image_quota,
            config.quota.daily_audio_quota,
        ));

        let universe_metrics = Arc::new(UniverseMetrics::default());
        let universe = Arc::new(UniverseBus::new(
            config.universe.enable_universe_events,
            queue.clone(),
            Arc::new(ShareWithConsent),
            universe_metrics.clone(),
        ));

        let memory_factory = Arc::new(QdrantMemoryFactory::new(
            config.vector.url(),
            embedder.clone(),
            config.emotion.roberta_confidence_threshold,
        ));

        info!(bot = %bot_name, collection = %config.memory_collection(), "runtime context initialized");
        Ok(Arc::new(Self::assemble(
            config,
            character,
            memory,
            trust,
            relationship_store,
            queue,
            broker,
            keys,
            llm,
            embedder,
            universe,
            universe_metrics,
            quota,
            memory_factory,
        )))
    }

    /// Fully in-process wiring: in-memory index, broker, relationship store,
    /// and quota counters.  Used by tests and offline runs; `llm` is still
    /// injected so callers control generation.
    pub fn in_memory(
        config: AppConfig,
        character: CharacterProfile,
        llm: Arc<dyn ChatProvider>,
    ) -> Arc<Self> {
        let bot_name = config.bot.name.clone();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder);

        let memory = Arc::new(MemoryStore::new(
            &bot_name,
            Arc::new(InMemoryIndex::new(config.memory_collection())),
            embedder.clone(),
            config.emotion.roberta_confidence_threshold,
        ));

        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let queue = Arc::new(TaskQueue::new(broker.clone()));
        let keys = KeyLayout::new(config.bot.redis_key_prefix.clone());

        let relationship_store: Arc<dyn RelationshipStore> =
            Arc::new(InMemoryRelationshipStore::new());
        let trust = Arc::new(TrustManager::new(&bot_name, relationship_store.clone()));

        let quota = Arc::new(QuotaManager::new(
            Box::new(InMemoryQuotaStore::default()),
            config.quota.daily_image_quota,
            config.quota.daily_audio_quota,
        ));

        let universe_metrics = Arc::new(UniverseMetrics::default());
        let universe = Arc::new(UniverseBus::new(
            config.universe.enable_universe_events,
            queue.clone(),
            Arc::new(ShareWithConsent),
            universe_metrics.clone(),
        ));

        Arc::new(Self::assemble(
            config,
            character,
            memory,
            trust,
            relationship_store,
            queue,
            broker,
            keys,
            llm,
            embedder,
            universe,
            universe_metrics,
            quota,
            Arc::new(InMemoryBotFactory::default()),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: AppConfig,
        character: CharacterProfile,
        memory: Arc<MemoryStore>,
        trust: Arc<TrustManager>,
        relationship_store: Arc<dyn RelationshipStore>,
        queue: Arc<TaskQueue>,
        broker: Arc<dyn Broker>,
        keys: KeyLayout,
        llm: Arc<dyn ChatProvider>,
        embedder: Arc<dyn Embedder>,
        universe: Arc<UniverseBus>,
        universe_metrics: Arc<UniverseMetrics>,
        quota: Arc<QuotaManager>,
        memory_factory: Arc<dyn BotMemoryFactory>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(config.session.timeout_minutes));
        let artifacts = Arc::new(ArtifactRegistry::new(broker.clone(), keys.clone()));
        let ingress = IngressPolicy {
            enable_dm_block: config.privacy.enable_dm_block,
            dm_allowed_user_ids: config.privacy.dm_allowed_user_ids.clone(),
            blocked_user_ids: config.privacy.blocked_user_ids.clone(),
        };
        let self_memory = Arc::new(BotSelfMemory::new(memory.clone()));

        Self {
            sessions,
            artifacts,
            ingress,
            self_memory,
            moderation: Arc::new(TimeoutManager::new()),
            crosspost: Arc::new(CrosspostDetector::new()),
            activity: Arc::new(ActivityMonitor::new(15)),
            config,
            character,
            memory,
            trust,
            relationship_store,
            queue,
            broker,
            keys,
            llm,
            embedder,
            universe,
            universe_metrics,
            quota,
            memory_factory,
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.config.bot.name
    }
}
