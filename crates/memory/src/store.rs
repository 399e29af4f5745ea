//! The bot-scoped memory store: embeds every stored turn into seven named
//! vectors, derives emotion and significance metadata, and serves the
//! retrieval surface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use whisperengine_embedding::Embedder;

use crate::emotion::{EmotionTracker, resolve_emotion};
use crate::index::{
    HealthStatus, MemoryError, MemoryPoint, ScoredMemory, SearchQuery, VectorIndex,
};
use crate::retrieval::{
    FidelityOptions, OVERFETCH_FACTOR, graduated_filter, rank_hits, route_query,
};
use crate::schema::{
    EmotionHint, MemoryEntry, MemoryRole, MemoryType, NamedVector, RetrievedMemory, SearchType,
    SignificanceTier,
};
use crate::semantic::{GENERAL_KEY, extract_semantic_key};
use crate::significance::{SignificanceInputs, candidate_entities, score_significance};

/// Extra payload callers may attach to a stored conversation turn.
#[derive(Debug, Clone, Default)]
pub struct ConversationMetadata {
    pub session_id: Option<String>,
    pub message_id: Option<String>,
    pub author_id: Option<String>,
    pub author_is_bot: bool,
    pub author_name: Option<String>,
    pub reply_to_msg_id: Option<String>,
    pub user_name: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LastInteraction {
    pub timestamp: DateTime<Utc>,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
}

pub struct MemoryStore {
    bot_name: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    emotion_tracker: Mutex<EmotionTracker>,
    /// Per-user entities already seen, for the novelty significance factor.
    seen_entities: Mutex<HashMap<String, HashSet<String>>>,
    emotion_confidence_threshold: f32,
}

impl MemoryStore {
    pub fn new(
        bot_name: impl Into<String>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        emotion_confidence_threshold: f32,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            index,
            embedder,
            emotion_tracker: Mutex::new(EmotionTracker::default()),
            seen_entities: Mutex::new(HashMap::new()),
            emotion_confidence_threshold,
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub async fn ensure_collection(&self) -> Result<(), MemoryError> {
        self.index.ensure_collection().await
    }

    // ── store path ─────────────────────────────────────────────────────────

    /// Store one conversation exchange as two entries (user turn, bot turn)
    /// with shared derived metadata.  Writes happen in that order.
    pub async fn store_conversation(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        channel_id: Option<&str>,
        pre_analyzed_emotion: Option<EmotionHint>,
        metadata: Option<ConversationMetadata>,
    ) -> Result<(), MemoryError> {
        let meta = metadata.unwrap_or_default();

        let user_entry = self
            .build_entry(
                user_id,
                MemoryRole::User,
                user_message,
                channel_id,
                pre_analyzed_emotion.as_ref(),
                &meta,
            )
            .await;
        let user_point = self.embed_entry(user_entry).await?;
        self.index.upsert(vec![user_point]).await?;

        // The bot turn inherits the session but is classified on its own
        // text; the user's emotion hint does not apply to it.
        let mut bot_meta = meta.clone();
        bot_meta.author_id = Some(self.bot_name.clone());
        bot_meta.author_is_bot = true;
        bot_meta.author_name = Some(self.bot_name.clone());
        bot_meta.reply_to_msg_id = meta.message_id.clone();
        bot_meta.message_id = None;

        let bot_entry = self
            .build_entry(user_id, MemoryRole::Bot, bot_response, channel_id, None, &bot_meta)
            .await;
        let bot_point = self.embed_entry(bot_entry).await?;
        self.index.upsert(vec![bot_point]).await?;

        Ok(())
    }

    /// Store a single pre-built entry (gossip injection, summaries, facts,
    /// self-memory).  The entry is embedded into all seven facets.
    pub async fn store_entry(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        let point = self.embed_entry(entry).await?;
        self.index.upsert(vec![point]).await
    }

    /// Store one turn with full metadata derivation.  Used by the action
    /// poller, where incoming and outgoing messages arrive independently.
    pub async fn store_turn(
        &self,
        user_id: &str,
        role: MemoryRole,
        content: &str,
        channel_id: Option<&str>,
        metadata: Option<ConversationMetadata>,
    ) -> Result<(), MemoryError> {
        let meta = metadata.unwrap_or_default();
        let entry = self
            .build_entry(user_id, role, content, channel_id, None, &meta)
            .await;
        let point = self.embed_entry(entry).await?;
        self.index.upsert(vec![point]).await
    }

    async fn build_entry(
        &self,
        user_id: &str,
        role: MemoryRole,
        content: &str,
        channel_id: Option<&str>,
        emotion_hint: Option<&EmotionHint>,
        meta: &ConversationMetadata,
    ) -> MemoryEntry {
        let reading = resolve_emotion(content, emotion_hint, self.emotion_confidence_threshold);

        let emotion = {
            let mut tracker = self.emotion_tracker.lock().await;
            tracker.observe(user_id, reading.clone())
        };

        let has_novel_entity = {
            let mut seen = self.seen_entities.lock().await;
            let user_seen = seen.entry(user_id.to_string()).or_default();
            let mut novel = false;
            for entity in candidate_entities(content) {
                if user_seen.insert(entity) {
                    novel = true;
                }
            }
            novel
        };

        let references_user_name = meta
            .user_name
            .as_deref()
            .map(|name| !name.is_empty() && content.to_lowercase().contains(&name.to_lowercase()))
            .unwrap_or(false);

        let significance = score_significance(SignificanceInputs {
            content,
            emotional_intensity: reading.intensity,
            has_novel_entity,
            references_user_name,
        });

        let mut entry = MemoryEntry::new(user_id, &self.bot_name, role, content);
        entry.semantic_key = extract_semantic_key(content);
        entry.channel_id = channel_id.map(str::to_string);
        entry.session_id = meta.session_id.clone();
        entry.message_id = meta.message_id.clone();
        entry.author_id = meta.author_id.clone();
        entry.author_is_bot = meta.author_is_bot;
        entry.author_name = meta.author_name.clone();
        entry.reply_to_msg_id = meta.reply_to_msg_id.clone();
        entry.emotion = emotion;
        entry.significance = significance;
        entry.metadata = meta.extra.clone();
        entry
    }

    /// Embed an entry into its seven named vectors.  Emotion and semantic
    /// facets get contextualized views of the content; the remaining facets
    /// reuse the content vector as the benign fallback.
    async fn embed_entry(&self, entry: MemoryEntry) -> Result<MemoryPoint, MemoryError> {
        let content_vec = self.embedder.embed_one(&entry.content).await?;

        let mut vectors: HashMap<NamedVector, Vec<f32>> = HashMap::new();

        let emotion_vec = if entry.emotion.primary_emotion != "neutral" {
            self.embedder
                .embed_one(&format!("{} {}", entry.emotion.primary_emotion, entry.content))
                .await?
        } else {
            content_vec.clone()
        };

        let semantic_vec = if entry.semantic_key != GENERAL_KEY {
            self.embedder
                .embed_one(&format!("{} {}", entry.semantic_key, entry.content))
                .await?
        } else {
            content_vec.clone()
        };

        vectors.insert(NamedVector::Emotion, emotion_vec);
        vectors.insert(NamedVector::Semantic, semantic_vec);
        for facet in [
            NamedVector::Relationship,
            NamedVector::Personality,
            NamedVector::Interaction,
            NamedVector::Temporal,
        ] {
            vectors.insert(facet, content_vec.clone());
        }
        vectors.insert(NamedVector::Content, content_vec);

        Ok(MemoryPoint { entry, vectors })
    }

    // ── retrieval surface ──────────────────────────────────────────────────

    /// Single-vector semantic recall over the content facet.  Failures are
    /// logged and degrade to an empty list — this is a hot-path call.
    pub async fn retrieve_relevant_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<RetrievedMemory> {
        let result: Result<Vec<RetrievedMemory>, MemoryError> = async {
            let vector = self.embedder.embed_one(query).await?;
            let hits = self
                .index
                .search(&SearchQuery {
                    memory_types: Some(vec![MemoryType::Conversation]),
                    ..SearchQuery::new(user_id, vector, limit)
                })
                .await?;
            Ok(hits
                .into_iter()
                .map(|hit| to_retrieved(hit, SearchType::Content, "content_default", true))
                .collect())
        }
        .await;

        result.unwrap_or_else(|err| {
            warn!(%err, user_id, "memory retrieval failed; returning empty");
            Vec::new()
        })
    }

    /// Emotion/semantic-aware recall routed per the query's classification.
    pub async fn retrieve_context_aware_memories(
        &self,
        user_id: &str,
        query: &str,
        max_memories: usize,
        emotion_hint: Option<EmotionHint>,
    ) -> Vec<RetrievedMemory> {
        let route = route_query(query, emotion_hint.as_ref(), self.emotion_confidence_threshold);

        let routed_text = match (&route.emotion_label, &route.semantic_key) {
            (Some(label), _) => format!("{label} {query}"),
            (None, Some(key)) => format!("{key} {query}"),
            _ => query.to_string(),
        };

        let result: Result<Vec<RetrievedMemory>, MemoryError> = async {
            let vector = self.embedder.embed_one(&routed_text).await?;
            let hits = self
                .index
                .search(&SearchQuery {
                    vector_name: route.vector,
                    memory_types: Some(vec![MemoryType::Conversation]),
                    ..SearchQuery::new(user_id, vector, max_memories)
                })
                .await?;
            Ok(hits
                .into_iter()
                .map(|hit| to_retrieved(hit, route.search_type, &route.emotion_source, true))
                .collect())
        }
        .await;

        result.unwrap_or_else(|err| {
            warn!(%err, user_id, "context-aware retrieval failed; returning empty");
            Vec::new()
        })
    }

    /// The fidelity-first pipeline: routed over-fetch, intelligent
    /// re-ranking, graduated filtering, character-nuance preservation.
    pub async fn retrieve_relevant_memories_fidelity_first(
        &self,
        user_id: &str,
        query: &str,
        options: FidelityOptions,
    ) -> Vec<RetrievedMemory> {
        let route = route_query(
            query,
            options.emotion_hint.as_ref(),
            self.emotion_confidence_threshold,
        );

        let routed_text = match (&route.emotion_label, &route.semantic_key) {
            (Some(label), _) => format!("{label} {query}"),
            (None, Some(key)) => format!("{key} {query}"),
            _ => query.to_string(),
        };

        let result: Result<Vec<RetrievedMemory>, MemoryError> = async {
            let vector = self.embedder.embed_one(&routed_text).await?;

            let hits = self
                .index
                .search(&SearchQuery {
                    vector_name: route.vector,
                    memory_types: Some(vec![MemoryType::Conversation]),
                    with_personality_alignment: options.intelligent_ranking,
                    ..SearchQuery::new(user_id, vector.clone(), options.limit * OVERFETCH_FACTOR)
                })
                .await?;

            let ranked = rank_hits(
                hits,
                route.emotion_label.as_deref(),
                Utc::now(),
                options.intelligent_ranking,
            );

            let mut results: Vec<RetrievedMemory> = ranked
                .into_iter()
                .take(options.limit)
                .map(|(hit, combined)| {
                    let personality = hit.personality_alignment;
                    let mut retrieved = to_retrieved(
                        hit,
                        SearchType::FidelityFirst,
                        &route.emotion_source,
                        true,
                    );
                    retrieved.score = combined;
                    retrieved.character_relevance = personality;
                    retrieved
                })
                .collect();

            if options.preserve_character_nuance {
                self.preserve_defining(
                    user_id,
                    &vector,
                    &route.emotion_source,
                    options.limit,
                    &mut results,
                )
                .await;
            }

            if options.graduated_filtering {
                if let Some(budget) = options.context_char_budget {
                    graduated_filter(&mut results, budget);
                }
            }

            Ok(results)
        }
        .await;

        result.unwrap_or_else(|err| {
            warn!(%err, user_id, "fidelity-first retrieval failed; returning empty");
            Vec::new()
        })
    }

    /// Guarantee at least one defining-tier memory in `results` when the
    /// user's store holds any, even if its primary score missed the cutoff.
    async fn preserve_defining(
        &self,
        user_id: &str,
        query_vector: &[f32],
        emotion_source: &str,
        limit: usize,
        results: &mut Vec<RetrievedMemory>,
    ) {
        let already_defining = results
            .iter()
            .any(|r| r.entry.significance.significance_tier == SignificanceTier::Defining);
        if already_defining {
            return;
        }

        let defining = self
            .index
            .search(&SearchQuery {
                significance_tier: Some(SignificanceTier::Defining),
                memory_types: Some(vec![MemoryType::Conversation]),
                ..SearchQuery::new(user_id, query_vector.to_vec(), 1)
            })
            .await;

        match defining {
            Ok(hits) => {
                if let Some(hit) = hits.into_iter().next() {
                    debug!(user_id, "injecting defining memory for nuance preservation");
                    if results.len() >= limit {
                        // Replace the weakest result rather than exceeding limit.
                        results.pop();
                    }
                    results.push(to_retrieved(
                        hit,
                        SearchType::FidelityFirst,
                        emotion_source,
                        true,
                    ));
                }
            }
            Err(err) => warn!(%err, "defining-tier lookup failed"),
        }
    }

    /// Time-ordered history, both roles, most recent last.
    pub async fn get_conversation_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Vec<MemoryEntry> {
        match self
            .index
            .fetch_recent(user_id, Some(vec![MemoryType::Conversation]), limit)
            .await
        {
            Ok(mut entries) => {
                entries.reverse();
                entries
            }
            Err(err) => {
                warn!(%err, user_id, "history fetch failed; returning empty");
                Vec::new()
            }
        }
    }

    pub async fn get_last_interaction_info(&self, user_id: &str) -> Option<LastInteraction> {
        match self
            .index
            .fetch_recent(user_id, Some(vec![MemoryType::Conversation]), 1)
            .await
        {
            Ok(entries) => entries.into_iter().next().map(|e| LastInteraction {
                timestamp: e.timestamp,
                channel_id: e.channel_id,
                message_id: e.message_id,
            }),
            Err(err) => {
                warn!(%err, user_id, "last-interaction fetch failed");
                None
            }
        }
    }

    /// Type-filtered search with recency/significance-aware rescoring.
    pub async fn search_memories_with_qdrant_intelligence(
        &self,
        user_id: &str,
        query: &str,
        memory_types: Option<Vec<MemoryType>>,
        limit: usize,
    ) -> Vec<RetrievedMemory> {
        let result: Result<Vec<RetrievedMemory>, MemoryError> = async {
            let vector = self.embedder.embed_one(query).await?;
            let hits = self
                .index
                .search(&SearchQuery {
                    memory_types,
                    ..SearchQuery::new(user_id, vector, limit * 2)
                })
                .await?;

            let ranked = rank_hits(hits, None, Utc::now(), true);
            Ok(ranked
                .into_iter()
                .take(limit)
                .map(|(hit, combined)| {
                    let mut r =
                        to_retrieved(hit, SearchType::Content, "content_default", true);
                    r.score = combined;
                    r
                })
                .collect())
        }
        .await;

        result.unwrap_or_else(|err| {
            warn!(%err, user_id, "intelligent search failed; returning empty");
            Vec::new()
        })
    }

    pub async fn count_messages_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> usize {
        self.index
            .count_since(user_id, since)
            .await
            .unwrap_or_else(|err| {
                warn!(%err, user_id, "count_since failed");
                0
            })
    }

    /// Extractive summary of a conversation transcript: centrality-scored
    /// sentences with cosine dedup, plus detected themes and emotions.
    pub async fn get_conversation_summary_with_recommendations(
        &self,
        user_id: &str,
        conversation_history: &[String],
        limit: usize,
    ) -> crate::summary::ConversationSummary {
        let summary =
            crate::summary::summarize_conversation(self.embedder.as_ref(), conversation_history, limit)
                .await;
        debug!(
            user_id,
            sentences = summary.sentences_analyzed,
            themes = summary.conversation_themes.len(),
            "conversation summarized"
        );
        summary
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embedder.embed_one(text).await?)
    }

    pub async fn health_check(&self) -> Result<HealthStatus, MemoryError> {
        self.index.health().await
    }
}

fn to_retrieved(
    hit: ScoredMemory,
    search_type: SearchType,
    emotion_source: &str,
    fidelity_preserved: bool,
) -> RetrievedMemory {
    RetrievedMemory {
        personality_alignment: hit.personality_alignment,
        entry: hit.entry,
        score: hit.score,
        search_type,
        emotion_source: emotion_source.to_string(),
        fidelity_preserved,
        character_relevance: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use uuid::Uuid;
    use whisperengine_embedding::{HashEmbedder, is_normalized};

    fn store_for(bot: &str) -> MemoryStore {
        MemoryStore::new(
            bot,
            Arc::new(InMemoryIndex::new(format!("whisperengine_memory_{bot}"))),
            Arc::new(HashEmbedder),
            0.7,
        )
    }

    #[tokio::test]
    async fn store_writes_user_and_bot_turns() {
        let store = store_for("elena");
        store
            .store_conversation("u1", "hello there", "hi! lovely to meet you", None, None, None)
            .await
            .unwrap();

        let history = store.get_conversation_history("u1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MemoryRole::User);
        assert_eq!(history[1].role, MemoryRole::Bot);
        assert!(history[1].author_is_bot);
    }

    #[tokio::test]
    async fn stored_turn_round_trips_to_rank_one() {
        let store = store_for("elena");
        store
            .store_conversation(
                "u1",
                "my thesis defense is next week and I am terrified",
                "you have prepared so well",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        store
            .store_conversation("u1", "what should we have for dinner", "pasta!", None, None, None)
            .await
            .unwrap();

        let results = store
            .retrieve_relevant_memories("u1", "my thesis defense is next week and I am terrified", 5)
            .await;
        assert!(!results.is_empty());
        assert_eq!(
            results[0].entry.content,
            "my thesis defense is next week and I am terrified"
        );
    }

    #[tokio::test]
    async fn retrieval_never_crosses_users() {
        let store = store_for("elena");
        store
            .store_conversation("u1", "my secret plan", "noted", None, None, None)
            .await
            .unwrap();
        store
            .store_conversation("u2", "other user talk", "sure", None, None, None)
            .await
            .unwrap();

        let results = store.retrieve_relevant_memories("u2", "my secret plan", 10).await;
        assert!(results.iter().all(|r| r.entry.user_id == "u2"));
    }

    #[tokio::test]
    async fn emotion_hint_routes_and_tags_results() {
        let store = store_for("elena");
        store
            .store_conversation(
                "u1",
                "I'm feeling really happy today!",
                "that's wonderful to hear",
                None,
                Some(EmotionHint { label: "joy".to_string(), confidence: 0.95 }),
                None,
            )
            .await
            .unwrap();

        let results = store
            .retrieve_context_aware_memories(
                "u1",
                "how do I feel about things?",
                5,
                Some(EmotionHint { label: "joy".to_string(), confidence: 0.95 }),
            )
            .await;

        assert!(!results.is_empty());
        assert!(results.iter().any(|r| r.emotion_source == "roberta:joy"));
        assert!(results.iter().all(|r| r.search_type == SearchType::Emotion));
    }

    #[tokio::test]
    async fn fidelity_first_marks_search_type_and_limit() {
        let store = store_for("elena");
        for i in 0..8 {
            store
                .store_conversation("u1", &format!("note number {i} about the reef"), "ok", None, None, None)
                .await
                .unwrap();
        }

        let results = store
            .retrieve_relevant_memories_fidelity_first(
                "u1",
                "reef",
                FidelityOptions { limit: 3, ..Default::default() },
            )
            .await;
        assert!(results.len() <= 3);
        assert!(results.iter().all(|r| r.search_type == SearchType::FidelityFirst));
        assert!(results.iter().all(|r| r.entry.user_id == "u1"));
    }

    #[tokio::test]
    async fn nuance_preservation_injects_defining_memory() {
        let store = store_for("elena");
        // A defining memory lexically unrelated to the query.
        store
            .store_conversation(
                "u1",
                "please remember that I got married to Jamie last summer, don't forget",
                "I will always remember that",
                None,
                Some(EmotionHint { label: "joy".to_string(), confidence: 1.0 }),
                None,
            )
            .await
            .unwrap();
        store
            .store_conversation("u1", "what snacks are good", "popcorn", None, None, None)
            .await
            .unwrap();

        let results = store
            .retrieve_relevant_memories_fidelity_first(
                "u1",
                "completely unrelated query text",
                FidelityOptions { limit: 2, ..Default::default() },
            )
            .await;

        assert!(
            results
                .iter()
                .any(|r| r.entry.significance.significance_tier == SignificanceTier::Defining),
            "a defining memory must survive when one exists"
        );
    }

    #[tokio::test]
    async fn all_seven_vectors_written_and_normalized() {
        let store = store_for("elena");
        let entry = MemoryEntry::new("u1", "elena", MemoryRole::User, "I love the coral reef!");
        let point = store.embed_entry(entry).await.unwrap();
        assert_eq!(point.vectors.len(), 7);
        for facet in NamedVector::ALL {
            let v = point.vectors.get(&facet).expect("facet present");
            assert!(is_normalized(v, 1e-4), "{:?} not normalized", facet);
        }
    }

    #[tokio::test]
    async fn last_interaction_reports_latest_turn() {
        let store = store_for("elena");
        assert!(store.get_last_interaction_info("u1").await.is_none());

        store
            .store_conversation("u1", "hello", "hi", Some("chan9"), None, None)
            .await
            .unwrap();
        let info = store.get_last_interaction_info("u1").await.unwrap();
        assert_eq!(info.channel_id.as_deref(), Some("chan9"));
    }

    #[tokio::test]
    async fn gossip_entries_are_not_conversation_history() {
        let store = store_for("elena");
        let mut entry = MemoryEntry::new("u1", "elena", MemoryRole::System, "heard news");
        entry.memory_type = MemoryType::Gossip;
        entry.propagation_depth = Some(1);
        store.store_entry(entry).await.unwrap();

        assert!(store.get_conversation_history("u1", 10).await.is_empty());
        let gossip = store
            .search_memories_with_qdrant_intelligence("u1", "news", Some(vec![MemoryType::Gossip]), 5)
            .await;
        assert_eq!(gossip.len(), 1);
    }

    #[tokio::test]
    async fn count_since_tracks_session_messages() {
        let store = store_for("elena");
        let start = Utc::now() - chrono::Duration::minutes(1);
        store
            .store_conversation("u1", "one", "two", None, None, None)
            .await
            .unwrap();
        assert_eq!(store.count_messages_since("u1", start).await, 2);
    }

    #[tokio::test]
    async fn bot_isolation_is_physical() {
        // Two stores, two collections: what Elena stores, Marcus never sees.
        let marker = Uuid::new_v4();
        let elena = store_for("elena");
        let marcus = store_for("marcus");

        elena
            .store_conversation(
                "u1",
                &format!("Testing isolation for Elena - {marker}"),
                "noted",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        marcus
            .store_conversation(
                "u1",
                &format!("Testing isolation for Marcus - {marker}"),
                "noted",
                None,
                None,
                None,
            )
            .await
            .unwrap();

        let elena_results = elena.retrieve_relevant_memories("u1", "isolation testing", 10).await;
        assert!(!elena_results.is_empty());
        assert!(
            elena_results.iter().all(|r| !r.entry.content.contains("Marcus")),
            "Elena's collection must never surface Marcus's memories"
        );

        let marcus_results = marcus.retrieve_relevant_memories("u1", "isolation testing", 10).await;
        assert!(
            marcus_results.iter().all(|r| !r.entry.content.contains("Elena")),
            "Marcus's collection must never surface Elena's memories"
        );
    }
}
