//! Logical contract of the bot-scoped vector index.
//!
//! Bot isolation is physical: an index instance is bound to exactly one
//! collection (`whisperengine_memory_<bot>`) at construction and no operation
//! can cross collections.  User isolation inside the collection is by
//! `user_id` filter, and every query carries one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use whisperengine_embedding::dot;

use crate::schema::{MemoryEntry, MemoryType, NamedVector, SignificanceTier};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("vector backend error: {0}")]
    Backend(String),
    #[error("embedding failed: {0}")]
    Embedding(#[from] whisperengine_embedding::EmbeddingError),
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A fully-embedded entry ready for upsert: the payload plus all seven named
/// vectors.
#[derive(Debug, Clone)]
pub struct MemoryPoint {
    pub entry: MemoryEntry,
    pub vectors: HashMap<NamedVector, Vec<f32>>,
}

/// One search against the index.  `user_id` is mandatory — there is no
/// unfiltered search path.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub user_id: String,
    pub vector: Vec<f32>,
    pub vector_name: NamedVector,
    pub limit: usize,
    pub memory_types: Option<Vec<MemoryType>>,
    /// Exact-tier filter, used by character-nuance preservation to pull a
    /// defining memory regardless of primary score.
    pub significance_tier: Option<SignificanceTier>,
    pub min_score: f32,
    /// When true the index also reports each hit's personality-facet
    /// similarity against the query vector.
    pub with_personality_alignment: bool,
}

impl SearchQuery {
    pub fn new(user_id: impl Into<String>, vector: Vec<f32>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            vector,
            vector_name: NamedVector::Content,
            limit,
            memory_types: None,
            significance_tier: None,
            min_score: 0.0,
            with_personality_alignment: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f32,
    pub personality_alignment: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub collection: String,
    pub points: Option<u64>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Create the collection with seven named 384-dim cosine vectors if it
    /// does not exist yet.
    async fn ensure_collection(&self) -> Result<(), MemoryError>;

    async fn upsert(&self, points: Vec<MemoryPoint>) -> Result<(), MemoryError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredMemory>, MemoryError>;

    /// Most recent entries for a user, newest first.  `memory_types` limits
    /// the kinds returned (None = all).
    async fn fetch_recent(
        &self,
        user_id: &str,
        memory_types: Option<Vec<MemoryType>>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Count conversation entries for a user stored at or after `since`.
    async fn count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, MemoryError>;

    async fn health(&self) -> Result<HealthStatus, MemoryError>;
}

// ── In-memory index ───────────────────────────────────────────────────────────

/// In-process index with the same contract as the Qdrant backend.  Used by
/// tests and offline runs; search is exact dot-product over the requested
/// facet.
#[derive(Default)]
pub struct InMemoryIndex {
    collection: String,
    points: RwLock<Vec<MemoryPoint>>,
}

impl InMemoryIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            points: RwLock::new(Vec::new()),
        }
    }

    fn facet<'a>(point: &'a MemoryPoint, facet: NamedVector) -> Option<&'a [f32]> {
        point
            .vectors
            .get(&facet)
            .or_else(|| point.vectors.get(&NamedVector::Content))
            .map(|v| v.as_slice())
    }

    fn matches(query: &SearchQuery, entry: &MemoryEntry) -> bool {
        if entry.user_id != query.user_id {
            return false;
        }
        if let Some(types) = &query.memory_types {
            if !types.contains(&entry.memory_type) {
                return false;
            }
        }
        if let Some(tier) = query.significance_tier {
            if entry.significance.significance_tier != tier {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn upsert(&self, new_points: Vec<MemoryPoint>) -> Result<(), MemoryError> {
        let mut points = self.points.write().await;
        for point in new_points {
            // Upsert semantics: replace an existing point with the same id.
            if let Some(existing) = points.iter_mut().find(|p| p.entry.id == point.entry.id) {
                *existing = point;
            } else {
                points.push(point);
            }
        }
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredMemory>, MemoryError> {
        let points = self.points.read().await;
        let mut hits: Vec<ScoredMemory> = points
            .iter()
            .filter(|p| Self::matches(query, &p.entry))
            .filter_map(|p| {
                let facet = Self::facet(p, query.vector_name)?;
                let score = dot(&query.vector, facet);
                if score < query.min_score {
                    return None;
                }
                let personality_alignment = if query.with_personality_alignment {
                    Self::facet(p, NamedVector::Personality).map(|pv| dot(&query.vector, pv))
                } else {
                    None
                };
                Some(ScoredMemory {
                    entry: p.entry.clone(),
                    score,
                    personality_alignment,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn fetch_recent(
        &self,
        user_id: &str,
        memory_types: Option<Vec<MemoryType>>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let points = self.points.read().await;
        let mut entries: Vec<MemoryEntry> = points
            .iter()
            .filter(|p| p.entry.user_id == user_id)
            .filter(|p| {
                memory_types
                    .as_ref()
                    .map(|types| types.contains(&p.entry.memory_type))
                    .unwrap_or(true)
            })
            .map(|p| p.entry.clone())
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, MemoryError> {
        let points = self.points.read().await;
        Ok(points
            .iter()
            .filter(|p| {
                p.entry.user_id == user_id
                    && p.entry.memory_type == MemoryType::Conversation
                    && p.entry.timestamp >= since
            })
            .count())
    }

    async fn health(&self) -> Result<HealthStatus, MemoryError> {
        let points = self.points.read().await;
        Ok(HealthStatus {
            status: "ok".to_string(),
            collection: self.collection.clone(),
            points: Some(points.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryRole;

    fn point(user: &str, content: &str, vector: Vec<f32>) -> MemoryPoint {
        let entry = MemoryEntry::new(user, "elena", MemoryRole::User, content);
        let mut vectors = HashMap::new();
        vectors.insert(NamedVector::Content, vector);
        MemoryPoint { entry, vectors }
    }

    #[tokio::test]
    async fn search_filters_by_user() {
        let index = InMemoryIndex::new("whisperengine_memory_elena");
        index
            .upsert(vec![
                point("u1", "hello", vec![1.0, 0.0]),
                point("u2", "other user", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&SearchQuery::new("u1", vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.entry.user_id == "u1"));
    }

    #[tokio::test]
    async fn search_respects_limit_and_order() {
        let index = InMemoryIndex::new("c");
        index
            .upsert(vec![
                point("u1", "close", vec![1.0, 0.0]),
                point("u1", "far", vec![0.0, 1.0]),
                point("u1", "mid", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&SearchQuery::new("u1", vec![1.0, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.content, "close");
        assert_eq!(hits[1].entry.content, "mid");
    }

    #[tokio::test]
    async fn min_score_drops_weak_hits() {
        let index = InMemoryIndex::new("c");
        index
            .upsert(vec![point("u1", "orthogonal", vec![0.0, 1.0])])
            .await
            .unwrap();

        let mut query = SearchQuery::new("u1", vec![1.0, 0.0], 10);
        query.min_score = 0.1;
        let hits = index.search(&query).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn missing_facet_falls_back_to_content() {
        let index = InMemoryIndex::new("c");
        index
            .upsert(vec![point("u1", "only content", vec![1.0, 0.0])])
            .await
            .unwrap();

        let mut query = SearchQuery::new("u1", vec![1.0, 0.0], 10);
        query.vector_name = NamedVector::Emotion;
        let hits = index.search(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let index = InMemoryIndex::new("c");
        let mut p = point("u1", "v1", vec![1.0, 0.0]);
        index.upsert(vec![p.clone()]).await.unwrap();
        p.entry.content = "v2".to_string();
        index.upsert(vec![p]).await.unwrap();

        let hits = index
            .search(&SearchQuery::new("u1", vec![1.0, 0.0], 10))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.content, "v2");
    }

    #[tokio::test]
    async fn count_since_only_counts_conversation_entries() {
        let index = InMemoryIndex::new("c");
        let mut gossip = point("u1", "heard something", vec![1.0, 0.0]);
        gossip.entry.memory_type = MemoryType::Gossip;
        index
            .upsert(vec![point("u1", "a", vec![1.0, 0.0]), gossip])
            .await
            .unwrap();

        let count = index
            .count_since("u1", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn fetch_recent_is_newest_first() {
        let index = InMemoryIndex::new("c");
        let mut old = point("u1", "old", vec![1.0, 0.0]);
        old.entry.timestamp = Utc::now() - chrono::Duration::hours(2);
        let new = point("u1", "new", vec![1.0, 0.0]);
        index.upsert(vec![old, new]).await.unwrap();

        let entries = index.fetch_recent("u1", None, 10).await.unwrap();
        assert_eq!(entries[0].content, "new");
        assert_eq!(entries[1].content, "old");
    }
}
