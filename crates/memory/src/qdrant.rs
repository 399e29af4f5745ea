//! Qdrant-backed [`VectorIndex`].
//!
//! Payload layout: the full [`MemoryEntry`] is stored as JSON under
//! `entry_json`, alongside flat filterable fields (`user_id`, `memory_type`,
//! `significance_tier`, `timestamp` as unix seconds).  Filters only ever
//! touch the flat fields; reads deserialize `entry_json`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, NamedVectors,
    PointStruct, Range, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, VectorsConfigBuilder, value,
};
use tracing::{debug, info};

use whisperengine_embedding::EMBEDDING_DIM;

use crate::index::{HealthStatus, MemoryError, MemoryPoint, ScoredMemory, SearchQuery, VectorIndex};
use crate::schema::{MemoryEntry, MemoryType, NamedVector};

/// Page size used when scanning recent entries; recency ordering is applied
/// client-side after a filtered scroll.
const SCROLL_PAGE: u32 = 256;

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    pub fn connect(url: &str, collection: impl Into<String>) -> Result<Self, MemoryError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|err| MemoryError::Backend(err.to_string()))?;
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    fn backend_err(err: impl std::fmt::Display) -> MemoryError {
        MemoryError::Backend(err.to_string())
    }

    fn base_filter(query: &SearchQuery) -> Filter {
        let mut must = vec![Condition::matches("user_id", query.user_id.clone())];
        if let Some(types) = &query.memory_types {
            let keywords: Vec<String> = types.iter().map(type_slug).collect();
            must.push(Condition::matches("memory_type", keywords));
        }
        if let Some(tier) = query.significance_tier {
            must.push(Condition::matches(
                "significance_tier",
                tier.as_str().to_string(),
            ));
        }
        Filter::must(must)
    }

    fn point_from(point: &MemoryPoint) -> Result<PointStruct, MemoryError> {
        let entry = &point.entry;
        let payload_json = serde_json::json!({
            "entry_json": serde_json::to_string(entry)?,
            "user_id": entry.user_id,
            "bot_name": entry.bot_name,
            "memory_type": type_slug(&entry.memory_type),
            "significance_tier": entry.significance.significance_tier.as_str(),
            "timestamp": entry.timestamp.timestamp(),
        });
        let payload = Payload::try_from(payload_json)
            .map_err(|err| MemoryError::Backend(err.to_string()))?;

        let mut vectors = NamedVectors::default();
        for facet in NamedVector::ALL {
            // Absent facets were already filled with the content vector by
            // the store; missing here means a construction bug upstream.
            if let Some(v) = point.vectors.get(&facet) {
                vectors = vectors.add_vector(facet.as_str(), v.clone());
            }
        }

        Ok(PointStruct::new(entry.id.to_string(), vectors, payload))
    }

    fn entry_from_payload(
        payload: &HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<MemoryEntry> {
        let raw = payload.get("entry_json")?;
        let value::Kind::StringValue(json) = raw.kind.as_ref()? else {
            return None;
        };
        serde_json::from_str(json).ok()
    }
}

fn type_slug(memory_type: &MemoryType) -> String {
    match memory_type {
        MemoryType::Conversation => "conversation",
        MemoryType::BotSelfKnowledge => "bot_self_knowledge",
        MemoryType::BotSelfReflection => "bot_self_reflection",
        MemoryType::Gossip => "gossip",
        MemoryType::Fact => "fact",
        MemoryType::Summary => "summary",
    }
    .to_string()
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&self) -> Result<(), MemoryError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(Self::backend_err)?;
        if exists {
            return Ok(());
        }

        let mut vectors_config = VectorsConfigBuilder::default();
        for facet in NamedVector::ALL {
            vectors_config.add_named_vector_params(
                facet.as_str(),
                VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
            );
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config),
            )
            .await
            .map_err(Self::backend_err)?;
        info!(collection = %self.collection, "created memory collection");
        Ok(())
    }

    async fn upsert(&self, points: Vec<MemoryPoint>) -> Result<(), MemoryError> {
        if points.is_empty() {
            return Ok(());
        }
        let structs: Vec<PointStruct> = points
            .iter()
            .map(Self::point_from)
            .collect::<Result<_, _>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, structs).wait(true))
            .await
            .map_err(Self::backend_err)?;
        debug!(collection = %self.collection, count = points.len(), "upserted memory points");
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredMemory>, MemoryError> {
        let filter = Self::base_filter(query);

        let request = SearchPointsBuilder::new(
            &self.collection,
            query.vector.clone(),
            query.limit as u64,
        )
        .vector_name(query.vector_name.as_str())
        .filter(filter.clone())
        .score_threshold(query.min_score)
        .with_payload(true);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(Self::backend_err)?;

        // Optional second pass against the personality facet, joined by id.
        let personality_scores: HashMap<String, f32> = if query.with_personality_alignment {
            let request = SearchPointsBuilder::new(
                &self.collection,
                query.vector.clone(),
                (query.limit * 3) as u64,
            )
            .vector_name(NamedVector::Personality.as_str())
            .filter(filter)
            .with_payload(false);
            match self.client.search_points(request).await {
                Ok(resp) => resp
                    .result
                    .into_iter()
                    .filter_map(|p| {
                        let id = p.id.as_ref()?.point_id_options.as_ref()?;
                        let id = match id {
                            qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u.clone(),
                            qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => {
                                n.to_string()
                            }
                        };
                        Some((id, p.score))
                    })
                    .collect(),
                Err(err) => {
                    debug!(%err, "personality-facet pass failed; alignment omitted");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let entry = Self::entry_from_payload(&point.payload)?;
                let personality_alignment = if query.with_personality_alignment {
                    personality_scores.get(&entry.id.to_string()).copied()
                } else {
                    None
                };
                Some(ScoredMemory {
                    entry,
                    score: point.score,
                    personality_alignment,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn fetch_recent(
        &self,
        user_id: &str,
        memory_types: Option<Vec<MemoryType>>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut must = vec![Condition::matches("user_id", user_id.to_string())];
        if let Some(types) = &memory_types {
            let keywords: Vec<String> = types.iter().map(type_slug).collect();
            must.push(Condition::matches("memory_type", keywords));
        }

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(Filter::must(must))
                    .limit(SCROLL_PAGE)
                    .with_payload(true),
            )
            .await
            .map_err(Self::backend_err)?;

        let mut entries: Vec<MemoryEntry> = response
            .result
            .iter()
            .filter_map(|p| Self::entry_from_payload(&p.payload))
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
        let filter = Filter::must([
            Condition::matches("user_id", user_id.to_string()),
            Condition::matches("memory_type", "conversation".to_string()),
            Condition::range(
                "timestamp",
                Range {
                    gte: Some(since.timestamp() as f64),
                    ..Default::default()
                },
            ),
        ]);

        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(Self::backend_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn health(&self) -> Result<HealthStatus, MemoryError> {
        let reply = self
            .client
            .health_check()
            .await
            .map_err(Self::backend_err)?;

        let points = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(false))
            .await
            .ok()
            .and_then(|r| r.result.map(|c| c.count));

        Ok(HealthStatus {
            status: format!("{} {}", reply.title, reply.version),
            collection: self.collection.clone(),
            points,
        })
    }
}
