//! Bot self-memory: the character's knowledge about itself and its
//! post-interaction reflections.
//!
//! Lives in the same bot collection under the synthetic principal
//! `bot_self_<bot>`, so it physically cannot leak to another bot and is
//! excluded from user retrieval by its memory types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use whisperengine_llm::{ChatMessage, ChatOptions, ChatProvider, extract_json_output};

use crate::index::MemoryError;
use crate::schema::{MemoryEntry, MemoryRole, MemoryType, RetrievedMemory};
use crate::store::MemoryStore;

/// A structured reflection stored after a notable interaction.  All scores
/// are in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfReflection {
    pub effectiveness: f32,
    pub authenticity: f32,
    pub emotional_resonance: f32,
    pub learning_insight: String,
    pub improvement_suggestion: String,
    pub dominant_trait: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtractedFact {
    content: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    synonyms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtractedFacts {
    #[serde(default)]
    facts: Vec<ExtractedFact>,
}

pub struct BotSelfMemory {
    store: Arc<MemoryStore>,
    bot_name: String,
}

impl BotSelfMemory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let bot_name = store.bot_name().to_string();
        Self { store, bot_name }
    }

    /// The synthetic principal all self-memory lives under.
    pub fn self_user_id(&self) -> String {
        format!("bot_self_{}", self.bot_name)
    }

    /// One-shot LLM-assisted import of character definition knowledge.
    ///
    /// The model extracts per-fact entries (relationships, background,
    /// current projects, daily routine, personality insights) with query
    /// synonyms; each fact becomes one BotSelfKnowledge entry.  Returns the
    /// number of facts stored.
    pub async fn import_character_knowledge(
        &self,
        llm: &dyn ChatProvider,
        model: &str,
        character_definition: &serde_json::Value,
    ) -> Result<usize, MemoryError> {
        let prompt = format!(
            "Extract the character's personal knowledge from this definition as discrete, \
             self-contained facts. Cover relationships, background, current projects, daily \
             routine, and personality insights. For each fact include short search synonyms.\n\
             Respond only with JSON: {{\"facts\":[{{\"content\":\"...\",\"category\":\"...\",\
             \"synonyms\":[\"...\"]}}]}}\n\nCHARACTER DEFINITION:\n{}",
            serde_json::to_string_pretty(character_definition)?,
        );

        let response = llm
            .chat_completion(
                model,
                &[
                    ChatMessage::system("You are a precise knowledge extraction engine."),
                    ChatMessage::user(prompt),
                ],
                ChatOptions { max_tokens: 2048, temperature: 0.2 },
            )
            .await;

        let raw = match response {
            Ok(r) => r.content,
            Err(err) => {
                warn!(%err, "character knowledge extraction call failed");
                return Ok(0);
            }
        };

        let Some(extracted) = extract_json_output::<ExtractedFacts>(&raw) else {
            warn!("character knowledge extraction returned unparseable output");
            return Ok(0);
        };

        let self_id = self.self_user_id();
        let mut stored = 0;
        for fact in extracted.facts {
            if fact.content.trim().is_empty() {
                continue;
            }
            let mut entry = MemoryEntry::new(
                &self_id,
                &self.bot_name,
                MemoryRole::KnowledgeImport,
                fact.content,
            );
            entry.memory_type = MemoryType::BotSelfKnowledge;
            entry
                .metadata
                .insert("category".to_string(), serde_json::json!(fact.category));
            entry
                .metadata
                .insert("synonyms".to_string(), serde_json::json!(fact.synonyms));
            self.store.store_entry(entry).await?;
            stored += 1;
        }

        info!(bot = %self.bot_name, facts = stored, "imported character knowledge");
        Ok(stored)
    }

    /// Retrieve self-knowledge relevant to `query`, restricted to the self
    /// namespace.  Same retrieval path as user memories.
    pub async fn query_self_knowledge(&self, query: &str, limit: usize) -> Vec<RetrievedMemory> {
        self.store
            .search_memories_with_qdrant_intelligence(
                &self.self_user_id(),
                query,
                Some(vec![MemoryType::BotSelfKnowledge]),
                limit,
            )
            .await
    }

    /// Render relevant self-knowledge as a prompt block via the LLM.  Falls
    /// back to a plain bullet list when the formatting call fails.
    pub async fn self_knowledge_for_prompt(
        &self,
        llm: &dyn ChatProvider,
        model: &str,
        query: &str,
        limit: usize,
    ) -> Option<String> {
        let facts = self.query_self_knowledge(query, limit).await;
        if facts.is_empty() {
            return None;
        }

        let bullet_list = facts
            .iter()
            .map(|f| format!("- {}", f.entry.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Rewrite these facts about yourself into one short first-person paragraph you \
             could naturally draw on in conversation. Keep every fact, add nothing.\n\n{bullet_list}"
        );
        match llm
            .chat_completion(
                model,
                &[ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 256, temperature: 0.4 },
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            _ => Some(bullet_list),
        }
    }

    /// Store a structured post-interaction reflection.
    pub async fn store_self_reflection(
        &self,
        reflection: SelfReflection,
    ) -> Result<(), MemoryError> {
        let content = format!(
            "Reflection: {} Improvement: {}",
            reflection.learning_insight, reflection.improvement_suggestion
        );
        let mut entry = MemoryEntry::new(
            self.self_user_id(),
            &self.bot_name,
            MemoryRole::SelfReflection,
            content,
        );
        entry.memory_type = MemoryType::BotSelfReflection;
        entry.metadata.insert(
            "scores".to_string(),
            serde_json::json!({
                "effectiveness": reflection.effectiveness.clamp(0.0, 1.0),
                "authenticity": reflection.authenticity.clamp(0.0, 1.0),
                "emotional_resonance": reflection.emotional_resonance.clamp(0.0, 1.0),
            }),
        );
        entry.metadata.insert(
            "dominant_trait".to_string(),
            serde_json::json!(reflection.dominant_trait),
        );
        self.store.store_entry(entry).await
    }

    /// Most recent reflections, newest first.  Feeds later prompt
    /// construction.
    pub async fn recent_insights(&self, limit: usize) -> Vec<RetrievedMemory> {
        self.store
            .search_memories_with_qdrant_intelligence(
                &self.self_user_id(),
                "reflection insight improvement",
                Some(vec![MemoryType::BotSelfReflection]),
                limit,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use whisperengine_embedding::HashEmbedder;

    fn self_memory() -> BotSelfMemory {
        let store = Arc::new(MemoryStore::new(
            "elena",
            Arc::new(InMemoryIndex::new("whisperengine_memory_elena")),
            Arc::new(HashEmbedder),
            0.7,
        ));
        BotSelfMemory::new(store)
    }

    #[test]
    fn self_namespace_is_bot_scoped() {
        assert_eq!(self_memory().self_user_id(), "bot_self_elena");
    }

    #[tokio::test]
    async fn reflections_round_trip() {
        let memory = self_memory();
        memory
            .store_self_reflection(SelfReflection {
                effectiveness: 0.8,
                authenticity: 0.9,
                emotional_resonance: 0.7,
                learning_insight: "users open up after I share my own research stories".to_string(),
                improvement_suggestion: "ask one follow-up question before pivoting".to_string(),
                dominant_trait: "curious".to_string(),
            })
            .await
            .unwrap();

        let insights = memory.recent_insights(5).await;
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].entry.memory_type, MemoryType::BotSelfReflection);
        assert!(insights[0].entry.content.contains("follow-up question"));
    }

    #[tokio::test]
    async fn reflection_scores_are_clamped() {
        let memory = self_memory();
        memory
            .store_self_reflection(SelfReflection {
                effectiveness: 1.7,
                authenticity: -0.5,
                emotional_resonance: 0.5,
                learning_insight: "x".to_string(),
                improvement_suggestion: "y".to_string(),
                dominant_trait: "warm".to_string(),
            })
            .await
            .unwrap();

        let insights = memory.recent_insights(1).await;
        let scores = &insights[0].entry.metadata["scores"];
        assert_eq!(scores["effectiveness"], 1.0);
        assert_eq!(scores["authenticity"], 0.0);
    }

    #[tokio::test]
    async fn self_knowledge_does_not_surface_as_user_memory() {
        let memory = self_memory();
        let store = memory.store.clone();

        let mut entry = MemoryEntry::new(
            memory.self_user_id(),
            "elena",
            MemoryRole::KnowledgeImport,
            "I grew up by the coast and studied marine biology",
        );
        entry.memory_type = MemoryType::BotSelfKnowledge;
        store.store_entry(entry).await.unwrap();

        // Normal user retrieval path for a real user sees nothing.
        let user_results = store
            .retrieve_relevant_memories("real_user", "marine biology", 10)
            .await;
        assert!(user_results.is_empty());

        // Even a query under the self principal through the conversation
        // path stays empty, because the type filter excludes knowledge.
        let conv_results = store
            .retrieve_relevant_memories(&memory.self_user_id(), "marine biology", 10)
            .await;
        assert!(conv_results.is_empty());

        // The self-knowledge path finds it.
        let self_results = memory.query_self_knowledge("marine biology", 5).await;
        assert_eq!(self_results.len(), 1);
    }
}
