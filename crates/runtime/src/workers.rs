//! Background job handlers: the post-conversation pipeline, gossip
//! dispatch, the daily-life remote brain, and the reverie cycle.
//!
//! Handlers are registered by task name and run under the queue's
//! at-least-once/retry semantics; anything returned as `Err` is retried with
//! backoff.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use whisperengine_autonomy::{DailyLifeGraph, SensorySnapshot};
use whisperengine_llm::{ChatMessage, ChatOptions, extract_json_output};
use whisperengine_memory::{
    MemoryEntry, MemoryRole, MemoryType, SelfReflection, summarize_conversation,
};
use whisperengine_queue::{HandlerRegistry, JobHandler};
use whisperengine_trust::MIN_TRUST_FOR_GOSSIP;
use whisperengine_universe::{UniverseEvent, gossip_entry};

use crate::context::RuntimeContext;

/// Minimum combined human text before extraction is worth an LLM call.
const MIN_EXTRACTION_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
struct SessionJob {
    user_id: String,
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    user_name: String,
    /// Inline transcript (daily-life multiparty jobs); when absent the
    /// handler reads recent history from the memory store.
    #[serde(default)]
    messages: Vec<TranscriptLine>,
}

#[derive(Debug, Deserialize)]
struct TranscriptLine {
    role: String,
    content: String,
}

async fn session_transcript(
    ctx: &RuntimeContext,
    job: &SessionJob,
) -> (Vec<String>, Vec<String>) {
    if !job.messages.is_empty() {
        let human: Vec<String> = job
            .messages
            .iter()
            .filter(|m| m.role == "user" || m.role == "human")
            .map(|m| m.content.clone())
            .collect();
        let all = job.messages.iter().map(|m| m.content.clone()).collect();
        return (human, all);
    }

    let history = ctx.memory.get_conversation_history(&job.user_id, 50).await;
    let in_session: Vec<&MemoryEntry> = history
        .iter()
        .filter(|e| {
            job.session_id.is_empty()
                || e.session_id.as_deref() == Some(job.session_id.as_str())
        })
        .collect();
    let human = in_session
        .iter()
        .filter(|e| e.role == MemoryRole::User)
        .map(|e| e.content.clone())
        .collect();
    let all = in_session.iter().map(|e| e.content.clone()).collect();
    (human, all)
}

// ── Summarization ─────────────────────────────────────────────────────────────

pub struct SummarizeHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for SummarizeHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let (_, all) = session_transcript(&self.ctx, &job).await;
        if all.is_empty() {
            debug!(session = %job.session_id, "nothing to summarize");
            return Ok(());
        }

        let summary = summarize_conversation(self.ctx.embedder.as_ref(), &all, 3).await;
        if summary.topic_summary.is_empty() {
            return Ok(());
        }

        let mut entry = MemoryEntry::new(
            &job.user_id,
            self.ctx.bot_name(),
            MemoryRole::System,
            summary.topic_summary.clone(),
        );
        entry.memory_type = MemoryType::Summary;
        entry.session_id = Some(job.session_id.clone());
        entry.metadata.insert(
            "themes".to_string(),
            serde_json::json!(summary.conversation_themes),
        );
        entry.metadata.insert(
            "emotions".to_string(),
            serde_json::json!(summary.emotions_detected),
        );
        entry
            .metadata
            .insert("method".to_string(), serde_json::json!(summary.method));
        self.ctx
            .memory
            .store_entry(entry)
            .await
            .context("storing session summary")?;
        info!(session = %job.session_id, "session summarized");
        Ok(())
    }
}

// ── Knowledge extraction ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractedFacts {
    #[serde(default)]
    facts: Vec<String>,
}

pub struct KnowledgeExtractionHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for KnowledgeExtractionHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let (human, _) = session_transcript(&self.ctx, &job).await;
        let combined = human.join("\n\n");
        if combined.trim().len() < MIN_EXTRACTION_CHARS {
            debug!(user = %job.user_id, "too little human text; extraction skipped");
            return Ok(());
        }

        let prompt = format!(
            "Extract stable, durable facts about this user from their messages — things that \
             will still be true next month (job, family, pets, preferences, projects). \
             Ignore one-off requests and smalltalk.\n\
             Respond only with JSON: {{\"facts\":[\"...\"]}}\n\nMESSAGES:\n{combined}"
        );
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 512, temperature: 0.2 },
            )
            .await?;

        let Some(extracted) = extract_json_output::<ExtractedFacts>(&response.content) else {
            debug!("fact extraction output unparseable; dropping");
            return Ok(());
        };

        let mut stored = 0;
        for fact in extracted.facts {
            if fact.trim().is_empty() {
                continue;
            }
            let mut entry = MemoryEntry::new(
                &job.user_id,
                self.ctx.bot_name(),
                MemoryRole::System,
                fact.clone(),
            );
            entry.memory_type = MemoryType::Fact;
            entry.session_id = Some(job.session_id.clone());
            self.ctx.memory.store_entry(entry).await?;
            let _ = self.ctx.trust.add_insight(&job.user_id, &fact).await;
            stored += 1;
        }
        info!(user = %job.user_id, facts = stored, "knowledge extracted");
        Ok(())
    }
}

// ── Preference extraction ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractedPreferences {
    #[serde(default)]
    preferences: serde_json::Map<String, serde_json::Value>,
}

pub struct PreferenceExtractionHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for PreferenceExtractionHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let (human, _) = session_transcript(&self.ctx, &job).await;
        let combined = human.join("\n\n");
        if combined.trim().len() < MIN_EXTRACTION_CHARS {
            return Ok(());
        }

        let prompt = format!(
            "Extract explicit interaction preferences this user has stated (nickname, \
             verbosity, tone, topics to avoid). Only include preferences they actually \
             expressed.\nRespond only with JSON: \
             {{\"preferences\":{{\"nickname\":\"...\"}}}}\n\nMESSAGES:\n{combined}"
        );
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 256, temperature: 0.2 },
            )
            .await?;

        let Some(extracted) = extract_json_output::<ExtractedPreferences>(&response.content)
        else {
            return Ok(());
        };
        if extracted.preferences.is_empty() {
            return Ok(());
        }

        // Deduplicate against current preferences: unchanged values are not
        // rewritten (keeps updated_at honest).
        let current = self
            .ctx
            .trust
            .get_relationship(&job.user_id)
            .await
            .map(|v| v.relationship.preferences)
            .unwrap_or_default();

        for (key, value) in extracted.preferences {
            if current.get(&key) == Some(&value) {
                continue;
            }
            self.ctx
                .trust
                .update_preference(&job.user_id, &key, value)
                .await?;
        }
        Ok(())
    }
}

// ── Goal analysis ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractedGoals {
    #[serde(default)]
    goals: Vec<GoalUpdate>,
}

#[derive(Debug, Deserialize)]
struct GoalUpdate {
    description: String,
    #[serde(default)]
    progress: Option<String>,
}

pub struct GoalAnalysisHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for GoalAnalysisHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let (human, all) = session_transcript(&self.ctx, &job).await;
        if human.is_empty() {
            return Ok(());
        }

        let prompt = format!(
            "From this conversation, identify personal goals the user is pursuing and any \
             progress they reported.\nRespond only with JSON: \
             {{\"goals\":[{{\"description\":\"...\",\"progress\":\"...\"}}]}}\n\n\
             CONVERSATION:\n{}",
            all.join("\n")
        );
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 512, temperature: 0.3 },
            )
            .await?;

        let Some(extracted) = extract_json_output::<ExtractedGoals>(&response.content) else {
            return Ok(());
        };

        for goal in extracted.goals {
            if goal.description.trim().is_empty() {
                continue;
            }
            let content = match &goal.progress {
                Some(progress) if !progress.is_empty() => {
                    format!("Goal: {} — progress: {}", goal.description, progress)
                }
                _ => format!("Goal: {}", goal.description),
            };
            let mut entry =
                MemoryEntry::new(&job.user_id, self.ctx.bot_name(), MemoryRole::System, content);
            entry.memory_type = MemoryType::Fact;
            entry.session_id = Some(job.session_id.clone());
            entry
                .metadata
                .insert("kind".to_string(), serde_json::json!("goal"));
            self.ctx.memory.store_entry(entry).await?;
        }
        Ok(())
    }
}

// ── Reflection ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ReflectionOutput {
    #[serde(default)]
    effectiveness: f32,
    #[serde(default)]
    authenticity: f32,
    #[serde(default)]
    emotional_resonance: f32,
    #[serde(default)]
    learning_insight: String,
    #[serde(default)]
    improvement_suggestion: String,
    #[serde(default)]
    dominant_trait: String,
}

pub struct ReflectionHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for ReflectionHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let history = self.ctx.memory.get_conversation_history(&job.user_id, 30).await;
        if history.len() < 4 {
            return Ok(());
        }

        let transcript: String = history
            .iter()
            .map(|e| {
                let speaker = if e.role == MemoryRole::Bot { "me" } else { "them" };
                format!("{speaker}: {}\n", e.content)
            })
            .collect();

        let prompt = format!(
            "Reflect on your recent conversations with this user. Rate yourself and note \
             one concrete thing to carry forward.\nRespond only with JSON: \
             {{\"effectiveness\":0.0,\"authenticity\":0.0,\"emotional_resonance\":0.0,\
             \"learning_insight\":\"...\",\"improvement_suggestion\":\"...\",\
             \"dominant_trait\":\"...\"}}\n\nTRANSCRIPT:\n{transcript}"
        );
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[
                    ChatMessage::system(self.ctx.character.system_prompt.clone()),
                    ChatMessage::user(prompt),
                ],
                ChatOptions { max_tokens: 384, temperature: 0.5 },
            )
            .await?;

        let Some(output) = extract_json_output::<ReflectionOutput>(&response.content) else {
            return Ok(());
        };
        if output.learning_insight.trim().is_empty() {
            return Ok(());
        }

        self.ctx
            .self_memory
            .store_self_reflection(SelfReflection {
                effectiveness: output.effectiveness,
                authenticity: output.authenticity,
                emotional_resonance: output.emotional_resonance,
                learning_insight: output.learning_insight,
                improvement_suggestion: output.improvement_suggestion,
                dominant_trait: output.dominant_trait,
            })
            .await?;
        Ok(())
    }
}

// ── Insight analysis ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractedInsights {
    #[serde(default)]
    insights: Vec<String>,
}

pub struct InsightHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for InsightHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: SessionJob = serde_json::from_value(payload)?;
        let (human, _) = session_transcript(&self.ctx, &job).await;
        if human.is_empty() {
            return Ok(());
        }

        let prompt = format!(
            "What higher-level patterns do you notice about this user across these messages \
             (communication style, recurring themes, emotional patterns)?\n\
             Respond only with JSON: {{\"insights\":[\"...\"]}}\n\nMESSAGES:\n{}",
            human.join("\n")
        );
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 384, temperature: 0.4 },
            )
            .await?;

        if let Some(extracted) = extract_json_output::<ExtractedInsights>(&response.content) {
            for insight in extracted.insights {
                if !insight.trim().is_empty() {
                    let _ = self.ctx.trust.add_insight(&job.user_id, &insight).await;
                }
            }
        }
        Ok(())
    }
}

// ── Graph enrichment ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EnrichmentJob {
    user_id: String,
    session_id: String,
}

pub struct GraphEnrichmentHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for GraphEnrichmentHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: EnrichmentJob = serde_json::from_value(payload)?;
        let history = self.ctx.memory.get_conversation_history(&job.user_id, 50).await;
        let in_session: Vec<&MemoryEntry> = history
            .iter()
            .filter(|e| e.session_id.as_deref() == Some(job.session_id.as_str()))
            .collect();

        // Entity co-mention pass: names that keep appearing across the
        // session become queryable facts.
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for entry in &in_session {
            for entity in whisperengine_memory::significance::candidate_entities(&entry.content) {
                *counts.entry(entity).or_default() += 1;
            }
        }

        for (entity, count) in counts.into_iter().filter(|(_, c)| *c >= 2) {
            let mut entry = MemoryEntry::new(
                &job.user_id,
                self.ctx.bot_name(),
                MemoryRole::System,
                format!("{entity} came up repeatedly in conversation"),
            );
            entry.memory_type = MemoryType::Fact;
            entry.session_id = Some(job.session_id.clone());
            entry
                .metadata
                .insert("kind".to_string(), serde_json::json!("entity_mention"));
            entry
                .metadata
                .insert("mentions".to_string(), serde_json::json!(count));
            self.ctx.memory.store_entry(entry).await?;
        }
        Ok(())
    }
}

// ── Gossip dispatch ───────────────────────────────────────────────────────────

pub struct GossipDispatchHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for GossipDispatchHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let event: UniverseEvent = serde_json::from_value(payload)?;

        let recipients = self
            .ctx
            .relationship_store
            .bots_with_min_trust(&event.user_id, &event.source_bot, MIN_TRUST_FOR_GOSSIP)
            .await
            .map_err(|err| anyhow::anyhow!("recipient lookup failed: {err}"))?;

        if recipients.is_empty() {
            debug!(user = %event.user_id, "no eligible gossip recipients");
            return Ok(());
        }

        for recipient in recipients {
            let store = self.ctx.memory_factory.store_for(&recipient).await?;
            store
                .store_entry(gossip_entry(&event, &recipient))
                .await
                .with_context(|| format!("writing gossip into {recipient}"))?;
            info!(recipient, user = %event.user_id, "gossip delivered");
        }
        Ok(())
    }
}

// ── Daily life + reverie ──────────────────────────────────────────────────────

pub struct DailyLifeHandler {
    pub ctx: Arc<RuntimeContext>,
    pub graph: Arc<DailyLifeGraph>,
}

#[derive(Debug, Deserialize)]
struct DailyLifeJob {
    snapshot: SensorySnapshot,
}

#[async_trait]
impl JobHandler for DailyLifeHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<()> {
        let job: DailyLifeJob = serde_json::from_value(payload)?;
        let commands = self.graph.run(&job.snapshot).await;

        let key = self.ctx.keys.pending_actions(self.ctx.bot_name());
        for command in &commands {
            let encoded = serde_json::to_string(command)?;
            self.ctx
                .broker
                .rpush(&key, &encoded)
                .await
                .map_err(|err| anyhow::anyhow!("pending action push failed: {err}"))?;
        }
        if !commands.is_empty() {
            info!(count = commands.len(), "daily-life actions queued");
        }
        Ok(())
    }
}

pub struct ReverieHandler {
    pub ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl JobHandler for ReverieHandler {
    async fn handle(&self, _payload: serde_json::Value) -> Result<()> {
        // Creative idle: an unprompted reflection, off the hot path.
        let prompt = "It has been quiet for a while. Let your mind wander: what has been on \
                      your mind lately, and what would you like to do differently in your \
                      next conversations?\nRespond only with JSON: \
                      {\"learning_insight\":\"...\",\"improvement_suggestion\":\"...\",\
                      \"dominant_trait\":\"...\"}";
        let response = self
            .ctx
            .llm
            .chat_completion(
                &self.ctx.config.llm.model,
                &[
                    ChatMessage::system(self.ctx.character.system_prompt.clone()),
                    ChatMessage::user(prompt),
                ],
                ChatOptions { max_tokens: 256, temperature: 0.9 },
            )
            .await?;

        #[derive(Debug, Deserialize)]
        struct Reverie {
            #[serde(default)]
            learning_insight: String,
            #[serde(default)]
            improvement_suggestion: String,
            #[serde(default)]
            dominant_trait: String,
        }

        if let Some(reverie) = extract_json_output::<Reverie>(&response.content) {
            if !reverie.learning_insight.trim().is_empty() {
                self.ctx
                    .self_memory
                    .store_self_reflection(SelfReflection {
                        effectiveness: 0.5,
                        authenticity: 0.5,
                        emotional_resonance: 0.5,
                        learning_insight: reverie.learning_insight,
                        improvement_suggestion: reverie.improvement_suggestion,
                        dominant_trait: reverie.dominant_trait,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Wire every handler into one registry shared by all worker tasks.
pub fn build_registry(ctx: Arc<RuntimeContext>, graph: Arc<DailyLifeGraph>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("run_summarization", Arc::new(SummarizeHandler { ctx: ctx.clone() }));
    registry.register(
        "run_batch_knowledge_extraction",
        Arc::new(KnowledgeExtractionHandler { ctx: ctx.clone() }),
    );
    registry.register(
        "run_batch_preference_extraction",
        Arc::new(PreferenceExtractionHandler { ctx: ctx.clone() }),
    );
    registry.register(
        "run_batch_goal_analysis",
        Arc::new(GoalAnalysisHandler { ctx: ctx.clone() }),
    );
    registry.register("run_reflection", Arc::new(ReflectionHandler { ctx: ctx.clone() }));
    registry.register("run_insight_analysis", Arc::new(InsightHandler { ctx: ctx.clone() }));
    registry.register(
        "run_graph_enrichment",
        Arc::new(GraphEnrichmentHandler { ctx: ctx.clone() }),
    );
    registry.register(
        "run_gossip_dispatch",
        Arc::new(GossipDispatchHandler { ctx: ctx.clone() }),
    );
    registry.register(
        "process_daily_life",
        Arc::new(DailyLifeHandler { ctx: ctx.clone(), graph }),
    );
    registry.register("run_reverie_cycle", Arc::new(ReverieHandler { ctx }));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisperengine_config::{AppConfig, CharacterProfile};
    use whisperengine_llm::{ChatProvider, ChatResponse, LlmError};
    use whisperengine_universe::EventType;

    struct StubChat {
        reply: String,
    }

    #[async_trait]
    impl ChatProvider for StubChat {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.reply.clone(),
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            })
        }
        async fn chat_completion_with_tools(
            &self,
            model: &str,
            messages: &[ChatMessage],
            _tools: &serde_json::Value,
            options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            self.chat_completion(model, messages, options).await
        }
        async fn chat_completion_stream(
            &self,
            model: &str,
            messages: &[ChatMessage],
            options: ChatOptions,
            _tx: tokio::sync::mpsc::Sender<String>,
        ) -> Result<ChatResponse, LlmError> {
            self.chat_completion(model, messages, options).await
        }
    }

    fn ctx(reply: &str) -> Arc<RuntimeContext> {
        let mut config = AppConfig::default();
        config.bot.name = "elena".to_string();
        config.embedding.model_name = "test".to_string();
        config.llm.model = "test".to_string();
        let mut character = CharacterProfile::default();
        character.name = "elena".to_string();
        RuntimeContext::in_memory(config, character, Arc::new(StubChat { reply: reply.to_string() }))
    }

    async fn seed_session(ctx: &RuntimeContext, session_id: &str) {
        use whisperengine_memory::ConversationMetadata;
        let meta = ConversationMetadata {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        ctx.memory
            .store_conversation(
                "u1",
                "I adopted a puppy named Biscuit last week, Biscuit is tiny!",
                "that is wonderful, tell me about Biscuit",
                None,
                None,
                Some(meta),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn summarize_stores_summary_memory() {
        let ctx = ctx("{}");
        seed_session(&ctx, "s1").await;
        let handler = SummarizeHandler { ctx: ctx.clone() };
        handler
            .handle(serde_json::json!({"user_id": "u1", "session_id": "s1"}))
            .await
            .unwrap();

        let summaries = ctx
            .memory
            .search_memories_with_qdrant_intelligence(
                "u1",
                "puppy",
                Some(vec![MemoryType::Summary]),
                5,
            )
            .await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].entry.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn knowledge_extraction_stores_facts_and_insights() {
        let ctx = ctx(r#"{"facts":["Has a puppy named Biscuit"]}"#);
        seed_session(&ctx, "s1").await;
        let handler = KnowledgeExtractionHandler { ctx: ctx.clone() };
        handler
            .handle(serde_json::json!({"user_id": "u1", "session_id": "s1"}))
            .await
            .unwrap();

        let facts = ctx
            .memory
            .search_memories_with_qdrant_intelligence("u1", "puppy", Some(vec![MemoryType::Fact]), 5)
            .await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entry.content, "Has a puppy named Biscuit");

        let view = ctx.trust.get_relationship("u1").await.unwrap();
        assert_eq!(view.relationship.insights, vec!["Has a puppy named Biscuit"]);
    }

    #[tokio::test]
    async fn short_sessions_skip_extraction() {
        let ctx = ctx(r#"{"facts":["should not be stored"]}"#);
        // Inline transcript below the 30-char floor.
        let handler = KnowledgeExtractionHandler { ctx: ctx.clone() };
        handler
            .handle(serde_json::json!({
                "user_id": "u1",
                "session_id": "s1",
                "messages": [{"role": "user", "content": "hi"}],
            }))
            .await
            .unwrap();

        let facts = ctx
            .memory
            .search_memories_with_qdrant_intelligence("u1", "stored", Some(vec![MemoryType::Fact]), 5)
            .await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn preference_extraction_dedupes_unchanged_values() {
        let ctx = ctx(r#"{"preferences":{"nickname":"Mark"}}"#);
        seed_session(&ctx, "s1").await;
        ctx.trust
            .update_preference("u1", "nickname", serde_json::json!("Mark"))
            .await
            .unwrap();
        let before = ctx
            .trust
            .get_relationship("u1")
            .await
            .unwrap()
            .relationship
            .updated_at;

        let handler = PreferenceExtractionHandler { ctx: ctx.clone() };
        handler
            .handle(serde_json::json!({"user_id": "u1", "session_id": "s1"}))
            .await
            .unwrap();

        let after = ctx
            .trust
            .get_relationship("u1")
            .await
            .unwrap()
            .relationship
            .updated_at;
        assert_eq!(before, after, "unchanged preference must not rewrite the row");
    }

    #[tokio::test]
    async fn gossip_dispatch_writes_only_to_trusted_bots() {
        let ctx = ctx("{}");
        // Trust: marcus at 25 (eligible), dotty at 5 (not).
        let marcus = whisperengine_trust::TrustManager::new("marcus", ctx.relationship_store.clone());
        marcus.update_trust("u1", 25).await.unwrap();
        let dotty = whisperengine_trust::TrustManager::new("dotty", ctx.relationship_store.clone());
        dotty.update_trust("u1", 5).await.unwrap();

        let event = UniverseEvent::new(
            EventType::UserUpdate,
            "u1",
            "elena",
            "has news about their career",
            "career",
        );
        let handler = GossipDispatchHandler { ctx: ctx.clone() };
        handler.handle(serde_json::to_value(&event).unwrap()).await.unwrap();

        let marcus_store = ctx.memory_factory.store_for("marcus").await.unwrap();
        let received = marcus_store
            .search_memories_with_qdrant_intelligence(
                "u1",
                "career news",
                Some(vec![MemoryType::Gossip]),
                5,
            )
            .await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].entry.propagation_depth, Some(1));

        let dotty_store = ctx.memory_factory.store_for("dotty").await.unwrap();
        let leaked = dotty_store
            .search_memories_with_qdrant_intelligence(
                "u1",
                "career news",
                Some(vec![MemoryType::Gossip]),
                5,
            )
            .await;
        assert!(leaked.is_empty(), "below-threshold bot must receive nothing");
    }

    #[tokio::test]
    async fn reverie_writes_a_self_reflection() {
        let ctx = ctx(
            r#"{"learning_insight":"quiet days are for reading","improvement_suggestion":"ask more questions","dominant_trait":"curious"}"#,
        );
        let handler = ReverieHandler { ctx: ctx.clone() };
        handler.handle(serde_json::json!({"bot_name": "elena"})).await.unwrap();

        let insights = ctx.self_memory.recent_insights(5).await;
        assert_eq!(insights.len(), 1);
        assert!(insights[0].entry.content.contains("quiet days"));
    }

    #[tokio::test]
    async fn enrichment_promotes_repeated_entities() {
        let ctx = ctx("{}");
        seed_session(&ctx, "s1").await;
        let handler = GraphEnrichmentHandler { ctx: ctx.clone() };
        handler
            .handle(serde_json::json!({"user_id": "u1", "session_id": "s1"}))
            .await
            .unwrap();

        let facts = ctx
            .memory
            .search_memories_with_qdrant_intelligence(
                "u1",
                "Biscuit",
                Some(vec![MemoryType::Fact]),
                5,
            )
            .await;
        assert!(
            facts.iter().any(|f| f.entry.content.contains("Biscuit")),
            "repeated entity should become a fact"
        );
    }
}
