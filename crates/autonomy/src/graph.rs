//! The daily-life remote brain: a pure three-stage pipeline
//! perceive → plan → execute over one sensory snapshot.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use whisperengine_config::{AutonomyConfig, CharacterProfile};
use whisperengine_embedding::{Embedder, dot};
use whisperengine_llm::{ChatMessage, ChatOptions, ChatProvider, extract_json_output};
use whisperengine_memory::{MemoryStore, MemoryType};
use whisperengine_messaging::{ActionCommand, ActionType, ContextMessage, MessageSnapshot};
use whisperengine_trust::TrustManager;

use crate::models::{
    PERCEIVE_TOP_K, PERCEIVE_WINDOW_MINUTES, PlanIntent, PlannedAction, QUIET_POST_PROBABILITY,
    RELEVANCE_THRESHOLD, ScoredMessage, SensorySnapshot,
};

/// How much channel history a generated reply sees.
const REPLY_HISTORY: usize = 10;

/// The main response pipeline, as seen from the daily-life graph.  Replies
/// generated autonomously go through the same engine as direct messages.
#[async_trait]
pub trait ResponseEngine: Send + Sync {
    async fn respond(&self, request: ResponseRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ResponseRequest {
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub channel_id: String,
    /// Oldest-first channel context preceding the target message.
    pub chat_history: Vec<MessageSnapshot>,
    /// Why the bot decided to reply, injected as an internal context note.
    pub internal_goal: Option<String>,
}

pub struct GraphDeps {
    pub bot_name: String,
    pub flags: AutonomyConfig,
    pub character: CharacterProfile,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn ChatProvider>,
    pub planner_model: String,
    pub creative_model: String,
    pub trust: Arc<TrustManager>,
    pub memory: Arc<MemoryStore>,
    pub responder: Arc<dyn ResponseEngine>,
}

pub struct DailyLifeGraph {
    deps: GraphDeps,
    post_probability: f64,
    rng: Mutex<StdRng>,
}

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    actions: Vec<PlannerAction>,
}

#[derive(Debug, Deserialize)]
struct PlannerAction {
    intent: String,
    #[serde(default)]
    target_message_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    reasoning: String,
}

impl DailyLifeGraph {
    pub fn new(deps: GraphDeps) -> Self {
        Self {
            deps,
            post_probability: QUIET_POST_PROBABILITY,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic variant: fixed RNG seed and post probability.
    pub fn with_determinism(deps: GraphDeps, seed: u64, post_probability: f64) -> Self {
        Self {
            deps,
            post_probability,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Full pipeline; the only public entry point for workers.
    pub async fn run(&self, snapshot: &SensorySnapshot) -> Vec<ActionCommand> {
        let scored = self.perceive(snapshot).await;
        let plans = self.plan(snapshot, &scored).await;
        self.execute(snapshot, &plans).await
    }

    // ── perceive ───────────────────────────────────────────────────────────

    /// Score snapshot messages against the character's interests.  Own
    /// messages, stale messages, and direct mentions (handled on the hot
    /// path) are skipped.
    pub async fn perceive(&self, snapshot: &SensorySnapshot) -> Vec<ScoredMessage> {
        if !self.deps.flags.enable_channel_lurking {
            return Vec::new();
        }

        let bot_name = self.deps.bot_name.to_lowercase();
        let cutoff = Utc::now() - Duration::minutes(PERCEIVE_WINDOW_MINUTES);

        let candidates: Vec<&MessageSnapshot> = snapshot
            .channels
            .iter()
            .flat_map(|ch| ch.messages.iter())
            .filter(|m| m.author_name.to_lowercase() != bot_name)
            .filter(|m| !m.is_bot || self.deps.flags.enable_bot_conversations)
            .filter(|m| m.created_at >= cutoff)
            .filter(|m| !m.mentions_bot)
            .filter(|m| !m.content.trim().is_empty())
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        let interests = self.deps.character.interests_or_default();
        let interest_vecs = match self.deps.embedder.embed(&interests).await {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "interest embedding failed; skipping perceive pass");
                return Vec::new();
            }
        };

        let texts: Vec<String> = candidates.iter().map(|m| m.content.clone()).collect();
        let message_vecs = match self.deps.embedder.embed(&texts).await {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "message embedding failed; skipping perceive pass");
                return Vec::new();
            }
        };

        let mut scored: Vec<ScoredMessage> = candidates
            .iter()
            .zip(message_vecs.iter())
            .filter_map(|(message, vec)| {
                let best = interest_vecs
                    .iter()
                    .map(|iv| dot(vec, iv))
                    .fold(f32::MIN, f32::max);
                if best > RELEVANCE_THRESHOLD {
                    Some(ScoredMessage {
                        message: (*message).clone(),
                        score: best,
                        relevance_reason: format!("interest_match ({best:.2})"),
                    })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(PERCEIVE_TOP_K);
        scored
    }

    // ── plan ───────────────────────────────────────────────────────────────

    /// Decide among reply / react / ignore for scored messages, and whether
    /// to post proactively into a quiet eligible channel.
    pub async fn plan(
        &self,
        snapshot: &SensorySnapshot,
        scored: &[ScoredMessage],
    ) -> Vec<PlannedAction> {
        let mut actions = Vec::new();

        let can_reply = self.deps.flags.enable_autonomous_replies;
        let can_react = self.deps.flags.enable_autonomous_reactions;

        if !scored.is_empty() && (can_reply || can_react) {
            match self.plan_reactive(scored, can_reply, can_react).await {
                Ok(mut reactive) => actions.append(&mut reactive),
                Err(err) => warn!(%err, "reactive planning failed"),
            }
        }

        // Proactive posting only when nothing reactive was chosen.
        if self.deps.flags.enable_autonomous_posting && actions.is_empty() {
            if let Some(post) = self.plan_quiet_post(snapshot).await {
                actions.push(post);
            }
        }

        actions
    }

    async fn plan_reactive(
        &self,
        scored: &[ScoredMessage],
        can_reply: bool,
        can_react: bool,
    ) -> Result<Vec<PlannedAction>> {
        let mut context = String::new();
        for sm in scored {
            let msg = &sm.message;

            let trust_line = match self.deps.trust.get_relationship(&msg.author_id).await {
                Ok(view) => format!(
                    "{} (Score: {})",
                    view.level_label, view.relationship.trust_score
                ),
                Err(_) => "Unknown".to_string(),
            };

            let facts = self
                .deps
                .memory
                .search_memories_with_qdrant_intelligence(
                    &msg.author_id,
                    &msg.content,
                    Some(vec![MemoryType::Fact]),
                    3,
                )
                .await;
            let facts_line = if facts.is_empty() {
                String::new()
            } else {
                format!(
                    "\nKnown Facts: {}",
                    facts
                        .iter()
                        .map(|f| f.entry.content.clone())
                        .collect::<Vec<_>>()
                        .join("; ")
                )
            };

            context.push_str(&format!(
                "ID: {}\nChannel: {}\nAuthor: {}\nRelationship: {}{}\nContent: {}\nRelevance: {}\n---\n",
                msg.id, msg.channel_id, msg.author_name, trust_line, facts_line, msg.content,
                sm.relevance_reason
            ));
        }

        let mut instructions = Vec::new();
        if can_reply {
            instructions
                .push("- Reply if the topic is highly relevant and you have something valuable to add.");
        }
        if can_react {
            instructions
                .push("- React with an emoji if you agree/disagree but don't want to interrupt.");
        }
        instructions.push("- Ignore if it's not worth your energy.");

        let prompt = format!(
            "You are {bot}. You are observing a chat stream.\n\
             Here are the messages that caught your attention:\n\n{context}\n\
             Decide if you should respond to any of these.\n{instructions}\n\n\
             Output a JSON list of actions.\nFormat:\n\
             {{\"actions\":[{{\"intent\":\"reply\"|\"react\"|\"ignore\",\
             \"target_message_id\":\"...\",\"channel_id\":\"...\",\"reasoning\":\"...\"}}]}}",
            bot = self.deps.bot_name,
            instructions = instructions.join("\n"),
        );

        let response = self
            .deps
            .llm
            .chat_completion(
                &self.deps.planner_model,
                &[
                    ChatMessage::system("You are a social decision engine. Output JSON only."),
                    ChatMessage::user(prompt),
                ],
                ChatOptions { max_tokens: 512, temperature: 0.4 },
            )
            .await?;

        let Some(parsed) = extract_json_output::<PlannerOutput>(&response.content) else {
            // Malformed planner output: no action beats a broken action.
            debug!("planner output unparseable; ignoring this pass");
            return Ok(Vec::new());
        };

        let mut plans = Vec::new();
        for action in parsed.actions {
            let intent = match action.intent.as_str() {
                // Enforce flags again — the model may ignore instructions.
                "reply" if can_reply => PlanIntent::Reply,
                "react" if can_react => PlanIntent::React,
                "reply" | "react" | "ignore" => continue,
                other => {
                    debug!(intent = other, "planner invented an intent; skipping");
                    continue;
                }
            };

            // Resolve a missing channel from the scored set.
            let channel_id = action.channel_id.or_else(|| {
                action.target_message_id.as_ref().and_then(|id| {
                    scored
                        .iter()
                        .find(|sm| &sm.message.id == id)
                        .map(|sm| sm.message.channel_id.clone())
                })
            });
            let Some(channel_id) = channel_id else { continue };

            plans.push(PlannedAction {
                intent,
                target_message_id: action.target_message_id,
                channel_id,
                reasoning: action.reasoning,
            });
        }
        Ok(plans)
    }

    async fn plan_quiet_post(&self, snapshot: &SensorySnapshot) -> Option<PlannedAction> {
        let targets = &self.deps.flags.posting_channel_ids;
        if targets.is_empty() {
            // No configured posting channels: never post into arbitrary ones.
            return None;
        }

        let cooldown = Duration::minutes(self.deps.flags.autonomous_post_cooldown_minutes);
        let now = Utc::now();

        let quiet: Vec<&crate::models::ChannelSnapshot> = snapshot
            .channels
            .iter()
            .filter(|ch| targets.contains(&ch.channel_id))
            .filter(|ch| {
                ch.messages
                    .iter()
                    .map(|m| m.created_at)
                    .max()
                    .map(|last| now - last > cooldown)
                    .unwrap_or(true)
            })
            .collect();

        if quiet.is_empty() {
            return None;
        }

        let mut rng = self.rng.lock().await;
        let target = quiet[rng.gen_range(0..quiet.len())];
        if rng.gen_bool(self.post_probability) {
            info!(channel = %target.channel_name, "decided to post into quiet channel");
            Some(PlannedAction {
                intent: PlanIntent::Post,
                target_message_id: None,
                channel_id: target.channel_id.clone(),
                reasoning: "Channel is quiet and I have a thought to share.".to_string(),
            })
        } else {
            None
        }
    }

    // ── execute ────────────────────────────────────────────────────────────

    /// Generate content for the planned actions.
    pub async fn execute(
        &self,
        snapshot: &SensorySnapshot,
        plans: &[PlannedAction],
    ) -> Vec<ActionCommand> {
        let mut commands = Vec::new();
        for plan in plans {
            match plan.intent {
                PlanIntent::Ignore => {}
                PlanIntent::React => {
                    if let Some(cmd) = self.execute_react(plan).await {
                        commands.push(cmd);
                    }
                }
                PlanIntent::Reply => {
                    if let Some(cmd) = self.execute_reply(snapshot, plan).await {
                        commands.push(cmd);
                    }
                }
                PlanIntent::Post => {
                    if let Some(cmd) = self.execute_post(plan).await {
                        commands.push(cmd);
                    }
                }
            }
        }
        commands
    }

    async fn execute_react(&self, plan: &PlannedAction) -> Option<ActionCommand> {
        let target = plan.target_message_id.as_ref()?;
        let pool = &self.deps.character.emoji_sets.thinking;
        let emoji = if pool.is_empty() {
            "👀".to_string()
        } else {
            let mut rng = self.rng.lock().await;
            pool[rng.gen_range(0..pool.len())].clone()
        };
        Some(ActionCommand::react(&plan.channel_id, target, emoji))
    }

    async fn execute_reply(
        &self,
        snapshot: &SensorySnapshot,
        plan: &PlannedAction,
    ) -> Option<ActionCommand> {
        let target_id = plan.target_message_id.as_ref()?;
        let (channel, target) = snapshot.find_message(target_id)?;

        // Channel context preceding the target, oldest first.
        let mut sorted: Vec<&MessageSnapshot> = channel.messages.iter().collect();
        sorted.sort_by_key(|m| m.created_at);
        let target_idx = sorted.iter().position(|m| m.id == *target_id)?;
        let start = target_idx.saturating_sub(REPLY_HISTORY);
        let history: Vec<MessageSnapshot> =
            sorted[start..target_idx].iter().map(|m| (*m).clone()).collect();

        let response = self
            .deps
            .responder
            .respond(ResponseRequest {
                user_id: target.author_id.clone(),
                user_name: target.author_name.clone(),
                content: target.content.clone(),
                channel_id: plan.channel_id.clone(),
                chat_history: history.clone(),
                internal_goal: Some(plan.reasoning.clone()),
            })
            .await;

        let content = match response {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => return None,
            Err(err) => {
                warn!(%err, "autonomous reply generation failed");
                return None;
            }
        };

        // Context participants for trust and multi-party learning.
        let mut context_user_ids: Vec<String> = Vec::new();
        let mut context_messages: Vec<ContextMessage> = Vec::new();
        for m in &history {
            if m.author_id != target.author_id && !context_user_ids.contains(&m.author_id) {
                context_user_ids.push(m.author_id.clone());
            }
            context_messages.push(ContextMessage {
                user_id: m.author_id.clone(),
                user_name: m.author_name.clone(),
                content: m.content.clone(),
                is_bot: m.is_bot,
            });
        }

        Some(ActionCommand {
            action_type: ActionType::Reply,
            channel_id: plan.channel_id.clone(),
            target_message_id: Some(target_id.clone()),
            content: Some(content),
            emoji: None,
            target_author_id: Some(target.author_id.clone()),
            target_author_name: Some(target.author_name.clone()),
            target_content: Some(target.content.clone()),
            target_is_bot: target.is_bot,
            context_user_ids,
            context_messages,
        })
    }

    async fn execute_post(&self, plan: &PlannedAction) -> Option<ActionCommand> {
        let interests = self.deps.character.interests_or_default();
        let topic = {
            let mut rng = self.rng.lock().await;
            interests[rng.gen_range(0..interests.len())].clone()
        };

        let mut drives = String::new();
        for (name, description) in &self.deps.character.drives {
            drives.push_str(&format!("- {name}: {description}\n"));
        }

        let prompt = format!(
            "You are posting in a quiet channel.\nTopic: {topic}\nReasoning: {}\n\n\
             Write a short, engaging thought or observation to spark conversation.\n\
             Do not be generic. Be specific to your character.",
            plan.reasoning
        );
        let system = if drives.is_empty() {
            self.deps.character.system_prompt.clone()
        } else {
            format!("{}\n\nCurrent Drives:\n{drives}", self.deps.character.system_prompt)
        };

        let response = self
            .deps
            .llm
            .chat_completion(
                &self.deps.creative_model,
                &[ChatMessage::system(system), ChatMessage::user(prompt)],
                ChatOptions { max_tokens: 256, temperature: 0.8 },
            )
            .await;

        match response {
            Ok(r) if !r.content.trim().is_empty() => {
                Some(ActionCommand::post(&plan.channel_id, r.content))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "proactive post generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelSnapshot;
    use whisperengine_embedding::HashEmbedder;
    use whisperengine_llm::{ChatResponse, LlmError};
    use whisperengine_memory::InMemoryIndex;
    use whisperengine_trust::InMemoryRelationshipStore;

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

    struct StubResponder;

    #[async_trait]
    impl ResponseEngine for StubResponder {
        async fn respond(&self, request: ResponseRequest) -> Result<String> {
            Ok(format!("replying to {}", request.user_name))
        }
    }

    fn deps(flags: AutonomyConfig, llm_reply: &str) -> GraphDeps {
        let mut character = CharacterProfile::default();
        character.name = "elena".to_string();
        character.interests = vec!["ocean reef marine biology".to_string()];
        character.system_prompt = "You are Elena.".to_string();

        GraphDeps {
            bot_name: "elena".to_string(),
            flags,
            character,
            embedder: Arc::new(HashEmbedder),
            llm: Arc::new(StubChat { reply: llm_reply.to_string() }),
            planner_model: "planner".to_string(),
            creative_model: "creative".to_string(),
            trust: Arc::new(TrustManager::new(
                "elena",
                Arc::new(InMemoryRelationshipStore::new()),
            )),
            memory: Arc::new(MemoryStore::new(
                "elena",
                Arc::new(InMemoryIndex::new("whisperengine_memory_elena")),
                Arc::new(HashEmbedder),
                0.7,
            )),
            responder: Arc::new(StubResponder),
        }
    }

    fn message(id: &str, content: &str, age_minutes: i64, is_bot: bool) -> MessageSnapshot {
        MessageSnapshot {
            id: id.to_string(),
            content: content.to_string(),
            author_id: format!("author_{id}"),
            author_name: format!("Author{id}"),
            is_bot,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            mentions_bot: false,
            reference_id: None,
            channel_id: "c1".to_string(),
        }
    }

    fn snapshot(messages: Vec<MessageSnapshot>) -> SensorySnapshot {
        SensorySnapshot {
            bot_name: "elena".to_string(),
            timestamp: Utc::now(),
            channels: vec![ChannelSnapshot {
                channel_id: "c1".to_string(),
                channel_name: "general".to_string(),
                messages,
            }],
            watch_channels: vec!["c1".to_string()],
            mentions: Vec::new(),
        }
    }

    fn lurking_flags() -> AutonomyConfig {
        AutonomyConfig {
            enable_autonomous_activity: true,
            enable_channel_lurking: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn perceive_scores_interest_matches() {
        let graph = DailyLifeGraph::new(deps(lurking_flags(), ""));
        let snap = snapshot(vec![
            message("m1", "the coral reef ocean marine biology survey was amazing", 2, false),
            message("m2", "anyone know a good tax accountant", 2, false),
        ]);
        let scored = graph.perceive(&snap).await;
        assert!(!scored.is_empty());
        assert_eq!(scored[0].message.id, "m1");
        assert!(scored.iter().all(|s| s.message.id != "m2"));
    }

    #[tokio::test]
    async fn perceive_skips_stale_and_mention_messages() {
        let graph = DailyLifeGraph::new(deps(lurking_flags(), ""));
        let mut mentioned = message("m2", "ocean reef marine biology talk", 2, false);
        mentioned.mentions_bot = true;
        let snap = snapshot(vec![
            message("m1", "ocean reef marine biology talk", 60, false),
            mentioned,
        ]);
        assert!(graph.perceive(&snap).await.is_empty());
    }

    #[tokio::test]
    async fn perceive_skips_bots_unless_enabled() {
        let graph = DailyLifeGraph::new(deps(lurking_flags(), ""));
        let snap = snapshot(vec![message("m1", "ocean reef marine biology chat", 2, true)]);
        assert!(graph.perceive(&snap).await.is_empty());

        let mut flags = lurking_flags();
        flags.enable_bot_conversations = true;
        let graph = DailyLifeGraph::new(deps(flags, ""));
        let snap = snapshot(vec![message("m1", "ocean reef marine biology chat", 2, true)]);
        assert!(!graph.perceive(&snap).await.is_empty());
    }

    #[tokio::test]
    async fn lurking_disabled_yields_no_perception() {
        let mut flags = lurking_flags();
        flags.enable_channel_lurking = false;
        let graph = DailyLifeGraph::new(deps(flags, ""));
        let snap = snapshot(vec![message("m1", "ocean reef marine biology", 1, false)]);
        assert!(graph.perceive(&snap).await.is_empty());
    }

    #[tokio::test]
    async fn planner_flags_are_enforced_post_parse() {
        // Planner proposes a reply, but replies are disabled → dropped.
        let mut flags = lurking_flags();
        flags.enable_autonomous_reactions = true;
        flags.enable_autonomous_replies = false;
        let planner_json = r#"{"actions":[{"intent":"reply","target_message_id":"m1","channel_id":"c1","reasoning":"r"}]}"#;
        let graph = DailyLifeGraph::new(deps(flags, planner_json));

        let snap = snapshot(vec![message("m1", "ocean reef marine biology survey", 2, false)]);
        let scored = graph.perceive(&snap).await;
        let plans = graph.plan(&snap, &scored).await;
        assert!(plans.is_empty());
    }

    #[tokio::test]
    async fn malformed_planner_output_aborts_quietly() {
        let mut flags = lurking_flags();
        flags.enable_autonomous_replies = true;
        let graph = DailyLifeGraph::new(deps(flags, "I think I should reply to everyone!"));
        let snap = snapshot(vec![message("m1", "ocean reef marine biology survey", 2, false)]);
        let scored = graph.perceive(&snap).await;
        let plans = graph.plan(&snap, &scored).await;
        assert!(plans.is_empty(), "no reply beats a broken reply");
    }

    #[tokio::test]
    async fn quiet_channel_post_end_to_end() {
        let mut flags = lurking_flags();
        flags.enable_autonomous_posting = true;
        flags.posting_channel_ids = vec!["c1".to_string()];
        flags.autonomous_post_cooldown_minutes = 10;

        let graph = DailyLifeGraph::with_determinism(
            deps(flags, "A thought about tide pools to share."),
            7,
            1.0, // dice always succeeds
        );

        // Last message is 20 minutes old — past the 10-minute cooldown.
        let snap = snapshot(vec![message("m1", "old chatter", 20, false)]);
        let plans = graph.plan(&snap, &[]).await;
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].intent, PlanIntent::Post);
        assert_eq!(plans[0].channel_id, "c1");

        let commands = graph.execute(&snap, &plans).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action_type, ActionType::Post);
        assert_eq!(commands[0].channel_id, "c1");
        assert!(!commands[0].content.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn active_channel_blocks_posting() {
        let mut flags = lurking_flags();
        flags.enable_autonomous_posting = true;
        flags.posting_channel_ids = vec!["c1".to_string()];

        let graph = DailyLifeGraph::with_determinism(deps(flags, "post"), 7, 1.0);
        // Last message 2 minutes ago — inside the cooldown.
        let snap = snapshot(vec![message("m1", "recent chatter", 2, false)]);
        assert!(graph.plan(&snap, &[]).await.is_empty());
    }

    #[tokio::test]
    async fn failed_dice_roll_stays_silent() {
        let mut flags = lurking_flags();
        flags.enable_autonomous_posting = true;
        flags.posting_channel_ids = vec!["c1".to_string()];

        let graph = DailyLifeGraph::with_determinism(deps(flags, "post"), 7, 0.0);
        let snap = snapshot(vec![message("m1", "old chatter", 30, false)]);
        assert!(graph.plan(&snap, &[]).await.is_empty());
    }

    #[tokio::test]
    async fn reply_execution_carries_attribution_fields() {
        let flags = lurking_flags();
        let graph = DailyLifeGraph::new(deps(flags, ""));
        let snap = snapshot(vec![
            message("m0", "earlier context from someone else", 5, false),
            message("m1", "the reef question", 2, false),
        ]);

        let plan = PlannedAction {
            intent: PlanIntent::Reply,
            target_message_id: Some("m1".to_string()),
            channel_id: "c1".to_string(),
            reasoning: "relevant topic".to_string(),
        };
        let commands = graph.execute(&snap, &[plan]).await;
        assert_eq!(commands.len(), 1);
        let cmd = &commands[0];
        assert_eq!(cmd.action_type, ActionType::Reply);
        assert_eq!(cmd.target_author_id.as_deref(), Some("author_m1"));
        assert_eq!(cmd.target_content.as_deref(), Some("the reef question"));
        assert!(cmd.context_user_ids.contains(&"author_m0".to_string()));
        assert!(cmd.content.as_deref().unwrap().contains("Authorm1"));
    }

    #[tokio::test]
    async fn react_execution_emits_emoji_only() {
        let graph = DailyLifeGraph::new(deps(lurking_flags(), ""));
        let snap = snapshot(vec![message("m1", "something", 1, false)]);
        let plan = PlannedAction {
            intent: PlanIntent::React,
            target_message_id: Some("m1".to_string()),
            channel_id: "c1".to_string(),
            reasoning: String::new(),
        };
        let commands = graph.execute(&snap, &[plan]).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action_type, ActionType::React);
        assert!(commands[0].emoji.is_some());
        assert!(commands[0].content.is_none(), "reactions carry no text");
    }
}
