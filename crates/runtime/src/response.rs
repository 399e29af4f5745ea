//! The response hot path: gatekeeping, scatter-gather context assembly,
//! generation, delivery, and the post-response bookkeeping fan-out.
//!
//! No error class escapes this path — every failure maps to a character
//! error line or a silent degrade.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use whisperengine_autonomy::{ReactionAgent, ResponseEngine, ResponseRequest};
use whisperengine_llm::{ChatMessage, ChatOptions};
use whisperengine_memory::{
    ConversationMetadata, FidelityOptions, MemoryType, SessionTurn,
};
use whisperengine_messaging::{
    InboundMessage, IngressVerdict, MAX_CHUNK, MessagingAdapter, chunk_message,
};
use whisperengine_trust::TrustEvent;
use whisperengine_universe::detect_event;

use crate::context::RuntimeContext;
use crate::moderation::{cold_response, error_response};
use crate::post_conversation::{
    MIN_SESSION_MESSAGES, enqueue_graph_enrichment, enqueue_post_conversation_tasks,
};
use crate::prompt::{ContextBundle, build_system_prompt, history_as_lines};

const DM_BLOCK_NOTICE: &str = "For privacy reasons, I do not accept direct messages. \
Please talk to me in a server channel instead.";

pub struct Responder {
    ctx: Arc<RuntimeContext>,
    adapter: Arc<dyn MessagingAdapter>,
    reactions: Option<Arc<ReactionAgent>>,
}

impl Responder {
    pub fn new(
        ctx: Arc<RuntimeContext>,
        adapter: Arc<dyn MessagingAdapter>,
        reactions: Option<Arc<ReactionAgent>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            adapter,
            reactions,
        })
    }

    /// Handle one inbound message end-to-end.  Never returns an error for
    /// content-level problems; the `Err` variant is reserved for adapter
    /// failures the gateway may want to retry.
    pub async fn handle_inbound(&self, message: InboundMessage) -> Result<()> {
        // Other bots' messages only matter when bot conversations are on.
        if message.author_is_bot && !self.ctx.config.autonomy.enable_bot_conversations {
            return Ok(());
        }

        match self.ctx.ingress.check(&message) {
            IngressVerdict::Accept => {}
            IngressVerdict::Drop(reason) => {
                debug!(reason, author = %message.author_id, "inbound dropped");
                return Ok(());
            }
            IngressVerdict::Invalid(reply) => {
                self.send_chunks(&message.channel_id, reply, Some(&message.id))
                    .await?;
                return Ok(());
            }
            IngressVerdict::DmBlocked => {
                info!(author = %message.author_id, "DM blocked");
                self.send_chunks(&message.channel_id, DM_BLOCK_NOTICE, Some(&message.id))
                    .await?;
                return Ok(());
            }
        }

        if self.ctx.config.privacy.enable_crosspost_detection && !message.is_dm {
            let verdict = self
                .ctx
                .crosspost
                .check(&message.author_id, &message.channel_id, &message.content, Utc::now())
                .await;
            if verdict.is_spam {
                if verdict.should_warn {
                    let warning = "Please don't cross-post the same message across channels.";
                    let _ = self
                        .send_chunks(&message.channel_id, warning, Some(&message.id))
                        .await;
                }
                return Ok(());
            }
        }

        self.ctx
            .activity
            .record_message(&message.channel_id, message.created_at)
            .await;

        // Moderation timeout: scripted cold line, no memory of it.
        if self
            .ctx
            .moderation
            .is_timed_out(&message.author_id, Utc::now())
            .await
        {
            let line = cold_response(&self.ctx.character);
            self.send_chunks(&message.channel_id, &line, Some(&message.id))
                .await?;
            return Ok(());
        }

        let session = self
            .ctx
            .sessions
            .observe_turn(&message.author_id, Utc::now())
            .await;

        // Context is gathered before the store on purpose: a request must
        // never retrieve its own turn as a memory.
        let bundle = self
            .gather_context(&message.author_id, &message.content, None)
            .await;

        let response = match self
            .generate(&message.author_id, &message.author_name, &message.content, &bundle)
            .await
        {
            Some(response) => response,
            None => {
                let line = error_response(&self.ctx.character);
                self.send_chunks(&message.channel_id, &line, Some(&message.id))
                    .await?;
                return Ok(());
            }
        };

        // Attach any pending generated artifacts to this reply.
        let artifacts = self.ctx.artifacts.pop_all(&message.author_id).await;
        if !artifacts.is_empty() {
            let files: Vec<(String, String)> = artifacts
                .into_iter()
                .map(|a| (a.path, a.filename))
                .collect();
            if let Err(err) = self
                .adapter
                .send_attachments(&message.channel_id, &files)
                .await
            {
                warn!(%err, "artifact attachment failed");
            }
        }

        self.send_chunks(&message.channel_id, &response, Some(&message.id))
            .await?;

        self.after_response(&message, &session, &response).await;

        // Reactions run independently of the response itself.
        if let Some(reactions) = &self.reactions {
            if self.ctx.config.autonomy.enable_autonomous_reactions && !message.is_dm {
                let reactions = reactions.clone();
                let adapter = self.adapter.clone();
                let msg = message.clone();
                tokio::spawn(async move {
                    let decision = reactions
                        .decide(&msg.content, &msg.author_id, msg.author_is_bot, &msg.channel_id, false)
                        .await;
                    if decision.should_react {
                        tokio::time::sleep(std::time::Duration::from_secs_f64(
                            decision.delay_seconds,
                        ))
                        .await;
                        for emoji in &decision.emojis {
                            if adapter
                                .add_reaction(&msg.channel_id, &msg.id, emoji)
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        reactions.record(&msg.channel_id, &msg.author_id).await;
                    }
                });
            }
        }

        Ok(())
    }

    /// Post-response bookkeeping: memory write, trust, universe detection,
    /// and the session pipeline check.  All best-effort.
    async fn after_response(&self, message: &InboundMessage, session: &SessionTurn, response: &str) {
        let metadata = ConversationMetadata {
            session_id: Some(session.session_id.clone()),
            message_id: Some(message.id.clone()),
            author_id: Some(message.author_id.clone()),
            author_is_bot: message.author_is_bot,
            author_name: Some(message.author_name.clone()),
            reply_to_msg_id: message.reference.as_ref().map(|r| r.message_id.clone()),
            user_name: Some(message.author_name.clone()),
            ..Default::default()
        };
        if let Err(err) = self
            .ctx
            .memory
            .store_conversation(
                &message.author_id,
                &message.content,
                response,
                Some(&message.channel_id),
                None,
                Some(metadata),
            )
            .await
        {
            warn!(%err, "conversation store failed (non-blocking)");
        }

        match self
            .ctx
            .trust
            .apply_event(&message.author_id, TrustEvent::PositiveTurn, false)
            .await
        {
            Ok(Some(milestone)) => {
                let _ = self
                    .send_chunks(&message.channel_id, &milestone, None)
                    .await;
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "trust update failed"),
        }

        if self.ctx.config.universe.enable_universe_events {
            if let Some(event) =
                detect_event(&message.author_id, &message.content, self.ctx.bot_name())
            {
                let outcome = self.ctx.universe.publish(event).await;
                debug!(?outcome, "universe detection outcome");
            }
        }

        self.check_and_summarize(
            &session.session_id,
            session.started_at,
            &message.author_id,
            &message.author_name,
            Some(&message.channel_id),
            message.guild_id.as_deref(),
        )
        .await;
    }

    /// Enqueue the post-conversation pipeline once the session has enough
    /// material.  Idempotency comes from deterministic job ids.
    pub async fn check_and_summarize(
        &self,
        session_id: &str,
        session_started: chrono::DateTime<Utc>,
        user_id: &str,
        user_name: &str,
        channel_id: Option<&str>,
        server_id: Option<&str>,
    ) {
        let count = self
            .ctx
            .memory
            .count_messages_since(user_id, session_started)
            .await;

        if count >= self.ctx.config.session.enrichment_min_messages {
            enqueue_graph_enrichment(
                &self.ctx.queue,
                session_id,
                user_id,
                channel_id,
                server_id,
                self.ctx.bot_name(),
            )
            .await;
        }

        if count >= MIN_SESSION_MESSAGES {
            enqueue_post_conversation_tasks(
                &self.ctx.queue,
                user_id,
                self.ctx.bot_name(),
                session_id,
                user_name,
                "session_activity",
            )
            .await;
        }
    }

    /// Six-way scatter-gather.  Every branch degrades to empty on failure;
    /// the response is generated only after all branches settle.
    async fn gather_context(
        &self,
        user_id: &str,
        query: &str,
        internal_goal: Option<String>,
    ) -> ContextBundle {
        let memories = self.ctx.memory.retrieve_relevant_memories_fidelity_first(
            user_id,
            query,
            FidelityOptions {
                limit: 8,
                ..Default::default()
            },
        );
        let history = self.ctx.memory.get_conversation_history(user_id, 10);
        let knowledge = self.ctx.memory.search_memories_with_qdrant_intelligence(
            user_id,
            query,
            Some(vec![MemoryType::Fact]),
            5,
        );
        let summaries = self.ctx.memory.search_memories_with_qdrant_intelligence(
            user_id,
            query,
            Some(vec![MemoryType::Summary]),
            3,
        );
        let gossip = self.ctx.memory.search_memories_with_qdrant_intelligence(
            user_id,
            query,
            Some(vec![MemoryType::Gossip]),
            2,
        );
        let nickname = self.ctx.trust.preferred_nickname(user_id);

        let (memories, history, knowledge, summaries, gossip, nickname) =
            tokio::join!(memories, history, knowledge, summaries, gossip, nickname);

        ContextBundle {
            memories,
            history,
            knowledge_facts: knowledge.into_iter().map(|f| f.entry.content).collect(),
            summaries: summaries.into_iter().map(|s| s.entry.content).collect(),
            universe_context: gossip.into_iter().map(|g| g.entry.content).collect(),
            preferred_nickname: nickname,
            internal_goal,
        }
    }

    /// One LLM round trip.  `None` means the caller should fall back to a
    /// character error line.
    async fn generate(
        &self,
        _user_id: &str,
        user_name: &str,
        content: &str,
        bundle: &ContextBundle,
    ) -> Option<String> {
        let system = build_system_prompt(&self.ctx.character, user_name, bundle);

        let mut messages = vec![ChatMessage::system(system)];
        for (is_bot, line) in history_as_lines(&bundle.history, self.ctx.bot_name()) {
            if is_bot {
                messages.push(ChatMessage::assistant(line));
            } else {
                messages.push(ChatMessage::user(line));
            }
        }
        messages.push(ChatMessage::user(content));

        match self
            .ctx
            .llm
            .chat_completion(&self.ctx.config.llm.model, &messages, ChatOptions::default())
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "generation failed");
                None
            }
        }
    }

    async fn send_chunks(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<()> {
        for (i, chunk) in chunk_message(content, MAX_CHUNK).into_iter().enumerate() {
            let reference = if i == 0 { reply_to } else { None };
            self.adapter
                .send_message(channel_id, &chunk, reference)
                .await?;
        }
        Ok(())
    }
}

/// The daily-life graph funnels autonomous replies through the same engine
/// as direct messages.
#[async_trait]
impl ResponseEngine for Responder {
    async fn respond(&self, request: ResponseRequest) -> Result<String> {
        let bundle = self
            .gather_context(&request.user_id, &request.content, request.internal_goal.clone())
            .await;

        let system = build_system_prompt(&self.ctx.character, &request.user_name, &bundle);
        let mut messages = vec![ChatMessage::system(system)];
        for snapshot in &request.chat_history {
            let line = format!("{}: {}", snapshot.author_name, snapshot.content);
            if snapshot.author_name.eq_ignore_ascii_case(self.ctx.bot_name()) {
                messages.push(ChatMessage::assistant(line));
            } else {
                messages.push(ChatMessage::user(line));
            }
        }
        messages.push(ChatMessage::user(request.content.clone()));

        let response = self
            .ctx
            .llm
            .chat_completion(&self.ctx.config.llm.model, &messages, ChatOptions::default())
            .await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use whisperengine_config::{AppConfig, CharacterProfile};
    use whisperengine_llm::{ChatProvider, ChatResponse, LlmError};
    use whisperengine_memory::MemoryRole;
    use whisperengine_messaging::{AdapterError, ChannelInfo, MessageSnapshot};
    use whisperengine_queue::QueueName;

    struct StubChat {
        reply: Option<String>,
    }

    #[async_trait]
    impl ChatProvider for StubChat {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            match &self.reply {
                Some(reply) => Ok(ChatResponse {
                    content: reply.clone(),
                    tool_calls: vec![],
                    finish_reason: "stop".to_string(),
                }),
                None => Err(LlmError::Timeout),
            }
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

    #[derive(Default)]
    struct RecordingAdapter {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingAdapter for RecordingAdapter {
        async fn send_message(
            &self,
            channel_id: &str,
            content: &str,
            _reply_to: Option<&str>,
        ) -> Result<String, AdapterError> {
            let mut sent = self.sent.lock().await;
            sent.push((channel_id.to_string(), content.to_string()));
            Ok(format!("sent_{}", sent.len()))
        }
        async fn edit_message(&self, _c: &str, _m: &str, _t: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn add_reaction(&self, _c: &str, _m: &str, _e: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn fetch_recent_messages(
            &self,
            _c: &str,
            _l: usize,
        ) -> Result<Vec<MessageSnapshot>, AdapterError> {
            Ok(Vec::new())
        }
        async fn list_channels(&self) -> Result<Vec<ChannelInfo>, AdapterError> {
            Ok(Vec::new())
        }
        async fn trigger_typing(&self, _c: &str) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    struct Fixture {
        responder: Arc<Responder>,
        ctx: Arc<RuntimeContext>,
        adapter: Arc<RecordingAdapter>,
    }

    fn fixture_with(reply: Option<&str>, configure: impl FnOnce(&mut AppConfig)) -> Fixture {
        let mut config = AppConfig::default();
        config.bot.name = "elena".to_string();
        config.embedding.model_name = "test-embed".to_string();
        config.llm.model = "test-model".to_string();
        configure(&mut config);

        let mut character = CharacterProfile::default();
        character.name = "elena".to_string();
        character.system_prompt = "You are Elena.".to_string();

        let ctx = RuntimeContext::in_memory(
            config,
            character,
            Arc::new(StubChat { reply: reply.map(str::to_string) }),
        );
        let adapter = Arc::new(RecordingAdapter::default());
        let responder = Responder::new(ctx.clone(), adapter.clone(), None);
        Fixture { responder, ctx, adapter }
    }

    fn fixture(reply: Option<&str>) -> Fixture {
        fixture_with(reply, |_| {})
    }

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage {
            id: uuid::Uuid::new_v4().to_string(),
            author_id: "u1".to_string(),
            author_is_bot: false,
            author_name: "Mark".to_string(),
            content: content.to_string(),
            channel_id: "c1".to_string(),
            guild_id: Some("g1".to_string()),
            is_dm: false,
            mentions: Vec::new(),
            mentions_bot: true,
            reference: None,
            attachments: Vec::new(),
            stickers: Vec::new(),
            forwards: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn responds_and_stores_both_turns() {
        let f = fixture(Some("lovely to hear from you"));
        f.responder.handle_inbound(inbound("hello there")).await.unwrap();

        let sent = f.adapter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "lovely to hear from you");
        drop(sent);

        let history = f.ctx.memory.get_conversation_history("u1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MemoryRole::User);
        assert_eq!(history[0].content, "hello there");
        assert_eq!(history[1].role, MemoryRole::Bot);
        assert!(history[0].session_id.is_some());
    }

    #[tokio::test]
    async fn positive_turn_bumps_trust() {
        let f = fixture(Some("hi"));
        f.responder.handle_inbound(inbound("hello")).await.unwrap();
        let view = f.ctx.trust.get_relationship("u1").await.unwrap();
        assert_eq!(view.relationship.trust_score, 1);
    }

    #[tokio::test]
    async fn milestone_message_is_sent_on_stage_crossing() {
        let f = fixture(Some("hi"));
        f.ctx.trust.update_trust("u1", 19).await.unwrap();
        f.responder.handle_inbound(inbound("hello")).await.unwrap();

        let sent = f.adapter.sent.lock().await;
        assert_eq!(sent.len(), 2, "response plus milestone");
        let view = f.ctx.trust.get_relationship("u1").await.unwrap();
        assert_eq!(view.relationship.trust_score, 20);
        assert_eq!(view.level, 2);
    }

    #[tokio::test]
    async fn moderation_timeout_sends_cold_line_without_memory() {
        let f = fixture(Some("warm reply"));
        f.ctx
            .moderation
            .set_timeout("u1", Utc::now() + chrono::Duration::minutes(10))
            .await;
        f.responder.handle_inbound(inbound("hello?")).await.unwrap();

        let sent = f.adapter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_ne!(sent[0].1, "warm reply");
        drop(sent);

        assert!(f.ctx.memory.get_conversation_history("u1", 10).await.is_empty());
        let view = f.ctx.trust.get_relationship("u1").await.unwrap();
        assert_eq!(view.relationship.trust_score, 0, "no positive delta in timeout");
    }

    #[tokio::test]
    async fn blocked_user_is_silently_dropped() {
        let f = fixture_with(Some("hi"), |config| {
            config.privacy.blocked_user_ids = vec!["u1".to_string()];
        });
        f.responder.handle_inbound(inbound("hello")).await.unwrap();
        assert!(f.adapter.sent.lock().await.is_empty());
        assert!(f.ctx.memory.get_conversation_history("u1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn oversized_message_gets_short_error_and_no_generation() {
        let f = fixture(Some("should not appear"));
        f.responder
            .handle_inbound(inbound(&"x".repeat(2001)))
            .await
            .unwrap();

        let sent = f.adapter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("too long"));
        drop(sent);
        assert!(f.ctx.memory.get_conversation_history("u1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_maps_to_character_error_line() {
        let f = fixture(None);
        f.responder.handle_inbound(inbound("hello")).await.unwrap();

        let sent = f.adapter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("trouble processing"));
        drop(sent);
        // A failed generation stores nothing.
        assert!(f.ctx.memory.get_conversation_history("u1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn session_pipeline_enqueued_once_for_active_session() {
        let f = fixture(Some("reply"));
        for i in 0..3 {
            f.responder
                .handle_inbound(inbound(&format!("message number {i}")))
                .await
                .unwrap();
        }

        let mut summarize_jobs = 0;
        while let Some(job) = f.ctx.queue.pop(QueueName::Cognition).await.unwrap() {
            if job.task == "run_summarization" {
                summarize_jobs += 1;
            }
        }
        assert_eq!(summarize_jobs, 1, "one summarize job per session");
    }

    #[tokio::test]
    async fn sensitive_gossip_is_blocked_with_metric() {
        let f = fixture_with(Some("I'm here for you"), |config| {
            config.universe.enable_universe_events = true;
        });

        f.responder
            .handle_inbound(inbound("I just got diagnosed with something serious."))
            .await
            .unwrap();

        assert_eq!(
            f.ctx.universe_metrics.blocked_count("sensitive_topic").await,
            1
        );
        // No gossip dispatch job reached the social queue.
        assert!(f.ctx.queue.pop(QueueName::Social).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn benign_life_update_publishes_gossip_job() {
        let f = fixture_with(Some("congratulations!"), |config| {
            config.universe.enable_universe_events = true;
        });

        f.responder
            .handle_inbound(inbound("guess what, I got a new job today!"))
            .await
            .unwrap();

        let job = f.ctx.queue.pop(QueueName::Social).await.unwrap().unwrap();
        assert_eq!(job.task, "run_gossip_dispatch");
    }

    #[tokio::test]
    async fn retrieval_runs_before_store_so_no_echo() {
        let f = fixture(Some("reply"));
        let marker = format!("completely unique marker {}", uuid::Uuid::new_v4());

        // First message: nothing retrievable yet.
        f.responder.handle_inbound(inbound(&marker)).await.unwrap();
        // But after the request, the turn is stored.
        let results = f.ctx.memory.retrieve_relevant_memories("u1", &marker, 5).await;
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn autonomous_respond_uses_internal_goal() {
        let f = fixture(Some("an in-character reply"));
        let text = f
            .responder
            .respond(ResponseRequest {
                user_id: "u9".to_string(),
                user_name: "Other".to_string(),
                content: "what do you think?".to_string(),
                channel_id: "c1".to_string(),
                chat_history: Vec::new(),
                internal_goal: Some("the topic is relevant".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(text, "an in-character reply");
    }
}
