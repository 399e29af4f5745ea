//! Action poller: drains `pending_actions:<bot>` and executes one command
//! per second against the messaging adapter.
//!
//! Replies are full interactions: both sides are written to memory, trust
//! moves for everyone involved, and per-participant learning is enqueued
//! with each fact attributed to that participant's own user id.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use whisperengine_memory::{ConversationMetadata, MemoryRole, MemoryStore};
use whisperengine_messaging::{
    ActionCommand, ActionType, MessagingAdapter, chunk_message, MAX_CHUNK,
};
use whisperengine_queue::{Broker, KeyLayout, QueueName, TaskQueue};
use whisperengine_trust::{TrustEvent, TrustManager};

/// Pause between executed commands, for platform rate limits.
const ACTION_PACING: StdDuration = StdDuration::from_secs(1);
/// Idle wait when the action list is empty.
const IDLE_POLL: StdDuration = StdDuration::from_secs(5);

pub struct ActionPoller {
    bot_name: String,
    adapter: Arc<dyn MessagingAdapter>,
    broker: Arc<dyn Broker>,
    keys: KeyLayout,
    memory: Arc<MemoryStore>,
    trust: Arc<TrustManager>,
    queue: Arc<TaskQueue>,
}

impl ActionPoller {
    pub fn new(
        bot_name: impl Into<String>,
        adapter: Arc<dyn MessagingAdapter>,
        broker: Arc<dyn Broker>,
        keys: KeyLayout,
        memory: Arc<MemoryStore>,
        trust: Arc<TrustManager>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            adapter,
            broker,
            keys,
            memory,
            trust,
            queue,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(bot = %self.bot_name, "action poller started");
        let key = self.keys.pending_actions(&self.bot_name);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.broker.lpop(&key).await {
                Ok(Some(raw)) => {
                    self.handle_raw(&raw).await;
                    tokio::time::sleep(ACTION_PACING).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    warn!(%err, "pending-actions pop failed");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
        info!("action poller stopped");
    }

    async fn handle_raw(&self, raw: &str) {
        let command: ActionCommand = match serde_json::from_str(raw) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "dropping undecodable action command");
                return;
            }
        };
        if let Err(err) = self.execute(&command).await {
            warn!(%err, action = ?command.action_type, "action execution failed");
        }
    }

    /// Execute one action command.  Public for worker-side reuse and tests.
    pub async fn execute(&self, command: &ActionCommand) -> anyhow::Result<()> {
        info!(action = ?command.action_type, channel = %command.channel_id, "executing action");

        match command.action_type {
            ActionType::React => self.execute_react(command).await,
            ActionType::Reply | ActionType::Post | ActionType::ReachOut => {
                self.execute_send(command).await
            }
        }
    }

    async fn execute_react(&self, command: &ActionCommand) -> anyhow::Result<()> {
        let (Some(target), Some(emoji)) = (&command.target_message_id, &command.emoji) else {
            return Ok(());
        };
        self.adapter
            .add_reaction(&command.channel_id, target, emoji)
            .await?;
        self.record_autonomous_action().await;
        Ok(())
    }

    async fn execute_send(&self, command: &ActionCommand) -> anyhow::Result<()> {
        let Some(content) = command.content.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(());
        };

        let is_reply = command.action_type == ActionType::Reply;

        // Posts respect a 60 s self-cooldown so ticks can never pile up into
        // a burst; replies and reactions are user-driven and exempt.
        if command.action_type == ActionType::Post && self.recently_acted().await {
            debug!(channel = %command.channel_id, "post skipped by self-cooldown");
            return Ok(());
        }

        // Save the incoming target message first so the exchange reads in
        // order: their message, then ours.
        if is_reply {
            if let (Some(author_id), Some(target_content)) =
                (&command.target_author_id, &command.target_content)
            {
                let meta = ConversationMetadata {
                    message_id: command.target_message_id.clone(),
                    author_id: Some(author_id.clone()),
                    author_is_bot: command.target_is_bot,
                    author_name: command.target_author_name.clone(),
                    user_name: command.target_author_name.clone(),
                    ..Default::default()
                };
                if let Err(err) = self
                    .memory
                    .store_turn(
                        author_id,
                        MemoryRole::User,
                        target_content,
                        Some(&command.channel_id),
                        Some(meta),
                    )
                    .await
                {
                    warn!(%err, "failed to store incoming target message");
                }
            }
        }

        // Send, chunked; the first chunk carries the reply reference.
        let mut last_message_id = None;
        for (i, chunk) in chunk_message(content, MAX_CHUNK).into_iter().enumerate() {
            let reply_to = if i == 0 && is_reply {
                command.target_message_id.as_deref()
            } else {
                None
            };
            last_message_id = Some(
                self.adapter
                    .send_message(&command.channel_id, &chunk, reply_to)
                    .await?,
            );
        }

        // Outgoing memory: replies attribute to the target author; channel
        // posts use the channel principal, never the bot's own id.
        let principal = if is_reply {
            command
                .target_author_id
                .clone()
                .unwrap_or_else(|| format!("channel_{}", command.channel_id))
        } else {
            format!("channel_{}", command.channel_id)
        };

        let meta = ConversationMetadata {
            message_id: last_message_id,
            author_id: Some(self.bot_name.clone()),
            author_is_bot: true,
            author_name: Some(self.bot_name.clone()),
            reply_to_msg_id: if is_reply {
                command.target_message_id.clone()
            } else {
                None
            },
            ..Default::default()
        };
        if let Err(err) = self
            .memory
            .store_turn(
                &principal,
                MemoryRole::Bot,
                content,
                Some(&command.channel_id),
                Some(meta),
            )
            .await
        {
            warn!(%err, "failed to store outgoing autonomous message");
        }

        // Channel interaction is relationship-building: the target author
        // and every context participant gets credit.
        if let Some(author_id) = &command.target_author_id {
            match self
                .trust
                .apply_event(author_id, TrustEvent::ChannelParticipation, false)
                .await
            {
                Ok(Some(milestone)) => info!(user = %author_id, %milestone, "trust milestone"),
                Ok(None) => debug!(user = %author_id, "trust +1"),
                Err(err) => warn!(%err, "trust update failed"),
            }
        }
        for context_user in &command.context_user_ids {
            if Some(context_user) == command.target_author_id.as_ref() {
                continue;
            }
            if let Err(err) = self
                .trust
                .apply_event(context_user, TrustEvent::ChannelParticipation, false)
                .await
            {
                debug!(%err, user = %context_user, "context trust update failed");
            }
        }

        self.enqueue_multiparty_learning(command, content).await;
        self.record_autonomous_action().await;
        Ok(())
    }

    /// Enqueue batch extraction per human participant, attributing each
    /// conversation to that participant's own user id — never the bot's,
    /// never a merged principal.
    async fn enqueue_multiparty_learning(&self, command: &ActionCommand, bot_content: &str) {
        let mut by_author: Vec<(String, String, Vec<serde_json::Value>)> = Vec::new();

        let mut push = |user_id: &str, user_name: &str, content: &str, is_bot: bool| {
            if is_bot || content.trim().is_empty() {
                return;
            }
            if let Some((_, _, messages)) = by_author.iter_mut().find(|(id, _, _)| id == user_id) {
                messages.push(serde_json::json!({"role": "user", "content": content}));
            } else {
                by_author.push((
                    user_id.to_string(),
                    user_name.to_string(),
                    vec![serde_json::json!({"role": "user", "content": content})],
                ));
            }
        };

        for context in &command.context_messages {
            push(&context.user_id, &context.user_name, &context.content, context.is_bot);
        }
        if let (Some(author_id), Some(target_content)) =
            (&command.target_author_id, &command.target_content)
        {
            push(
                author_id,
                command.target_author_name.as_deref().unwrap_or("Unknown"),
                target_content,
                command.target_is_bot,
            );
        }

        for (user_id, user_name, mut messages) in by_author {
            messages.push(serde_json::json!({"role": "bot", "content": bot_content}));
            let session_id = format!("daily_life_{}", &Uuid::new_v4().simple().to_string()[..8]);

            let payload = serde_json::json!({
                "user_id": user_id,
                "bot_name": self.bot_name,
                "session_id": session_id,
                "user_name": user_name,
                "messages": messages,
                "trigger": "daily_life_multiparty",
            });

            for (task, queue) in [
                ("run_batch_knowledge_extraction", QueueName::Cognition),
                ("run_batch_preference_extraction", QueueName::Cognition),
            ] {
                let job_id = format!("{task}_{session_id}");
                if let Err(err) = self
                    .queue
                    .enqueue(task, queue, Some(job_id), None, payload.clone())
                    .await
                {
                    debug!(%err, task, "learning enqueue failed");
                }
            }
        }
    }

    async fn record_autonomous_action(&self) {
        let key = self.keys.last_autonomous_action(&self.bot_name);
        let _ = self
            .broker
            .set_ex(&key, &Utc::now().timestamp().to_string(), 3600)
            .await;
    }

    async fn recently_acted(&self) -> bool {
        let key = self.keys.last_autonomous_action(&self.bot_name);
        match self.broker.get(&key).await {
            Ok(Some(raw)) => raw
                .parse::<i64>()
                .map(|last| Utc::now().timestamp() - last < 60)
                .unwrap_or(false),
            _ => false,
        }
    }
}
