//! The WhisperEngine runtime: wires memory, trust, queues, the universe bus,
//! and the daily-life loop around a messaging adapter.

pub mod consumer;
pub mod context;
pub mod moderation;
pub mod post_conversation;
pub mod prompt;
pub mod quota;
pub mod response;
pub mod stream;
pub mod workers;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use whisperengine_autonomy::{
    ActionPoller, DailyLifeGraph, DailyLifeScheduler, GraphDeps, ReactionAgent,
};
use whisperengine_messaging::MessagingAdapter;
use whisperengine_queue::{QueueName, run_worker};

pub use consumer::{BroadcastPayload, StreamConsumer};
pub use context::{BotMemoryFactory, InMemoryBotFactory, QdrantMemoryFactory, RuntimeContext};
pub use moderation::{TimeoutManager, cold_response, error_response};
pub use post_conversation::{enqueue_graph_enrichment, enqueue_post_conversation_tasks};
pub use prompt::{ContextBundle, build_system_prompt, truncate_for_prompt};
pub use quota::{InMemoryQuotaStore, PgQuotaStore, QuotaKind, QuotaManager, QuotaStore};
pub use response::Responder;
pub use stream::stream_to_channel;
pub use workers::build_registry;

/// Everything a running bot process consists of.  Dropping the handle after
/// signalling shutdown lets every long-lived task drain its current pass.
pub struct BotProcess {
    pub responder: Arc<Responder>,
    pub scheduler: Arc<DailyLifeScheduler>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl BotProcess {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("bot process drained");
    }
}

/// Start every long-lived task of a bot process: the daily-life scheduler,
/// the action poller, the broadcast consumer, and one worker per named
/// queue.  The returned responder handles inbound messages from the gateway.
pub fn start_bot(
    ctx: Arc<RuntimeContext>,
    adapter: Arc<dyn MessagingAdapter>,
) -> Result<BotProcess> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bot_name = ctx.bot_name().to_string();

    let reactions = Arc::new(ReactionAgent::new(
        &bot_name,
        ctx.character.clone(),
        ctx.config.reactions.clone(),
        ctx.broker.clone(),
        ctx.keys.clone(),
    ));

    let responder = Responder::new(ctx.clone(), adapter.clone(), Some(reactions));

    let graph = Arc::new(DailyLifeGraph::new(GraphDeps {
        bot_name: bot_name.clone(),
        flags: ctx.config.autonomy.clone(),
        character: ctx.character.clone(),
        embedder: ctx.embedder.clone(),
        llm: ctx.llm.clone(),
        planner_model: ctx.config.llm.planner_model().to_string(),
        creative_model: ctx.config.llm.model.clone(),
        trust: ctx.trust.clone(),
        memory: ctx.memory.clone(),
        responder: responder.clone(),
    }));

    let scheduler = Arc::new(DailyLifeScheduler::new(
        &bot_name,
        ctx.config.autonomy.clone(),
        adapter.clone(),
        ctx.activity.clone(),
        ctx.queue.clone(),
        ctx.broker.clone(),
        ctx.keys.clone(),
    ));

    let poller = Arc::new(ActionPoller::new(
        &bot_name,
        adapter.clone(),
        ctx.broker.clone(),
        ctx.keys.clone(),
        ctx.memory.clone(),
        ctx.trust.clone(),
        ctx.queue.clone(),
    ));

    let consumer = Arc::new(StreamConsumer::new(
        &bot_name,
        ctx.broker.clone(),
        ctx.keys.clone(),
        scheduler.clone(),
    ));

    let registry = build_registry(ctx.clone(), graph);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(scheduler.clone().run(shutdown_rx.clone())));
    tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));
    tasks.push(tokio::spawn(consumer.run(shutdown_rx.clone())));
    for queue_name in [
        QueueName::Cognition,
        QueueName::Sensory,
        QueueName::Action,
        QueueName::Social,
    ] {
        tasks.push(tokio::spawn(run_worker(
            ctx.queue.clone(),
            queue_name,
            registry.clone(),
            shutdown_rx.clone(),
        )));
    }

    info!(bot = %bot_name, "bot process started");
    Ok(BotProcess {
        responder,
        scheduler,
        shutdown_tx,
        tasks,
    })
}

/// Worker-only process: runs the queue workers without a gateway.  The
/// daily-life graph still needs a responder for autonomous replies, so the
/// caller provides an adapter (typically a send-capable gateway client).
pub fn start_workers(
    ctx: Arc<RuntimeContext>,
    adapter: Arc<dyn MessagingAdapter>,
) -> Result<BotProcess> {
    // Same wiring minus the scheduler-driven snapshot loop; workers consume
    // whatever other processes enqueue.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bot_name = ctx.bot_name().to_string();

    let responder = Responder::new(ctx.clone(), adapter.clone(), None);
    let graph = Arc::new(DailyLifeGraph::new(GraphDeps {
        bot_name: bot_name.clone(),
        flags: ctx.config.autonomy.clone(),
        character: ctx.character.clone(),
        embedder: ctx.embedder.clone(),
        llm: ctx.llm.clone(),
        planner_model: ctx.config.llm.planner_model().to_string(),
        creative_model: ctx.config.llm.model.clone(),
        trust: ctx.trust.clone(),
        memory: ctx.memory.clone(),
        responder: responder.clone(),
    }));

    let scheduler = Arc::new(DailyLifeScheduler::new(
        &bot_name,
        ctx.config.autonomy.clone(),
        adapter.clone(),
        ctx.activity.clone(),
        ctx.queue.clone(),
        ctx.broker.clone(),
        ctx.keys.clone(),
    ));

    let registry = build_registry(ctx.clone(), graph);
    let mut tasks = Vec::new();
    for queue_name in [
        QueueName::Cognition,
        QueueName::Sensory,
        QueueName::Action,
        QueueName::Social,
    ] {
        tasks.push(tokio::spawn(run_worker(
            ctx.queue.clone(),
            queue_name,
            registry.clone(),
            shutdown_rx.clone(),
        )));
    }

    info!(bot = %bot_name, "worker process started");
    Ok(BotProcess {
        responder,
        scheduler,
        shutdown_tx,
        tasks,
    })
}
