//! Cross-process broadcast ingest: drains `broadcast:queue:<bot>` and turns
//! payloads into immediate daily-life triggers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use whisperengine_autonomy::DailyLifeScheduler;
use whisperengine_messaging::InboundMessage;
use whisperengine_queue::{Broker, KeyLayout};

const IDLE_POLL: Duration = Duration::from_secs(2);

/// One broadcast payload as pushed by other processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub reason: String,
    pub message: InboundMessage,
}

pub struct StreamConsumer {
    bot_name: String,
    broker: Arc<dyn Broker>,
    keys: KeyLayout,
    scheduler: Arc<DailyLifeScheduler>,
}

impl StreamConsumer {
    pub fn new(
        bot_name: impl Into<String>,
        broker: Arc<dyn Broker>,
        keys: KeyLayout,
        scheduler: Arc<DailyLifeScheduler>,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            broker,
            keys,
            scheduler,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(bot = %self.bot_name, "stream consumer started");
        let key = self.keys.broadcast_queue(&self.bot_name);

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.broker.lpop(&key).await {
                Ok(Some(raw)) => self.process(&raw).await,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    warn!(%err, "broadcast pop failed");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
        info!("stream consumer stopped");
    }

    async fn process(&self, raw: &str) {
        let payload: BroadcastPayload = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "dropping undecodable broadcast payload");
                return;
            }
        };
        if let Err(err) = self
            .scheduler
            .trigger_immediate(&payload.message, &payload.reason)
            .await
        {
            warn!(%err, "broadcast trigger failed");
        }
    }
}
