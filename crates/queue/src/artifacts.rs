//! Pending artifact registry: generated images/audio awaiting attachment to
//! the user's next outgoing message.
//!
//! Metadata lives in a per-user Redis list with a 5-minute TTL; the files
//! themselves are already on disk when `add` is called.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::broker::{Broker, BrokerError};
use crate::keys::KeyLayout;

/// Artifacts older than this are dropped at pop time.
const ARTIFACT_TTL: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingArtifact {
    pub user_id: String,
    pub path: String,
    pub mime: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl PendingArtifact {
    pub fn new(
        user_id: impl Into<String>,
        path: impl Into<String>,
        mime: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            path: path.into(),
            mime: mime.into(),
            filename: filename.into(),
            created_at: Utc::now(),
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(ARTIFACT_TTL)
    }
}

pub struct ArtifactRegistry {
    broker: Arc<dyn Broker>,
    keys: KeyLayout,
}

impl ArtifactRegistry {
    pub fn new(broker: Arc<dyn Broker>, keys: KeyLayout) -> Self {
        Self { broker, keys }
    }

    pub async fn add(&self, artifact: PendingArtifact) -> Result<(), BrokerError> {
        let key = self.keys.pending_artifacts(&artifact.user_id);
        let encoded = serde_json::to_string(&artifact)
            .map_err(|err| BrokerError::Backend(err.to_string()))?;
        self.broker.rpush(&key, &encoded).await
    }

    /// Retrieve and delete all pending artifacts for a user, dropping any
    /// past their TTL.
    pub async fn pop_all(&self, user_id: &str) -> Vec<PendingArtifact> {
        let key = self.keys.pending_artifacts(user_id);
        let entries = match self.broker.drain_list(&key).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, user_id, "artifact drain failed");
                return Vec::new();
            }
        };

        let now = Utc::now();
        entries
            .iter()
            .filter_map(|raw| serde_json::from_str::<PendingArtifact>(raw).ok())
            .filter(|a| !a.expired(now))
            .collect()
    }
}
