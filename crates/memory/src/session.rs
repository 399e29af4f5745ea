//! Session boundary tracking for `(user, bot)` pairs.
//!
//! A session opens on the first message from a user with no open session and
//! closes by inactivity timeout or explicit close.  `started_at` is the
//! authoritative batch boundary for post-conversation processing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

/// Outcome of observing one inbound turn.
#[derive(Debug, Clone)]
pub struct SessionTurn {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub is_new: bool,
    pub message_count: usize,
}

pub struct SessionManager {
    timeout: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(timeout_minutes: i64) -> Self {
        Self {
            timeout: Duration::minutes(timeout_minutes),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record an inbound turn, opening a fresh session when none is open or
    /// the previous one has timed out.
    pub async fn observe_turn(&self, user_id: &str, now: DateTime<Utc>) -> SessionTurn {
        let mut sessions = self.sessions.lock().await;

        let stale = sessions
            .get(user_id)
            .map(|s| now - s.last_activity > self.timeout)
            .unwrap_or(true);

        if stale {
            let session = Session {
                id: Uuid::new_v4().simple().to_string(),
                user_id: user_id.to_string(),
                started_at: now,
                last_activity: now,
                message_count: 1,
            };
            let turn = SessionTurn {
                session_id: session.id.clone(),
                started_at: session.started_at,
                is_new: true,
                message_count: 1,
            };
            sessions.insert(user_id.to_string(), session);
            return turn;
        }

        let session = sessions.get_mut(user_id).expect("checked above");
        session.last_activity = now;
        session.message_count += 1;
        SessionTurn {
            session_id: session.id.clone(),
            started_at: session.started_at,
            is_new: false,
            message_count: session.message_count,
        }
    }

    /// The open session for `user_id`, if any and not timed out.
    pub async fn get_open(&self, user_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(user_id)
            .filter(|s| now - s.last_activity <= self.timeout)
            .cloned()
    }

    pub async fn session_start_time(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .find(|s| s.id == session_id)
            .map(|s| s.started_at)
    }

    /// Explicitly close a user's session, returning it for final processing.
    pub async fn close(&self, user_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(user_id)
    }

    /// Sweep out sessions idle past the timeout; returns the closed sessions
    /// so callers can enqueue their post-conversation pipelines.
    pub async fn close_idle(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| now - s.last_activity > self.timeout)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| sessions.remove(&k))
            .collect()
    }
}
