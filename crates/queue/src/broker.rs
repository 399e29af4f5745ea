//! Broker backend contract: the small set of Redis operations the queue,
//! debounce keys, rate counters, and artifact registry are built on.
//!
//! The Redis implementation is the production backend; the in-memory one
//! backs tests and offline runs with identical semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// SET key value NX EX ttl — returns true when the key was absent.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, BrokerError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), BrokerError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError>;

    async fn del(&self, key: &str) -> Result<(), BrokerError>;

    async fn rpush(&self, key: &str, value: &str) -> Result<(), BrokerError>;

    async fn lpop(&self, key: &str) -> Result<Option<String>, BrokerError>;

    /// Drain the whole list atomically (LRANGE + DEL).
    async fn drain_list(&self, key: &str) -> Result<Vec<String>, BrokerError>;

    /// INCR with an expiry set on first increment; returns the new count.
    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<i64, BrokerError>;

    /// Add a member to a sorted set with the given score.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), BrokerError>;

    /// Pop all members with score ≤ `max_score`.
    async fn zpop_due(&self, key: &str, max_score: f64) -> Result<Vec<String>, BrokerError>;
}

// ── Redis backend ─────────────────────────────────────────────────────────────

pub struct RedisBroker {
    connection: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, BrokerError> {
        let mut conn = self.connection.clone();
        let set: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;
        Ok(set)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn del(&self, key: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.connection.clone();
        Ok(conn.lpop(key, None).await?)
    }

    async fn drain_list(&self, key: &str) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.connection.clone();
        let (values, _): (Vec<String>, i64) = redis::pipe()
            .atomic()
            .lrange(key, 0, -1)
            .del(key)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<i64, BrokerError> {
        let mut conn = self.connection.clone();
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs as i64)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zpop_due(&self, key: &str, max_score: f64) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.connection.clone();
        let due: Vec<String> = conn.zrangebyscore(key, f64::MIN, max_score).await?;
        if !due.is_empty() {
            let _: () = conn.zrem(key, due.clone()).await?;
        }
        Ok(due)
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    counters: HashMap<String, i64>,
    zsets: HashMap<String, Vec<(f64, String)>>,
}

/// In-process broker with Redis-like semantics.  TTLs are not enforced by a
/// background sweeper; tests drive expiry explicitly via [`expire_now`].
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<MemoryState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: drop a key as if its TTL elapsed.
    pub async fn expire_now(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.strings.remove(key);
        state.counters.remove(key);
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn set_nx_ex(&self, key: &str, value: &str, _ttl: u64) -> Result<bool, BrokerError> {
        let mut state = self.state.lock().await;
        if state.strings.contains_key(key) {
            Ok(false)
        } else {
            state.strings.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl: u64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state
            .strings
            .get(key)
            .cloned()
            .or_else(|| state.counters.get(key).map(|c| c.to_string())))
    }

    async fn del(&self, key: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.strings.remove(key);
        state.lists.remove(key);
        state.counters.remove(key);
        state.zsets.remove(key);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let mut state = self.state.lock().await;
        Ok(state.lists.get_mut(key).and_then(|l| {
            if l.is_empty() {
                None
            } else {
                Some(l.remove(0))
            }
        }))
    }

    async fn drain_list(&self, key: &str) -> Result<Vec<String>, BrokerError> {
        let mut state = self.state.lock().await;
        Ok(state.lists.remove(key).unwrap_or_default())
    }

    async fn incr_with_expiry(&self, key: &str, _ttl: u64) -> Result<i64, BrokerError> {
        let mut state = self.state.lock().await;
        let counter = state.counters.entry(key.to_string()).or_default();
        *counter += 1;
        Ok(*counter)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .push((score, member.to_string()));
        Ok(())
    }

    async fn zpop_due(&self, key: &str, max_score: f64) -> Result<Vec<String>, BrokerError> {
        let mut state = self.state.lock().await;
        let Some(zset) = state.zsets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(f64, String)> = Vec::new();
        zset.retain(|(score, member)| {
            if *score <= max_score {
                due.push((*score, member.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(due.into_iter().map(|(_, m)| m).collect())
    }
}
