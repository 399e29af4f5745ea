//! Per-user daily artifact quotas (images, audio), backed by an upsert
//! counter table in Postgres with an in-memory double for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    Image,
    Audio,
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current usage count for the user today.
    async fn usage_today(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<i64>;
    async fn increment(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<()>;
}

pub struct QuotaManager {
    store: Box<dyn QuotaStore>,
    image_limit: i64,
    audio_limit: i64,
}

impl QuotaManager {
    pub fn new(store: Box<dyn QuotaStore>, image_limit: i64, audio_limit: i64) -> Self {
        Self {
            store,
            image_limit,
            audio_limit,
        }
    }

    /// True when the user still has quota for `kind` today.  Store failures
    /// fail open: generation is allowed rather than blocked.
    pub async fn check(&self, user_id: &str, kind: QuotaKind) -> bool {
        let limit = match kind {
            QuotaKind::Image => self.image_limit,
            QuotaKind::Audio => self.audio_limit,
        };
        match self.store.usage_today(user_id, kind).await {
            Ok(usage) => {
                if usage >= limit {
                    info!(user_id, ?kind, usage, limit, "daily quota exhausted");
                    false
                } else {
                    true
                }
            }
            Err(_) => true,
        }
    }

    pub async fn record_usage(&self, user_id: &str, kind: QuotaKind) {
        let _ = self.store.increment(user_id, kind).await;
    }
}

// ── Postgres backend ──────────────────────────────────────────────────────────

pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_daily_usage (
                user_id     TEXT NOT NULL,
                date        DATE NOT NULL,
                image_count INTEGER NOT NULL DEFAULT 0,
                audio_count INTEGER NOT NULL DEFAULT 0,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn usage_today(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT image_count, audio_count FROM user_daily_usage WHERE user_id = $1 AND date = $2",
        )
        .bind(user_id)
        .bind(Utc::now().date_naive())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => match kind {
                QuotaKind::Image => row.try_get::<i32, _>("image_count")? as i64,
                QuotaKind::Audio => row.try_get::<i32, _>("audio_count")? as i64,
            },
            None => 0,
        })
    }

    async fn increment(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<()> {
        let (image_inc, audio_inc) = match kind {
            QuotaKind::Image => (1, 0),
            QuotaKind::Audio => (0, 1),
        };
        sqlx::query(
            r#"
            INSERT INTO user_daily_usage (user_id, date, image_count, audio_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, date)
            DO UPDATE SET
                image_count = user_daily_usage.image_count + $3,
                audio_count = user_daily_usage.audio_count + $4,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(Utc::now().date_naive())
        .bind(image_inc)
        .bind(audio_inc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryQuotaStore {
    counts: Mutex<HashMap<(String, NaiveDate, &'static str), i64>>,
}

fn kind_key(kind: QuotaKind) -> &'static str {
    match kind {
        QuotaKind::Image => "image",
        QuotaKind::Audio => "audio",
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn usage_today(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<i64> {
        let counts = self.counts.lock().await;
        Ok(*counts
            .get(&(user_id.to_string(), Utc::now().date_naive(), kind_key(kind)))
            .unwrap_or(&0))
    }

    async fn increment(&self, user_id: &str, kind: QuotaKind) -> anyhow::Result<()> {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((user_id.to_string(), Utc::now().date_naive(), kind_key(kind)))
            .or_default() += 1;
        Ok(())
    }
}
