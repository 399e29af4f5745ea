//! Relationship persistence contract plus the Postgres and in-memory
//! backends.
//!
//! Trust mutations are serialized by a single row-level UPDATE that clamps
//! and returns old/new scores — no in-process lock is involved.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;

pub const TRUST_MIN: i32 = -100;
pub const TRUST_MAX: i32 = 100;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("relational store error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for TrustError {
    fn from(err: sqlx::Error) -> Self {
        TrustError::Store(err.to_string())
    }
}

/// One `(user, bot)` relationship row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub user_id: String,
    pub bot_name: String,
    pub trust_score: i32,
    pub unlocked_traits: Vec<String>,
    pub insights: Vec<String>,
    pub preferences: HashMap<String, serde_json::Value>,
    pub mood: String,
    pub mood_intensity: f32,
    pub updated_at: DateTime<Utc>,
    pub last_milestone_date: Option<DateTime<Utc>>,
}

impl Relationship {
    fn fresh(user_id: &str, bot_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            bot_name: bot_name.to_string(),
            trust_score: 0,
            unlocked_traits: Vec::new(),
            insights: Vec::new(),
            preferences: HashMap::new(),
            mood: "neutral".to_string(),
            mood_intensity: 0.5,
            updated_at: Utc::now(),
            last_milestone_date: None,
        }
    }
}

/// Result of an atomic trust mutation.
#[derive(Debug, Clone, Copy)]
pub struct TrustDeltaOutcome {
    pub old_score: i32,
    pub new_score: i32,
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Fetch the relationship, lazily creating the default row.
    async fn fetch_or_create(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Relationship, TrustError>;

    /// Atomic clamped read-modify-write of the trust score.
    async fn apply_trust_delta(
        &self,
        user_id: &str,
        bot_name: &str,
        delta: i32,
    ) -> Result<TrustDeltaOutcome, TrustError>;

    async fn set_last_milestone(
        &self,
        user_id: &str,
        bot_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TrustError>;

    async fn unlock_trait(
        &self,
        user_id: &str,
        bot_name: &str,
        trait_name: &str,
    ) -> Result<(), TrustError>;

    async fn set_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), TrustError>;

    async fn delete_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
    ) -> Result<(), TrustError>;

    async fn add_insight(
        &self,
        user_id: &str,
        bot_name: &str,
        insight: &str,
    ) -> Result<(), TrustError>;

    /// Reset preferences, traits, insights, and trust to defaults.
    async fn clear(&self, user_id: &str, bot_name: &str) -> Result<(), TrustError>;

    async fn last_interaction(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Option<DateTime<Utc>>, TrustError>;

    /// Other bots this user trusts at or above `min_trust`, excluding
    /// `exclude_bot`.  Drives gossip recipient selection.
    async fn bots_with_min_trust(
        &self,
        user_id: &str,
        exclude_bot: &str,
        min_trust: i32,
    ) -> Result<Vec<String>, TrustError>;
}

// ── Postgres backend ──────────────────────────────────────────────────────────

pub struct PgRelationshipStore {
    pool: PgPool,
}

impl PgRelationshipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the relationships table when missing.  Run once at startup.
    pub async fn ensure_schema(&self) -> Result<(), TrustError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_relationships (
                user_id             TEXT NOT NULL,
                bot_name            TEXT NOT NULL,
                trust_score         INTEGER NOT NULL DEFAULT 0,
                unlocked_traits     JSONB NOT NULL DEFAULT '[]'::jsonb,
                insights            JSONB NOT NULL DEFAULT '[]'::jsonb,
                preferences         JSONB NOT NULL DEFAULT '{}'::jsonb,
                mood                TEXT NOT NULL DEFAULT 'neutral',
                mood_intensity      REAL NOT NULL DEFAULT 0.5,
                updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_milestone_date TIMESTAMPTZ,
                PRIMARY KEY (user_id, bot_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_relationship(row: &sqlx::postgres::PgRow) -> Result<Relationship, TrustError> {
        let unlocked_traits: serde_json::Value = row.try_get("unlocked_traits")?;
        let insights: serde_json::Value = row.try_get("insights")?;
        let preferences: serde_json::Value = row.try_get("preferences")?;
        Ok(Relationship {
            user_id: row.try_get("user_id")?,
            bot_name: row.try_get("bot_name")?,
            trust_score: row.try_get("trust_score")?,
            unlocked_traits: serde_json::from_value(unlocked_traits).unwrap_or_default(),
            insights: serde_json::from_value(insights).unwrap_or_default(),
            preferences: serde_json::from_value(preferences).unwrap_or_default(),
            mood: row.try_get("mood")?,
            mood_intensity: row.try_get("mood_intensity")?,
            updated_at: row.try_get("updated_at")?,
            last_milestone_date: row.try_get("last_milestone_date")?,
        })
    }
}

#[async_trait]
impl RelationshipStore for PgRelationshipStore {
    async fn fetch_or_create(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Relationship, TrustError> {
        sqlx::query(
            r#"
            INSERT INTO user_relationships (user_id, bot_name)
            VALUES ($1, $2)
            ON CONFLICT (user_id, bot_name) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM user_relationships WHERE user_id = $1 AND bot_name = $2",
        )
        .bind(user_id)
        .bind(bot_name)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_relationship(&row)
    }

    async fn apply_trust_delta(
        &self,
        user_id: &str,
        bot_name: &str,
        delta: i32,
    ) -> Result<TrustDeltaOutcome, TrustError> {
        self.fetch_or_create(user_id, bot_name).await?;

        // The scalar subquery reads the statement snapshot, i.e. the
        // pre-update score; the RETURNING column is the clamped new score.
        let row = sqlx::query(
            r#"
            UPDATE user_relationships
            SET trust_score = GREATEST($4, LEAST($5, trust_score + $3)),
                updated_at = NOW()
            WHERE user_id = $1 AND bot_name = $2
            RETURNING trust_score,
                      (SELECT trust_score FROM user_relationships
                       WHERE user_id = $1 AND bot_name = $2) AS old_score
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(delta)
        .bind(TRUST_MIN)
        .bind(TRUST_MAX)
        .fetch_one(&self.pool)
        .await?;

        Ok(TrustDeltaOutcome {
            old_score: row.try_get("old_score")?,
            new_score: row.try_get("trust_score")?,
        })
    }

    async fn set_last_milestone(
        &self,
        user_id: &str,
        bot_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TrustError> {
        sqlx::query(
            "UPDATE user_relationships SET last_milestone_date = $3 WHERE user_id = $1 AND bot_name = $2",
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unlock_trait(
        &self,
        user_id: &str,
        bot_name: &str,
        trait_name: &str,
    ) -> Result<(), TrustError> {
        sqlx::query(
            r#"
            UPDATE user_relationships
            SET unlocked_traits = unlocked_traits || $3::jsonb
            WHERE user_id = $1 AND bot_name = $2
              AND NOT (unlocked_traits @> $3::jsonb)
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(serde_json::json!([trait_name]))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), TrustError> {
        self.fetch_or_create(user_id, bot_name).await?;
        sqlx::query(
            r#"
            UPDATE user_relationships
            SET preferences = jsonb_set(COALESCE(preferences, '{}'::jsonb), ARRAY[$3], $4::jsonb),
                updated_at = NOW()
            WHERE user_id = $1 AND bot_name = $2
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
    ) -> Result<(), TrustError> {
        sqlx::query(
            r#"
            UPDATE user_relationships
            SET preferences = preferences - $3,
                updated_at = NOW()
            WHERE user_id = $1 AND bot_name = $2
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_insight(
        &self,
        user_id: &str,
        bot_name: &str,
        insight: &str,
    ) -> Result<(), TrustError> {
        self.fetch_or_create(user_id, bot_name).await?;
        sqlx::query(
            r#"
            UPDATE user_relationships
            SET insights = insights || $3::jsonb,
                updated_at = NOW()
            WHERE user_id = $1 AND bot_name = $2
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .bind(serde_json::json!([insight]))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, user_id: &str, bot_name: &str) -> Result<(), TrustError> {
        sqlx::query(
            r#"
            UPDATE user_relationships
            SET preferences = '{}'::jsonb,
                trust_score = 0,
                unlocked_traits = '[]'::jsonb,
                insights = '[]'::jsonb,
                updated_at = NOW()
            WHERE user_id = $1 AND bot_name = $2
            "#,
        )
        .bind(user_id)
        .bind(bot_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_interaction(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Option<DateTime<Utc>>, TrustError> {
        let row = sqlx::query(
            "SELECT updated_at FROM user_relationships WHERE user_id = $1 AND bot_name = $2",
        )
        .bind(user_id)
        .bind(bot_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get("updated_at")).transpose()?)
    }

    async fn bots_with_min_trust(
        &self,
        user_id: &str,
        exclude_bot: &str,
        min_trust: i32,
    ) -> Result<Vec<String>, TrustError> {
        let rows = sqlx::query(
            r#"
            SELECT bot_name FROM user_relationships
            WHERE user_id = $1 AND bot_name != $2 AND trust_score >= $3
            "#,
        )
        .bind(user_id)
        .bind(exclude_bot)
        .bind(min_trust)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("bot_name").map_err(TrustError::from))
            .collect()
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────────

/// In-process backend with the same semantics; used by tests and offline runs.
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    rows: Mutex<HashMap<(String, String), Relationship>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn fetch_or_create(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Relationship, TrustError> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .entry((user_id.to_string(), bot_name.to_string()))
            .or_insert_with(|| Relationship::fresh(user_id, bot_name))
            .clone())
    }

    async fn apply_trust_delta(
        &self,
        user_id: &str,
        bot_name: &str,
        delta: i32,
    ) -> Result<TrustDeltaOutcome, TrustError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry((user_id.to_string(), bot_name.to_string()))
            .or_insert_with(|| Relationship::fresh(user_id, bot_name));
        let old_score = row.trust_score;
        row.trust_score = (old_score + delta).clamp(TRUST_MIN, TRUST_MAX);
        row.updated_at = Utc::now();
        Ok(TrustDeltaOutcome {
            old_score,
            new_score: row.trust_score,
        })
    }

    async fn set_last_milestone(
        &self,
        user_id: &str,
        bot_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(&(user_id.to_string(), bot_name.to_string())) {
            row.last_milestone_date = Some(at);
        }
        Ok(())
    }

    async fn unlock_trait(
        &self,
        user_id: &str,
        bot_name: &str,
        trait_name: &str,
    ) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry((user_id.to_string(), bot_name.to_string()))
            .or_insert_with(|| Relationship::fresh(user_id, bot_name));
        if !row.unlocked_traits.iter().any(|t| t == trait_name) {
            row.unlocked_traits.push(trait_name.to_string());
        }
        Ok(())
    }

    async fn set_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry((user_id.to_string(), bot_name.to_string()))
            .or_insert_with(|| Relationship::fresh(user_id, bot_name));
        row.preferences.insert(key.to_string(), value);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_preference(
        &self,
        user_id: &str,
        bot_name: &str,
        key: &str,
    ) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(&(user_id.to_string(), bot_name.to_string())) {
            row.preferences.remove(key);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn add_insight(
        &self,
        user_id: &str,
        bot_name: &str,
        insight: &str,
    ) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry((user_id.to_string(), bot_name.to_string()))
            .or_insert_with(|| Relationship::fresh(user_id, bot_name));
        row.insights.push(insight.to_string());
        Ok(())
    }

    async fn clear(&self, user_id: &str, bot_name: &str) -> Result<(), TrustError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(&(user_id.to_string(), bot_name.to_string())) {
            row.trust_score = 0;
            row.preferences.clear();
            row.unlocked_traits.clear();
            row.insights.clear();
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn last_interaction(
        &self,
        user_id: &str,
        bot_name: &str,
    ) -> Result<Option<DateTime<Utc>>, TrustError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(&(user_id.to_string(), bot_name.to_string()))
            .map(|r| r.updated_at))
    }

    async fn bots_with_min_trust(
        &self,
        user_id: &str,
        exclude_bot: &str,
        min_trust: i32,
    ) -> Result<Vec<String>, TrustError> {
        let rows = self.rows.lock().await;
        let mut bots: Vec<String> = rows
            .values()
            .filter(|r| {
                r.user_id == user_id && r.bot_name != exclude_bot && r.trust_score >= min_trust
            })
            .map(|r| r.bot_name.clone())
            .collect();
        bots.sort();
        Ok(bots)
    }
}
