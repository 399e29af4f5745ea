use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    User,
    Bot,
    System,
    KnowledgeImport,
    SelfReflection,
}

/// Closed set of memory kinds.  `Gossip` entries are injected cross-bot via
/// the universe bus and carry a propagation marker so they never re-fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    BotSelfKnowledge,
    BotSelfReflection,
    Gossip,
    Fact,
    Summary,
}

/// The seven named vector facets every entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedVector {
    Content,
    Emotion,
    Semantic,
    Relationship,
    Personality,
    Interaction,
    Temporal,
}

impl NamedVector {
    pub const ALL: [NamedVector; 7] = [
        NamedVector::Content,
        NamedVector::Emotion,
        NamedVector::Semantic,
        NamedVector::Relationship,
        NamedVector::Personality,
        NamedVector::Interaction,
        NamedVector::Temporal,
    ];

    /// Stable wire name used as the Qdrant named-vector key.
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedVector::Content => "content",
            NamedVector::Emotion => "emotion",
            NamedVector::Semantic => "semantic",
            NamedVector::Relationship => "relationship",
            NamedVector::Personality => "personality",
            NamedVector::Interaction => "interaction",
            NamedVector::Temporal => "temporal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalMomentum {
    Accelerating,
    Steady,
    Decelerating,
    Reversing,
}

/// Emotion metadata attached at store time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionMetadata {
    pub primary_emotion: String,
    /// 0.0 – 1.0
    pub emotional_intensity: f32,
    /// Last K emotion labels for this user, oldest first (K ≈ 10).
    pub emotional_trajectory: Vec<String>,
    /// Signed intensity delta per turn, -1.0 – 1.0.
    pub emotional_velocity: f32,
    pub emotional_momentum: EmotionalMomentum,
    /// 0.0 – 1.0; high when recent labels agree.
    pub emotional_stability: f32,
}

impl Default for EmotionMetadata {
    fn default() -> Self {
        Self {
            primary_emotion: "neutral".to_string(),
            emotional_intensity: 0.0,
            emotional_trajectory: Vec::new(),
            emotional_velocity: 0.0,
            emotional_momentum: EmotionalMomentum::Steady,
            emotional_stability: 1.0,
        }
    }
}

/// Significance tiers with fixed thresholds:
/// `ambient < 0.2 ≤ routine < 0.5 ≤ notable < 0.8 ≤ defining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceTier {
    Ambient,
    Routine,
    Notable,
    Defining,
}

impl SignificanceTier {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            SignificanceTier::Defining
        } else if score >= 0.5 {
            SignificanceTier::Notable
        } else if score >= 0.2 {
            SignificanceTier::Routine
        } else {
            SignificanceTier::Ambient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignificanceTier::Ambient => "ambient",
            SignificanceTier::Routine => "routine",
            SignificanceTier::Notable => "notable",
            SignificanceTier::Defining => "defining",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceMetadata {
    pub overall_significance: f32,
    /// Bag of contributing factor scores (emotion, novelty, life_event,
    /// length, recall_marker, name_reference).
    pub significance_factors: HashMap<String, f32>,
    pub significance_tier: SignificanceTier,
    /// 0.0 – 1.0; how strongly this entry resists decay-based pruning.
    pub decay_resistance: f32,
}

impl Default for SignificanceMetadata {
    fn default() -> Self {
        Self {
            overall_significance: 0.0,
            significance_factors: HashMap::new(),
            significance_tier: SignificanceTier::Ambient,
            decay_resistance: 0.0,
        }
    }
}

/// The atomic unit stored in the vector index.  Entries are never mutated
/// after write; corrections are new entries that supersede by recency and
/// significance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Redundant with the collection but queryable.
    pub bot_name: String,
    pub role: MemoryRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub memory_type: MemoryType,
    /// Topical tag from the closed semantic vocabulary (`general` fallback).
    pub semantic_key: String,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
    pub author_id: Option<String>,
    pub author_is_bot: bool,
    pub author_name: Option<String>,
    pub reply_to_msg_id: Option<String>,
    pub emotion: EmotionMetadata,
    pub significance: SignificanceMetadata,
    /// Gossip entries carry the propagation depth they were delivered with so
    /// the universe detector can refuse to re-publish them.
    pub propagation_depth: Option<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new(
        user_id: impl Into<String>,
        bot_name: impl Into<String>,
        role: MemoryRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            bot_name: bot_name.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            session_id: None,
            memory_type: MemoryType::Conversation,
            semantic_key: "general".to_string(),
            channel_id: None,
            message_id: None,
            author_id: None,
            author_is_bot: false,
            author_name: None,
            reply_to_msg_id: None,
            emotion: EmotionMetadata::default(),
            significance: SignificanceMetadata::default(),
            propagation_depth: None,
            metadata: HashMap::new(),
        }
    }
}

/// Which retrieval path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Content,
    Emotion,
    Semantic,
    FidelityFirst,
}

/// A memory returned from retrieval, annotated with provenance so prompt
/// builders can explain why a memory surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub entry: MemoryEntry,
    pub score: f32,
    pub search_type: SearchType,
    /// One of `roberta:<label>`, `keyword_detection`, `semantic_routing`,
    /// `content_default`.
    pub emotion_source: String,
    pub fidelity_preserved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_relevance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_alignment: Option<f32>,
}

/// Caller-supplied emotion classification (e.g. from a RoBERTa-like
/// classifier upstream).  The hint always wins over keyword detection when
/// its confidence clears the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionHint {
    pub label: String,
    pub confidence: f32,
}
