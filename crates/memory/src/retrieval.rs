//! Fidelity-first retrieval: vector routing, intelligent re-ranking, and
//! graduated filtering.
//!
//! Guiding principle: preserve character and conversation nuance; reduce only
//! when a context budget forces it.
//!
//! Intelligent ranking blends (weights sum to 1.0):
//! ```text
//! score = cosine(0.45) + tier(0.20) + recency(0.15) + nuance(0.12) + emotion(0.08)
//! ```
//! Every signal is additive — no signal can zero out another.

use chrono::{DateTime, Utc};

use crate::emotion::classify_keywords;
use crate::index::ScoredMemory;
use crate::schema::{
    EmotionHint, NamedVector, RetrievedMemory, SearchType, SignificanceTier,
};
use crate::semantic::{extract_semantic_key, is_topical_key};

/// Where a query was routed and why.
#[derive(Debug, Clone)]
pub struct VectorRoute {
    pub vector: NamedVector,
    pub search_type: SearchType,
    /// `roberta:<label>` | `keyword_detection` | `semantic_routing` |
    /// `content_default`.
    pub emotion_source: String,
    /// Emotion label driving the routed query text, when emotional.
    pub emotion_label: Option<String>,
    /// Semantic key driving the routed query text, when topical.
    pub semantic_key: Option<String>,
}

/// Route a query to its primary facet: classifier hint first, then the
/// keyword lexicon, then the semantic vocabulary, then plain content.
pub fn route_query(
    query: &str,
    hint: Option<&EmotionHint>,
    confidence_threshold: f32,
) -> VectorRoute {
    if let Some(hint) = hint {
        if hint.confidence >= confidence_threshold {
            return VectorRoute {
                vector: NamedVector::Emotion,
                search_type: SearchType::Emotion,
                emotion_source: format!("roberta:{}", hint.label),
                emotion_label: Some(hint.label.clone()),
                semantic_key: None,
            };
        }
    }

    if let Some(reading) = classify_keywords(query) {
        return VectorRoute {
            vector: NamedVector::Emotion,
            search_type: SearchType::Emotion,
            emotion_source: "keyword_detection".to_string(),
            emotion_label: Some(reading.label),
            semantic_key: None,
        };
    }

    let key = extract_semantic_key(query);
    if is_topical_key(&key) {
        return VectorRoute {
            vector: NamedVector::Semantic,
            search_type: SearchType::Semantic,
            emotion_source: "semantic_routing".to_string(),
            emotion_label: None,
            semantic_key: Some(key),
        };
    }

    VectorRoute {
        vector: NamedVector::Content,
        search_type: SearchType::Content,
        emotion_source: "content_default".to_string(),
        emotion_label: None,
        semantic_key: None,
    }
}

/// Knobs for [`crate::store::MemoryStore::retrieve_relevant_memories_fidelity_first`].
#[derive(Debug, Clone)]
pub struct FidelityOptions {
    pub limit: usize,
    pub full_fidelity: bool,
    pub intelligent_ranking: bool,
    pub graduated_filtering: bool,
    pub preserve_character_nuance: bool,
    /// Total character budget across returned contents; graduated filtering
    /// only engages when this is set.
    pub context_char_budget: Option<usize>,
    pub emotion_hint: Option<EmotionHint>,
}

impl Default for FidelityOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            full_fidelity: true,
            intelligent_ranking: true,
            graduated_filtering: true,
            preserve_character_nuance: true,
            context_char_budget: None,
            emotion_hint: None,
        }
    }
}

/// Over-fetch factor applied to the primary recall before re-ranking.
pub const OVERFETCH_FACTOR: usize = 3;

fn tier_boost(tier: SignificanceTier) -> f32 {
    match tier {
        SignificanceTier::Defining => 1.0,
        SignificanceTier::Notable => 0.66,
        SignificanceTier::Routine => 0.33,
        SignificanceTier::Ambient => 0.0,
    }
}

/// Half-life ~48 h: fresh memories ≈ 1.0, a week old ≈ 0.22.
fn recency_score(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> f32 {
    let age_hours = (now - timestamp).num_seconds().max(0) as f32 / 3600.0;
    1.0 / (1.0 + age_hours / 48.0)
}

fn emotional_alignment(query_emotion: Option<&str>, memory_emotion: &str) -> f32 {
    match query_emotion {
        Some(q) if q == memory_emotion => 1.0,
        Some(_) if memory_emotion != "neutral" => 0.4,
        _ => 0.0,
    }
}

/// Re-rank primary hits with the weighted blend.  When `intelligent` is
/// false the primary cosine ordering is kept as-is.
pub fn rank_hits(
    hits: Vec<ScoredMemory>,
    query_emotion: Option<&str>,
    now: DateTime<Utc>,
    intelligent: bool,
) -> Vec<(ScoredMemory, f32)> {
    let mut ranked: Vec<(ScoredMemory, f32)> = hits
        .into_iter()
        .map(|hit| {
            let combined = if intelligent {
                let nuance = hit.personality_alignment.unwrap_or(0.0).max(0.0);
                hit.score * 0.45
                    + tier_boost(hit.entry.significance.significance_tier) * 0.20
                    + recency_score(now, hit.entry.timestamp) * 0.15
                    + nuance * 0.12
                    + emotional_alignment(query_emotion, &hit.entry.emotion.primary_emotion) * 0.08
            } else {
                hit.score
            };
            (hit, combined)
        })
        .collect();

    // Ties: higher significance tier, then newer, then smaller id — stable
    // determinism across runs.
    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.total_cmp(sa)
            .then_with(|| {
                b.entry
                    .significance
                    .significance_tier
                    .cmp(&a.entry.significance.significance_tier)
            })
            .then_with(|| b.entry.timestamp.cmp(&a.entry.timestamp))
            .then_with(|| a.entry.id.cmp(&b.entry.id))
    });
    ranked
}

/// Apply the graduated context-budget filter in place.
///
/// Drops Ambient entries first, then Routine; Notable and Defining are never
/// dropped.  If the set still exceeds the budget, per-entry content is
/// truncated (fields are never dropped) and those entries are marked
/// `fidelity_preserved = false`.
pub fn graduated_filter(results: &mut Vec<RetrievedMemory>, budget: usize) {
    let total = |rs: &[RetrievedMemory]| -> usize {
        rs.iter().map(|r| r.entry.content.len()).sum()
    };

    for droppable in [SignificanceTier::Ambient, SignificanceTier::Routine] {
        while total(results) > budget {
            // Drop the lowest-ranked entry of the droppable tier.
            let Some(pos) = results
                .iter()
                .rposition(|r| r.entry.significance.significance_tier == droppable)
            else {
                break;
            };
            results.remove(pos);
        }
    }

    if results.is_empty() || total(results) <= budget {
        return;
    }

    // Still over budget: truncate contents proportionally, floor 80 chars so
    // every surviving memory stays intelligible.
    let per_entry = (budget / results.len()).max(80);
    for result in results.iter_mut() {
        if result.entry.content.len() > per_entry {
            let mut cut = per_entry;
            while cut > 0 && !result.entry.content.is_char_boundary(cut) {
                cut -= 1;
            }
            result.entry.content.truncate(cut);
            result.fidelity_preserved = false;
        }
    }
}
