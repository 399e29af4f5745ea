//! Extractive conversation summarization.
//!
//! Sentences are scored by embedding centrality (mean cosine against every
//! other sentence), deduplicated by cosine similarity, and the top scorers
//! become the summary.  No templates: the output is always sentences the
//! user or bot actually said.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use whisperengine_embedding::{Embedder, cosine_similarity};

use crate::emotion::classify_keywords;
use crate::semantic::{GENERAL_KEY, extract_semantic_key};

/// Sentences closer than this are considered duplicates.
const DEDUP_COSINE: f32 = 0.92;
/// Sentences shorter than this carry too little signal to rank.
const MIN_SENTENCE_CHARS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub topic_summary: String,
    pub conversation_themes: Vec<String>,
    pub method: String,
    pub sentences_analyzed: usize,
    pub emotions_detected: Vec<String>,
}

/// Summarize `conversation_history` (raw turn contents, oldest first) into at
/// most `limit` central sentences.
pub async fn summarize_conversation(
    embedder: &dyn Embedder,
    conversation_history: &[String],
    limit: usize,
) -> ConversationSummary {
    let mut sentences: Vec<String> = Vec::new();
    for turn in conversation_history {
        for raw in split_sentences(turn) {
            let trimmed = raw.trim();
            if trimmed.len() >= MIN_SENTENCE_CHARS {
                sentences.push(trimmed.to_string());
            }
        }
    }

    let themes: Vec<String> = {
        let mut seen = BTreeSet::new();
        conversation_history
            .iter()
            .map(|t| extract_semantic_key(t))
            .filter(|k| k != GENERAL_KEY)
            .filter(|k| seen.insert(k.clone()))
            .collect()
    };

    let emotions: Vec<String> = {
        let mut seen = BTreeSet::new();
        conversation_history
            .iter()
            .filter_map(|t| classify_keywords(t))
            .map(|r| r.label)
            .filter(|l| seen.insert(l.clone()))
            .collect()
    };

    if sentences.is_empty() {
        return ConversationSummary {
            topic_summary: String::new(),
            conversation_themes: themes,
            method: "extractive_centrality".to_string(),
            sentences_analyzed: 0,
            emotions_detected: emotions,
        };
    }

    let embeddings = match embedder.embed(&sentences).await {
        Ok(e) => e,
        Err(err) => {
            warn!(%err, "summary embedding failed; falling back to first sentences");
            let summary = sentences
                .iter()
                .take(limit)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            return ConversationSummary {
                topic_summary: summary,
                conversation_themes: themes,
                method: "extractive_first_sentences".to_string(),
                sentences_analyzed: sentences.len(),
                emotions_detected: emotions,
            };
        }
    };

    // Centrality: mean cosine of each sentence against every other.
    let mut scored: Vec<(usize, f32)> = embeddings
        .iter()
        .enumerate()
        .map(|(i, emb)| {
            let mut sum = 0.0;
            let mut n = 0;
            for (j, other) in embeddings.iter().enumerate() {
                if i != j {
                    sum += cosine_similarity(emb, other);
                    n += 1;
                }
            }
            (i, if n > 0 { sum / n as f32 } else { 0.0 })
        })
        .collect();
    scored.sort_by(|(ai, a), (bi, b)| b.total_cmp(a).then_with(|| ai.cmp(bi)));

    // Greedy selection with cosine dedup.
    let mut selected: Vec<usize> = Vec::new();
    for (idx, _) in scored {
        if selected.len() >= limit {
            break;
        }
        let duplicate = selected
            .iter()
            .any(|&s| cosine_similarity(&embeddings[idx], &embeddings[s]) > DEDUP_COSINE);
        if !duplicate {
            selected.push(idx);
        }
    }
    // Present in original conversation order for readability.
    selected.sort();

    let topic_summary = selected
        .iter()
        .map(|&i| sentences[i].clone())
        .collect::<Vec<_>>()
        .join(" ");

    ConversationSummary {
        topic_summary,
        conversation_themes: themes,
        method: "extractive_centrality".to_string(),
        sentences_analyzed: sentences.len(),
        emotions_detected: emotions,
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(current.clone());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}
