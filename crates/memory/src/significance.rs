//! Significance scoring at store time.
//!
//! Combines emotion intensity, novel-entity presence, life-event keywords,
//! message length, and explicit recall markers into one weighted score that
//! maps onto the four significance tiers.

use std::collections::HashMap;

use crate::schema::{SignificanceMetadata, SignificanceTier};

const LIFE_EVENT_WORDS: &[&str] = &[
    "job", "promoted", "hired", "fired", "moved", "moving", "married",
    "engaged", "divorced", "graduated", "baby", "born", "died", "lost",
    "diagnosed", "surgery", "retired", "house",
];

const RECALL_MARKERS: &[&str] = &[
    "remember that", "don't forget", "dont forget", "keep in mind",
    "remind me", "never forget",
];

/// Inputs the store already has in hand when scoring a turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignificanceInputs<'a> {
    pub content: &'a str,
    pub emotional_intensity: f32,
    /// True when the content surfaces an entity the store has not seen for
    /// this user (capitalized token heuristic at the call site).
    pub has_novel_entity: bool,
    /// True when the content references the user's own name.
    pub references_user_name: bool,
}

pub fn score_significance(inputs: SignificanceInputs<'_>) -> SignificanceMetadata {
    let lower = inputs.content.to_lowercase();
    let mut factors: HashMap<String, f32> = HashMap::new();

    factors.insert("emotion".to_string(), inputs.emotional_intensity.clamp(0.0, 1.0));

    if inputs.has_novel_entity {
        factors.insert("novelty".to_string(), 0.6);
    }

    let life_hits = LIFE_EVENT_WORDS
        .iter()
        .filter(|w| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == **w)
        })
        .count();
    if life_hits > 0 {
        factors.insert("life_event".to_string(), (0.5 + 0.2 * life_hits as f32).min(1.0));
    }

    if inputs.content.len() > 60 {
        factors.insert("length".to_string(), 0.3);
    }

    if RECALL_MARKERS.iter().any(|m| lower.contains(m)) {
        factors.insert("recall_marker".to_string(), 1.0);
    }

    if inputs.references_user_name {
        factors.insert("name_reference".to_string(), 0.4);
    }

    // Weighted blend; recall markers and life events dominate, emotion and
    // length contribute, nothing can push past 1.0.
    let overall = (factors.get("emotion").copied().unwrap_or(0.0) * 0.30
        + factors.get("novelty").copied().unwrap_or(0.0) * 0.15
        + factors.get("life_event").copied().unwrap_or(0.0) * 0.30
        + factors.get("length").copied().unwrap_or(0.0) * 0.10
        + factors.get("recall_marker").copied().unwrap_or(0.0) * 0.25
        + factors.get("name_reference").copied().unwrap_or(0.0) * 0.10)
        .clamp(0.0, 1.0);

    let tier = SignificanceTier::from_score(overall);

    // Defining memories resist decay almost entirely; ambient ones barely.
    let decay_resistance = match tier {
        SignificanceTier::Defining => 0.95,
        SignificanceTier::Notable => 0.7,
        SignificanceTier::Routine => 0.4,
        SignificanceTier::Ambient => 0.1,
    };

    SignificanceMetadata {
        overall_significance: overall,
        significance_factors: factors,
        significance_tier: tier,
        decay_resistance,
    }
}

/// Capitalized-token novelty heuristic used by the store: a token counts as a
/// candidate entity when it starts uppercase mid-sentence and is ≥ 3 chars.
pub fn candidate_entities(content: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let mut sentence_start = true;
    for token in content.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() >= 3
            && !sentence_start
            && cleaned.chars().next().is_some_and(|c| c.is_uppercase())
        {
            entities.push(cleaned.clone());
        }
        sentence_start = token.ends_with(['.', '!', '?']);
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(content: &str) -> SignificanceMetadata {
        score_significance(SignificanceInputs {
            content,
            ..Default::default()
        })
    }

    #[test]
    fn small_talk_is_ambient() {
        let meta = score("ok sounds good");
        assert_eq!(meta.significance_tier, SignificanceTier::Ambient);
    }

    #[test]
    fn life_event_raises_tier() {
        let meta = score("I just got a new job and we're moving next month");
        assert!(meta.significance_tier >= SignificanceTier::Routine);
        assert!(meta.significance_factors.contains_key("life_event"));
    }

    #[test]
    fn recall_marker_scores_high() {
        let meta = score_significance(SignificanceInputs {
            content: "Please remember that my sister's birthday is in June, don't forget it matters a lot to me",
            emotional_intensity: 0.6,
            has_novel_entity: true,
            references_user_name: false,
        });
        assert!(meta.overall_significance >= 0.5);
        assert_eq!(meta.significance_factors.get("recall_marker"), Some(&1.0));
    }

    #[test]
    fn length_factor_requires_over_sixty_chars() {
        let short = score("short");
        assert!(!short.significance_factors.contains_key("length"));
        let long = score(&"a".repeat(61));
        assert!(long.significance_factors.contains_key("length"));
    }

    #[test]
    fn overall_is_clamped_to_unit_interval() {
        let meta = score_significance(SignificanceInputs {
            content: "remember that I got married, had a baby, got promoted and bought a house don't forget",
            emotional_intensity: 1.0,
            has_novel_entity: true,
            references_user_name: true,
        });
        assert!(meta.overall_significance <= 1.0);
        assert_eq!(meta.significance_tier, SignificanceTier::Defining);
        assert!(meta.decay_resistance > 0.9);
    }

    #[test]
    fn decay_resistance_tracks_tier() {
        let ambient = score("ok");
        let defining = score_significance(SignificanceInputs {
            content: "remember that I just got married!",
            emotional_intensity: 0.9,
            has_novel_entity: false,
            references_user_name: false,
        });
        assert!(defining.decay_resistance > ambient.decay_resistance);
    }

    #[test]
    fn entities_skip_sentence_starts() {
        let entities = candidate_entities("Yesterday I met Sarah at the aquarium. Great day.");
        assert!(entities.contains(&"Sarah".to_string()));
        assert!(!entities.contains(&"Great".to_string()), "sentence-initial word is not an entity");
        assert!(!entities.contains(&"Yesterday".to_string()));
    }
}
