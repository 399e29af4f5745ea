//! Semantic key extraction.
//!
//! Keys come from a closed vocabulary of topical clusters; `general` is the
//! fallback.  The key is assigned at store time and drives semantic-vector
//! routing at query time.  It is deliberately *not* derived from the first
//! words of the text.

/// One topical cluster: the key plus the keywords that vote for it.
struct TopicCluster {
    key: &'static str,
    keywords: &'static [&'static str],
}

/// The closed semantic vocabulary.  Adding a cluster here is the only way to
/// grow the key space.
const CLUSTERS: &[TopicCluster] = &[
    TopicCluster {
        key: "marine_biology",
        keywords: &["ocean", "marine", "reef", "coral", "whale", "dolphin", "fish", "aquarium", "diving", "sea"],
    },
    TopicCluster {
        key: "academic_anxiety",
        keywords: &["exam", "finals", "thesis", "homework", "grades", "studying", "semester", "deadline", "professor"],
    },
    TopicCluster {
        key: "pet_identity",
        keywords: &["dog", "cat", "puppy", "kitten", "pet", "vet", "adopted", "hamster", "parrot"],
    },
    TopicCluster {
        key: "preference_food",
        keywords: &["food", "pizza", "sushi", "coffee", "tea", "cooking", "recipe", "restaurant", "vegetarian", "vegan"],
    },
    TopicCluster {
        key: "career",
        keywords: &["job", "work", "promotion", "interview", "boss", "salary", "office", "hired", "startup", "career"],
    },
    TopicCluster {
        key: "relocation",
        keywords: &["moving", "moved", "relocating", "apartment", "lease", "city", "neighborhood"],
    },
    TopicCluster {
        key: "health_fitness",
        keywords: &["gym", "running", "workout", "yoga", "sleep", "exercise", "marathon", "training"],
    },
    TopicCluster {
        key: "creative_projects",
        keywords: &["painting", "drawing", "writing", "novel", "music", "guitar", "song", "art", "poetry", "photography"],
    },
    TopicCluster {
        key: "technology",
        keywords: &["computer", "software", "coding", "programming", "laptop", "game", "gaming", "console", "robot"],
    },
    TopicCluster {
        key: "relationships_social",
        keywords: &["friend", "family", "sister", "brother", "mom", "dad", "partner", "wedding", "party"],
    },
    TopicCluster {
        key: "travel",
        keywords: &["trip", "travel", "vacation", "flight", "hotel", "visiting", "abroad", "passport"],
    },
    TopicCluster {
        key: "finance_personal",
        keywords: &["budget", "savings", "rent", "loan", "invest", "taxes", "paycheck"],
    },
];

pub const GENERAL_KEY: &str = "general";

/// Extract a semantic key for `content` by cluster keyword voting.  The
/// cluster with the most hits wins; ties break toward the earlier cluster in
/// the vocabulary; zero hits yields [`GENERAL_KEY`].
pub fn extract_semantic_key(content: &str) -> String {
    let lower = content.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut best: Option<(&str, usize)> = None;
    for cluster in CLUSTERS {
        let hits = tokens
            .iter()
            .filter(|t| cluster.keywords.contains(*t))
            .count();
        if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((cluster.key, hits));
        }
    }

    best.map(|(key, _)| key.to_string())
        .unwrap_or_else(|| GENERAL_KEY.to_string())
}

/// True when `key` names a cluster in the closed vocabulary (not `general`).
pub fn is_topical_key(key: &str) -> bool {
    CLUSTERS.iter().any(|c| c.key == key)
}

/// The full vocabulary, for diagnostics and config surfaces.
pub fn vocabulary() -> Vec<&'static str> {
    CLUSTERS.iter().map(|c| c.key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocean_text_maps_to_marine_biology() {
        assert_eq!(extract_semantic_key("I saw a whale near the coral reef"), "marine_biology");
    }

    #[test]
    fn exam_stress_maps_to_academic_anxiety() {
        assert_eq!(
            extract_semantic_key("my thesis deadline and finals are crushing me"),
            "academic_anxiety"
        );
    }

    #[test]
    fn unmatched_text_falls_back_to_general() {
        assert_eq!(extract_semantic_key("hmm interesting"), GENERAL_KEY);
    }

    #[test]
    fn key_is_never_first_three_words() {
        let key = extract_semantic_key("my dog ate my homework before finals");
        assert_ne!(key, "my dog ate");
        // Two clusters hit: pet_identity (dog) vs academic_anxiety (homework,
        // finals) — the higher vote count wins.
        assert_eq!(key, "academic_anxiety");
    }

    #[test]
    fn general_is_not_topical() {
        assert!(!is_topical_key(GENERAL_KEY));
        assert!(is_topical_key("marine_biology"));
    }

    #[test]
    fn vocabulary_is_closed_and_nonempty() {
        let vocab = vocabulary();
        assert!(vocab.len() >= 10);
        assert!(!vocab.contains(&GENERAL_KEY));
    }

    #[test]
    fn substring_matches_do_not_count() {
        // "seaside" contains "sea" as a substring but is not a token match.
        assert_eq!(extract_semantic_key("the seaside town was quiet"), GENERAL_KEY);
    }
}
