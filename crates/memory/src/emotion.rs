//! Keyword-lexicon emotion classification and per-user trajectory tracking.
//!
//! The lexicon path is the fallback: a caller-supplied classifier hint always
//! wins when its confidence clears the configured threshold.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::schema::{EmotionHint, EmotionMetadata, EmotionalMomentum};

/// How many recent labels the per-user trajectory retains.
pub const TRAJECTORY_WINDOW: usize = 10;

const JOY_WORDS: &[&str] = &[
    "happy", "joy", "excited", "thrilled", "delighted", "glad", "wonderful",
    "amazing", "fantastic", "great", "love", "celebrate", "yay",
];

const SADNESS_WORDS: &[&str] = &[
    "sad", "depressed", "down", "unhappy", "miserable", "crying", "cried",
    "grief", "heartbroken", "lonely", "miss", "lost",
];

const ANGER_WORDS: &[&str] = &[
    "angry", "furious", "mad", "annoyed", "irritated", "rage", "hate",
    "frustrated", "outraged",
];

const FEAR_WORDS: &[&str] = &[
    "afraid", "scared", "terrified", "fear", "frightened", "panic", "dread",
];

const SURPRISE_WORDS: &[&str] = &[
    "surprised", "shocked", "astonished", "unexpected", "unbelievable", "wow",
];

const DISGUST_WORDS: &[&str] = &[
    "disgusted", "gross", "revolting", "nasty", "awful", "repulsive",
];

const ANXIOUS_WORDS: &[&str] = &[
    "anxious", "nervous", "worried", "stressed", "overwhelmed", "uneasy",
    "restless", "tense",
];

/// A classified emotion with a rough intensity in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionReading {
    pub label: String,
    pub intensity: f32,
}

/// Classify `content` against the fixed lexicon.
///
/// Returns `None` when no emotion word matches — callers fall through to
/// semantic routing in that case.  Intensity grows with match count and
/// emphasis (exclamation marks, all-caps words), clamped to `[0, 1]`.
pub fn classify_keywords(content: &str) -> Option<EmotionReading> {
    let lower = content.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let lexicons: [(&str, &[&str]); 7] = [
        ("joy", JOY_WORDS),
        ("sadness", SADNESS_WORDS),
        ("anger", ANGER_WORDS),
        ("fear", FEAR_WORDS),
        ("surprise", SURPRISE_WORDS),
        ("disgust", DISGUST_WORDS),
        ("anxious", ANXIOUS_WORDS),
    ];

    let mut best: Option<(&str, usize)> = None;
    for (label, lexicon) in lexicons {
        let hits = words.iter().filter(|w| lexicon.contains(*w)).count();
        if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((label, hits));
        }
    }

    let (label, hits) = best?;

    let mut intensity = 0.3 + 0.15 * hits as f32;
    let exclamations = content.chars().filter(|&c| c == '!').count() as f32;
    intensity += (exclamations * 0.05).min(0.15);
    for word in content.split_whitespace() {
        let alpha: String = word.chars().filter(|c| c.is_alphabetic()).collect();
        if alpha.len() >= 4 && alpha == alpha.to_uppercase() {
            intensity += 0.05;
        }
    }

    Some(EmotionReading {
        label: label.to_string(),
        intensity: intensity.clamp(0.0, 1.0),
    })
}

/// Resolve the authoritative emotion for a turn: hint first (when it clears
/// `confidence_threshold`), then the keyword lexicon, then neutral.
pub fn resolve_emotion(
    content: &str,
    hint: Option<&EmotionHint>,
    confidence_threshold: f32,
) -> EmotionReading {
    if let Some(hint) = hint {
        if hint.confidence >= confidence_threshold {
            return EmotionReading {
                label: hint.label.clone(),
                intensity: hint.confidence.clamp(0.0, 1.0),
            };
        }
    }
    classify_keywords(content).unwrap_or(EmotionReading {
        label: "neutral".to_string(),
        intensity: 0.0,
    })
}

/// Per-user rolling emotion state.  One tracker instance lives inside the
/// memory store; it is not persisted — the trajectory snapshot on each entry
/// is the durable record.
#[derive(Debug, Default)]
pub struct EmotionTracker {
    history: HashMap<String, VecDeque<EmotionReading>>,
}

impl EmotionTracker {
    /// Record a new reading for `user_id` and return the full metadata block
    /// (trajectory, velocity, momentum, stability) for the entry being stored.
    pub fn observe(&mut self, user_id: &str, reading: EmotionReading) -> EmotionMetadata {
        let window = self.history.entry(user_id.to_string()).or_default();

        let velocity = window
            .back()
            .map(|prev| (reading.intensity - prev.intensity).clamp(-1.0, 1.0))
            .unwrap_or(0.0);
        let prev_velocity = if window.len() >= 2 {
            let prev = &window[window.len() - 1];
            let before = &window[window.len() - 2];
            prev.intensity - before.intensity
        } else {
            0.0
        };

        let momentum = classify_momentum(prev_velocity, velocity);

        window.push_back(reading.clone());
        while window.len() > TRAJECTORY_WINDOW {
            window.pop_front();
        }

        let trajectory: Vec<String> = window.iter().map(|r| r.label.clone()).collect();
        let stability = label_stability(&trajectory);

        EmotionMetadata {
            primary_emotion: reading.label,
            emotional_intensity: reading.intensity,
            emotional_trajectory: trajectory,
            emotional_velocity: velocity,
            emotional_momentum: momentum,
            emotional_stability: stability,
        }
    }
}

fn classify_momentum(prev_velocity: f32, velocity: f32) -> EmotionalMomentum {
    // Sign flip on a meaningful swing reads as a reversal; otherwise compare
    // magnitude against the previous step.
    if prev_velocity * velocity < -0.01 {
        EmotionalMomentum::Reversing
    } else if velocity.abs() > prev_velocity.abs() + 0.05 {
        EmotionalMomentum::Accelerating
    } else if velocity.abs() + 0.05 < prev_velocity.abs() {
        EmotionalMomentum::Decelerating
    } else {
        EmotionalMomentum::Steady
    }
}

/// Fraction of the trajectory occupied by its dominant label.
fn label_stability(trajectory: &[String]) -> f32 {
    if trajectory.is_empty() {
        return 1.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in trajectory {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f32 / trajectory.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joy_words_classify_as_joy() {
        let reading = classify_keywords("I'm feeling really happy today!").unwrap();
        assert_eq!(reading.label, "joy");
        assert!(reading.intensity > 0.0);
    }

    #[test]
    fn anxious_words_classify_as_anxious() {
        let reading = classify_keywords("so stressed and worried about finals").unwrap();
        assert_eq!(reading.label, "anxious");
    }

    #[test]
    fn neutral_text_yields_none() {
        assert!(classify_keywords("the meeting is at three").is_none());
    }

    #[test]
    fn hint_wins_over_keywords_when_confident() {
        let hint = EmotionHint { label: "sadness".to_string(), confidence: 0.9 };
        let reading = resolve_emotion("I'm so happy!", Some(&hint), 0.7);
        assert_eq!(reading.label, "sadness");
    }

    #[test]
    fn low_confidence_hint_falls_back_to_keywords() {
        let hint = EmotionHint { label: "sadness".to_string(), confidence: 0.3 };
        let reading = resolve_emotion("I'm so happy!", Some(&hint), 0.7);
        assert_eq!(reading.label, "joy");
    }

    #[test]
    fn no_hint_no_keywords_is_neutral() {
        let reading = resolve_emotion("the meeting is at three", None, 0.7);
        assert_eq!(reading.label, "neutral");
        assert_eq!(reading.intensity, 0.0);
    }

    #[test]
    fn intensity_is_clamped() {
        let reading =
            classify_keywords("HAPPY HAPPY JOY LOVE AMAZING WONDERFUL GREAT!!!!!").unwrap();
        assert!(reading.intensity <= 1.0);
    }

    #[test]
    fn trajectory_is_bounded_to_window() {
        let mut tracker = EmotionTracker::default();
        for _ in 0..15 {
            tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.5 });
        }
        let meta = tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.5 });
        assert_eq!(meta.emotional_trajectory.len(), TRAJECTORY_WINDOW);
    }

    #[test]
    fn velocity_reflects_intensity_delta() {
        let mut tracker = EmotionTracker::default();
        tracker.observe("u1", EmotionReading { label: "neutral".to_string(), intensity: 0.2 });
        let meta = tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.8 });
        assert!((meta.emotional_velocity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn reversal_is_detected_on_sign_flip() {
        let mut tracker = EmotionTracker::default();
        tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.2 });
        tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.8 });
        let meta = tracker.observe("u1", EmotionReading { label: "sadness".to_string(), intensity: 0.3 });
        assert_eq!(meta.emotional_momentum, EmotionalMomentum::Reversing);
    }

    #[test]
    fn stability_is_one_for_uniform_trajectory() {
        let mut tracker = EmotionTracker::default();
        for _ in 0..5 {
            tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.5 });
        }
        let meta = tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.5 });
        assert_eq!(meta.emotional_stability, 1.0);
    }

    #[test]
    fn trackers_are_isolated_per_user() {
        let mut tracker = EmotionTracker::default();
        tracker.observe("u1", EmotionReading { label: "joy".to_string(), intensity: 0.9 });
        let meta = tracker.observe("u2", EmotionReading { label: "sadness".to_string(), intensity: 0.4 });
        assert_eq!(meta.emotional_trajectory, vec!["sadness".to_string()]);
        assert_eq!(meta.emotional_velocity, 0.0);
    }
}
