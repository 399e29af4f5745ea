//! Rule-based event detection over the user's turn.
//!
//! Runs on the response hot path, so detection is compiled-regex only — no
//! model calls.  Summaries are template text, never the raw message.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::event::{EventType, UniverseEvent};

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static pattern compiles")
}

static POSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        ci(r"\b(so happy|really excited|amazing news|great news|best day)\b"),
        ci(r"\b(i got|just got|we got)\b.{0,30}\b(promoted|job|offer|accepted)\b"),
        ci(r"\b(engaged|getting married|had a baby|expecting)\b"),
        ci(r"\b(finally|at last)\b.{0,20}\b(did it|made it|finished|completed)\b"),
    ]
});

static NEGATIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        ci(r"\b(so sad|really upset|terrible news|awful|devastated)\b"),
        ci(r"\b(i lost|just lost|we lost)\b.{0,30}\b(job|pet|someone|mom|dad|friend)\b"),
        ci(r"\b(broke up|got fired|laid off|diagnosed)\b"),
        ci(r"\b(don't know what to do|feel hopeless|at my lowest)\b"),
    ]
});

static LIFE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (ci(r"\b(got a new job|started new job|got promoted|got hired)\b"), "career"),
        (ci(r"\b(moving to|moved to|relocating to|just moved)\b"), "relocation"),
        (ci(r"\b(graduating|graduated|finished school|got my degree)\b"), "education"),
        (ci(r"\b(engaged|getting married|got married|wedding)\b"), "partnership"),
        (ci(r"\b(having a baby|pregnant|expecting|new baby)\b"), "family"),
        (ci(r"\b(bought a house|new home|closing on|first house)\b"), "home"),
    ]
});

fn life_summary(topic: &str) -> &'static str {
    match topic {
        "career" => "has news about their career",
        "relocation" => "is moving or has moved",
        "education" => "has education news",
        "partnership" => "has news about their partnership",
        "family" => "has family news",
        "home" => "has news about their home",
        _ => "shared some personal news",
    }
}

/// Scan one user turn for a publishable event.  Emotional spikes win over
/// life updates when both match.
pub fn detect_event(user_id: &str, message: &str, source_bot: &str) -> Option<UniverseEvent> {
    if POSITIVE_PATTERNS.iter().any(|p| p.is_match(message)) {
        let mut event = UniverseEvent::new(
            EventType::EmotionalSpike,
            user_id,
            source_bot,
            "is feeling very happy about something",
            "positive_emotion",
        );
        event
            .metadata
            .insert("sentiment".to_string(), serde_json::json!("positive"));
        return Some(event);
    }

    if NEGATIVE_PATTERNS.iter().any(|p| p.is_match(message)) {
        // Still classify which negative pattern fired so the sensitivity
        // filter sees a meaningful topic (e.g. "diagnosed" → health).
        let topic = if ci(r"\b(diagnosed)\b").is_match(message) {
            "health"
        } else {
            "negative_emotion"
        };
        let mut event = UniverseEvent::new(
            EventType::EmotionalSpike,
            user_id,
            source_bot,
            "seems to be going through a tough time",
            topic,
        );
        event
            .metadata
            .insert("sentiment".to_string(), serde_json::json!("negative"));
        return Some(event);
    }

    for (pattern, topic) in LIFE_PATTERNS.iter() {
        if pattern.is_match(message) {
            return Some(UniverseEvent::new(
                EventType::UserUpdate,
                user_id,
                source_bot,
                life_summary(topic),
                *topic,
            ));
        }
    }

    None
}
