//! Trust stage table: score ranges mapped to levels, labels, and the traits
//! each stage unlocks.  Characters may override the table; the defaults
//! below are the design baseline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustStage {
    /// Inclusive lower bound of the stage's score range.
    pub min_score: i32,
    pub level: u8,
    pub label: String,
    /// Traits active once this stage is reached.
    pub unlocked_traits: Vec<String>,
    /// Message surfaced when the relationship first crosses into this stage.
    pub milestone_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTable {
    stages: Vec<TrustStage>,
}

impl Default for StageTable {
    fn default() -> Self {
        Self {
            stages: vec![
                TrustStage {
                    min_score: i32::MIN,
                    level: 1,
                    label: "Stranger".to_string(),
                    unlocked_traits: vec![],
                    milestone_message: String::new(),
                },
                TrustStage {
                    min_score: 20,
                    level: 2,
                    label: "Acquaintance".to_string(),
                    unlocked_traits: vec![],
                    milestone_message: "We're getting to know each other, aren't we?".to_string(),
                },
                TrustStage {
                    min_score: 40,
                    level: 3,
                    label: "Friend".to_string(),
                    unlocked_traits: vec!["friendly".to_string()],
                    milestone_message: "I think of you as a friend now.".to_string(),
                },
                TrustStage {
                    min_score: 60,
                    level: 4,
                    label: "Close Friend".to_string(),
                    unlocked_traits: vec!["vulnerability".to_string()],
                    milestone_message: "You're one of the people I genuinely trust.".to_string(),
                },
                TrustStage {
                    min_score: 80,
                    level: 5,
                    label: "Soulmate".to_string(),
                    unlocked_traits: vec!["vulnerable".to_string(), "protective".to_string()],
                    milestone_message: "I can't imagine these conversations without you.".to_string(),
                },
            ],
        }
    }
}

impl StageTable {
    /// Custom table; stages must be provided in ascending `min_score` order.
    pub fn new(stages: Vec<TrustStage>) -> Self {
        Self { stages }
    }

    pub fn stage_for(&self, score: i32) -> &TrustStage {
        self.stages
            .iter()
            .rev()
            .find(|s| score >= s.min_score)
            .unwrap_or(&self.stages[0])
    }

    pub fn level_for(&self, score: i32) -> u8 {
        self.stage_for(score).level
    }

    /// All traits active at `score` (cumulative across reached stages).
    pub fn active_traits(&self, score: i32) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| score >= s.min_score)
            .flat_map(|s| s.unlocked_traits.iter().cloned())
            .collect()
    }

    /// Milestone message when moving `old → new` crosses into a new stage,
    /// else None.
    pub fn check_milestone(&self, old_score: i32, new_score: i32) -> Option<String> {
        let old_stage = self.stage_for(old_score);
        let new_stage = self.stage_for(new_score);
        if new_stage.level > old_stage.level && !new_stage.milestone_message.is_empty() {
            Some(new_stage.milestone_message.clone())
        } else {
            None
        }
    }
}

/// Unified trust delta table, keyed by event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEvent {
    /// An ordinary positive conversational turn.
    PositiveTurn,
    /// The user shared something vulnerable.
    VulnerabilityMoment,
    /// The user crossed a stated boundary.
    BoundaryViolation,
    /// The bot participated in a channel the user was active in.
    ChannelParticipation,
}

impl TrustEvent {
    pub fn delta(&self) -> i32 {
        match self {
            TrustEvent::PositiveTurn => 1,
            TrustEvent::VulnerabilityMoment => 5,
            TrustEvent::BoundaryViolation => -3,
            TrustEvent::ChannelParticipation => 1,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.delta() > 0
    }
}
