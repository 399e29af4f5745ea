//! The daily-life autonomous behavior loop: sensory snapshots, the
//! perceive→plan→execute remote brain, the action poller, and standalone
//! emoji reactions.

pub mod activity;
pub mod graph;
pub mod models;
pub mod poller;
pub mod reactions;
pub mod scheduler;

pub use activity::ActivityMonitor;
pub use graph::{DailyLifeGraph, GraphDeps, ResponseEngine, ResponseRequest};
pub use models::{
    ChannelSnapshot, PlanIntent, PlannedAction, ScoredMessage, SensorySnapshot,
    PERCEIVE_TOP_K, PERCEIVE_WINDOW_MINUTES, QUIET_POST_PROBABILITY, RELEVANCE_THRESHOLD,
};
pub use poller::ActionPoller;
pub use reactions::{MessageAnalysis, ReactionAgent, ReactionDecision, analyze_message};
pub use scheduler::DailyLifeScheduler;
