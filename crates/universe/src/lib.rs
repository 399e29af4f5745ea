//! Cross-bot event bus ("universe"): rule-based detection, privacy
//! gatekeeping, and gossip memory construction.

pub mod bus;
pub mod detector;
pub mod event;

pub use bus::{
    PublishOutcome, ShareWithConsent, SharingPolicy, UniverseBus, UniverseMetrics, gossip_entry,
};
pub use detector::detect_event;
pub use event::{EventType, MAX_PROPAGATION_DEPTH, SENSITIVE_TOPICS, UniverseEvent};
