//! Redis-backed task queue, broker key layout, and the pending-artifact
//! registry.

pub mod artifacts;
pub mod broker;
pub mod keys;
pub mod queue;

pub use artifacts::{ArtifactRegistry, PendingArtifact};
pub use broker::{Broker, BrokerError, InMemoryBroker, RedisBroker};
pub use keys::KeyLayout;
pub use queue::{
    HandlerRegistry, Job, JobHandler, MAX_ATTEMPTS, QueueName, TaskQueue, run_worker,
};
