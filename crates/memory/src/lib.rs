//! Bot-scoped, multi-vector conversational memory.
//!
//! Each bot process owns one physical collection
//! (`whisperengine_memory_<bot>`); every entry carries seven named 384-dim
//! vectors and emotion/significance metadata derived at store time.

pub mod emotion;
pub mod index;
pub mod qdrant;
pub mod retrieval;
pub mod schema;
pub mod self_memory;
pub mod semantic;
pub mod session;
pub mod significance;
pub mod store;
pub mod summary;

pub use index::{
    HealthStatus, InMemoryIndex, MemoryError, MemoryPoint, ScoredMemory, SearchQuery, VectorIndex,
};
pub use qdrant::QdrantIndex;
pub use retrieval::{FidelityOptions, VectorRoute, route_query};
pub use schema::{
    EmotionHint, EmotionMetadata, EmotionalMomentum, MemoryEntry, MemoryRole, MemoryType,
    NamedVector, RetrievedMemory, SearchType, SignificanceMetadata, SignificanceTier,
};
pub use self_memory::{BotSelfMemory, SelfReflection};
pub use session::{Session, SessionManager, SessionTurn};
pub use store::{ConversationMetadata, LastInteraction, MemoryStore};
pub use summary::{ConversationSummary, summarize_conversation};
