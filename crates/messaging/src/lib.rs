//! Messaging adapter contract, inbound gatekeeping, and outbound chunking.

pub mod adapter;
pub mod chunking;
pub mod guards;
pub mod types;

pub use adapter::{AdapterError, MessagingAdapter};
pub use chunking::{MAX_CHUNK, chunk_message};
pub use guards::{
    CrosspostDetector, CrosspostVerdict, IngressPolicy, IngressVerdict, MAX_INBOUND_CHARS,
};
pub use types::{
    ActionCommand, ActionType, Attachment, ChannelInfo, ContextMessage, ForwardedMessage,
    InboundMessage, MessageReference, MessageSnapshot, Sticker,
};
