//! Common imports for typical assistant usage.
//!
//! Exports the types most callers need to ask a question and consume the
//! streamed reply.
pub use crate::{
    AbortHandle, Assistant, ChatClient, ChatClientConfig, ChatMessage, ChatRequest, Conversation,
    EndReason, Reply, ReplyStream, Role, StreamError, StreamEvent,
};
