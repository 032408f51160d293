use crate::errors::StreamError;
use crate::session::Reply;

/// Normalized events exposed by `ReplyStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// First event for every reply.
    Started { reply_id: uuid::Uuid },
    /// Incremental text fragment.
    Fragment {
        reply_id: uuid::Uuid,
        seq: u64,
        text: String,
    },
    /// Terminal success event with the assembled reply.
    Completed { reply_id: uuid::Uuid, reply: Reply },
    /// Terminal failure event.
    Failed {
        reply_id: uuid::Uuid,
        error: StreamError,
    },
}

impl StreamEvent {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
