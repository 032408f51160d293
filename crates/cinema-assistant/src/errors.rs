/// Errors surfaced by the assistant client.
///
/// Parsing-level anomalies (truncated JSON, unrecognized lines) never appear
/// here; the decoder absorbs them. Everything in this enum ends the reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid request built by the caller.
    #[error("validation error: {0}")]
    Validation(String),
    /// The request could not be sent (connect, TLS, DNS).
    #[error("request error: {0}")]
    Request(String),
    /// The chat service answered with a non-success status before streaming.
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    /// Reading the response body failed mid-stream.
    #[error("stream read error: {message}")]
    Read { message: String },
    /// The caller cancelled the reply.
    #[error("reply cancelled")]
    Cancelled,
    /// The caller-imposed timeout elapsed before the reply ended.
    #[error("reply timed out")]
    TimedOut,
    /// Internal runtime invariant violated.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StreamError {
    /// Creates a mid-stream read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Creates an upstream application error.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns `true` for errors raised after streaming started.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Returns the HTTP status for upstream failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
