use std::pin::Pin;

use crate::conversation::ChatRequest;
use crate::errors::StreamError;

/// Raw response body chunks in arrival order.
///
/// Read failures are reported as `StreamError::Read`.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamError>> + Send + 'static>>;

/// Opens a streamed chat response for a request.
///
/// Implementations must surface non-success responses as
/// `StreamError::Upstream` here, before any body bytes are handed out.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, StreamError>;
}
