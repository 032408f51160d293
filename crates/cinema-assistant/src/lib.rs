//! Streaming client for the cinema assistant chat service.
//!
//! The chat endpoint answers with a chunked body of `data: <json>` lines in
//! the chat-completions delta format, terminated by `data: [DONE]`. This crate
//! decodes that body incrementally and assembles the assistant's message as
//! fragments arrive.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cinema_assistant::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let assistant = Assistant::builder()
//!     .transport(Arc::new(ChatClient::from_env()?))
//!     .build()?;
//!
//! let mut conversation = Conversation::new();
//! let mut reply = assistant.ask(&mut conversation, "من هي سيدة الشاشة العربية؟").await?;
//! while let Some(event) = reply.next_event().await {
//!     if let StreamEvent::Fragment { text, .. } = event {
//!         print!("{text}");
//!     }
//! }
//! let reply = reply.finish().await?;
//! conversation.record_reply(reply.message);
//! # Ok(())
//! # }
//! ```
//!
//! The decoder can also be driven directly, without any runtime:
//!
//! ```
//! use cinema_assistant::EventStreamDecoder;
//!
//! let mut decoder = EventStreamDecoder::new();
//! let feed = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: [DONE]\n");
//! assert_eq!(feed.fragments, vec!["Hi"]);
//! assert!(feed.done);
//! ```

/// Question/answer runtime, streaming handle, and cancellation handle.
pub mod assistant;
/// HTTP transport for the hosted chat function.
pub mod client;
/// Chat client configuration.
pub mod config;
/// Chat history and request types.
pub mod conversation;
/// Incremental `data:` event-stream decoder.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Field extraction from decoded event payloads.
pub mod payload;
/// Common imports for typical usage.
pub mod prelude;
/// Pull-based reader for one streamed reply.
pub mod session;
/// Normalized public stream events.
pub mod stream;
/// Transport seam between the runtime and HTTP.
pub mod transport;

pub use assistant::{AbortHandle, Assistant, AssistantBuilder, ReplyStream};
pub use client::ChatClient;
pub use config::ChatClientConfig;
pub use conversation::{ChatMessage, ChatRequest, Conversation, ReplyOptions, Role};
pub use decoder::{DecoderState, EndReason, EventStreamDecoder, Feed, Finish};
pub use errors::StreamError;
pub use session::{Reply, ReplySession};
pub use stream::StreamEvent;
pub use transport::{ByteStream, ChatTransport};
