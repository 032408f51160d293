use std::collections::VecDeque;

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decoder::{EndReason, EventStreamDecoder};
use crate::errors::StreamError;
use crate::transport::ByteStream;

/// Final result of one streamed reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Reply {
    /// Concatenation of every delivered fragment.
    pub message: String,
    /// Number of fragments delivered.
    pub fragments: usize,
    /// Why the stream ended; `None` if it was abandoned while streaming.
    pub end_reason: Option<EndReason>,
    /// Producer-reported finish reason (for example `stop`).
    pub finish_reason: Option<String>,
    /// Trailing bytes dropped because the stream closed mid-line.
    pub discarded_bytes: usize,
}

/// Pull-based reader for one streamed reply.
///
/// Owns the response body; dropping the session releases the connection.
/// Every delivered fragment replaces the value in the watch channel with the
/// full message so far.
pub struct ReplySession {
    bytes: ByteStream,
    decoder: EventStreamDecoder,
    queued: VecDeque<String>,
    message: String,
    delivered: usize,
    discarded_bytes: usize,
    observer: watch::Sender<String>,
}

impl ReplySession {
    pub fn new(bytes: ByteStream) -> Self {
        let (observer, _) = watch::channel(String::new());
        Self {
            bytes,
            decoder: EventStreamDecoder::new(),
            queued: VecDeque::new(),
            message: String::new(),
            delivered: 0,
            discarded_bytes: 0,
            observer,
        }
    }

    /// Subscribes to the assembled message.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.observer.subscribe()
    }

    /// Returns the next fragment, reading from the transport as needed.
    ///
    /// Fragments decoded before a read failure are always returned before the
    /// failure itself. After the error, or once the stream is done, this
    /// returns `Ok(None)`.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            if let Some(fragment) = self.queued.pop_front() {
                self.message.push_str(&fragment);
                self.delivered += 1;
                self.observer.send_replace(self.message.clone());
                return Ok(Some(fragment));
            }
            if self.decoder.is_done() {
                return Ok(None);
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    let feed = self.decoder.feed(&chunk);
                    self.queued.extend(feed.fragments);
                }
                Some(Err(err)) => {
                    warn!(error = %err, delivered = self.delivered, "reply stream read failed");
                    self.decoder.fail();
                    return Err(err);
                }
                None => {
                    let finish = self.decoder.finish();
                    self.discarded_bytes = finish.discarded_bytes;
                    debug!(
                        delivered = self.delivered,
                        discarded_bytes = finish.discarded_bytes,
                        "reply stream closed without termination sentinel"
                    );
                }
            }
        }
    }

    /// Message assembled from delivered fragments.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_done(&self) -> bool {
        self.decoder.is_done() && self.queued.is_empty()
    }

    /// Reads to the end and returns the reply.
    pub async fn collect(mut self) -> Result<Reply, StreamError> {
        while self.next_fragment().await?.is_some() {}
        Ok(self.into_reply())
    }

    pub fn into_reply(self) -> Reply {
        Reply {
            finish_reason: self.decoder.finish_reason().map(ToOwned::to_owned),
            end_reason: self.decoder.end_reason(),
            message: self.message,
            fragments: self.delivered,
            discarded_bytes: self.discarded_bytes,
        }
    }
}
