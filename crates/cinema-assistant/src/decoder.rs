//! Incremental decoder for the chat endpoint's `data:`-framed event stream.
//!
//! The decoder is fed raw chunks in arrival order. Chunks may split lines,
//! JSON payloads and multi-byte UTF-8 characters at any byte offset; bytes are
//! buffered until a full line is available and only then decoded as text.
//!
//! Per line:
//!
//! - a single trailing `\r` is stripped;
//! - blank lines and `:` comments are dropped;
//! - lines without the literal `data: ` prefix are dropped;
//! - `data: [DONE]` ends the stream;
//! - any other payload is parsed as JSON and `choices[0].delta.content` is
//!   appended to the assembled message.
//!
//! A payload that fails to parse is left at the front of the pending buffer,
//! verbatim, and extraction stops until the next chunk arrives.

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::payload;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Lifecycle of a decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// Accepting chunks.
    Streaming,
    /// Terminal. Further chunks are ignored.
    Done,
}

/// Why a decoder reached [`DecoderState::Done`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The producer sent `data: [DONE]`.
    Sentinel,
    /// The transport closed without a sentinel.
    EndOfStream,
    /// The transport failed while reading.
    TransportError,
}

/// Result of a single [`EventStreamDecoder::feed`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Feed {
    /// Fragments decoded from this chunk, in stream order.
    pub fragments: Vec<String>,
    /// `true` once the decoder is done; no further chunks are expected.
    pub done: bool,
}

/// Result of [`EventStreamDecoder::finish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Finish {
    /// Bytes left in the pending buffer that never formed a usable line.
    pub discarded_bytes: usize,
}

/// Incremental parser turning raw chunks into text fragments.
#[derive(Debug)]
pub struct EventStreamDecoder {
    pending: Vec<u8>,
    message: String,
    state: DecoderState,
    end_reason: Option<EndReason>,
    finish_reason: Option<String>,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamDecoder {
    /// Creates a decoder in the streaming state.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            message: String::new(),
            state: DecoderState::Streaming,
            end_reason: None,
            finish_reason: None,
        }
    }

    /// Appends a chunk and drains every complete line it makes available.
    ///
    /// After the decoder is done this is a no-op that returns an empty
    /// [`Feed`] with `done` set.
    pub fn feed(&mut self, chunk: &[u8]) -> Feed {
        if self.is_done() {
            return Feed {
                fragments: Vec::new(),
                done: true,
            };
        }
        self.pending.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        let mut consumed = 0;
        let mut sentinel = false;
        while let Some(offset) = self.pending[consumed..].iter().position(|b| *b == b'\n') {
            let line_end = consumed + offset;
            let line = decode_line(&self.pending[consumed..line_end]);
            match classify(&line) {
                Line::Skip(kind) => trace!(?kind, "discarding line"),
                Line::Done => {
                    sentinel = true;
                    break;
                }
                Line::Data(json) => match serde_json::from_str::<Value>(json) {
                    Ok(value) => {
                        if let Some(reason) = payload::finish_reason(&value) {
                            self.finish_reason = Some(reason.to_owned());
                        }
                        if let Some(fragment) = payload::delta_content(&value) {
                            self.message.push_str(fragment);
                            fragments.push(fragment.to_owned());
                        }
                    }
                    Err(err) => {
                        debug!(
                            error = %err,
                            buffered = self.pending.len() - consumed,
                            "event payload incomplete; waiting for more data"
                        );
                        break;
                    }
                },
            }
            consumed = line_end + 1;
        }

        if sentinel {
            debug!(
                fragments = fragments.len(),
                message_len = self.message.len(),
                "termination sentinel received"
            );
            self.pending.clear();
            self.end(EndReason::Sentinel);
            return Feed {
                fragments,
                done: true,
            };
        }

        self.pending.drain(..consumed);
        Feed {
            fragments,
            done: false,
        }
    }

    /// Marks the transport as closed without a termination sentinel.
    ///
    /// Whatever is still pending is discarded; the count is reported so the
    /// caller can tell a clean close from a truncated one.
    pub fn finish(&mut self) -> Finish {
        if self.is_done() {
            return Finish::default();
        }
        let discarded_bytes = self.pending.len();
        if discarded_bytes > 0 {
            warn!(
                discarded_bytes,
                "stream closed with an incomplete trailing line; discarding it"
            );
        }
        self.pending.clear();
        self.end(EndReason::EndOfStream);
        Finish { discarded_bytes }
    }

    /// Marks the transport as failed. No further fragments are produced.
    pub fn fail(&mut self) {
        if self.is_done() {
            return;
        }
        self.pending.clear();
        self.end(EndReason::TransportError);
    }

    /// Message assembled from every fragment decoded so far.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Bytes received but not yet resolved into a consumed line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// True once the sentinel, end of stream or a transport error was seen.
    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Set once the decoder is done.
    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Last `finish_reason` reported by the producer, if any.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    fn end(&mut self, reason: EndReason) {
        self.state = DecoderState::Done;
        self.end_reason = Some(reason);
    }
}

#[derive(Debug)]
enum Skipped {
    Blank,
    Comment,
    Unrecognized,
    EmptyData,
}

enum Line<'a> {
    Skip(Skipped),
    Done,
    Data(&'a str),
}

fn decode_line(raw: &[u8]) -> std::borrow::Cow<'_, str> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Skip(Skipped::Blank);
    }
    if line.starts_with(':') {
        return Line::Skip(Skipped::Comment);
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip(Skipped::Unrecognized);
    };
    match rest.trim() {
        DONE_SENTINEL => Line::Done,
        "" => Line::Skip(Skipped::EmptyData),
        json => Line::Data(json),
    }
}
