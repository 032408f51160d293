//! Offline decoding of a recorded event-stream transcript.

use std::io::Write;
use std::path::Path;

use cinema_assistant::{EndReason, EventStreamDecoder};

/// Outcome of replaying a transcript.
#[derive(Debug, PartialEq, Eq)]
pub struct ReplaySummary {
    pub fragments: usize,
    pub message: String,
    pub end_reason: Option<EndReason>,
    pub discarded_bytes: usize,
}

/// Feeds `bytes` to a fresh decoder in `chunk_size` pieces, writing each
/// fragment to `out` as it is decoded.
pub fn replay_bytes(
    bytes: &[u8],
    chunk_size: usize,
    out: &mut impl Write,
) -> std::io::Result<ReplaySummary> {
    let mut decoder = EventStreamDecoder::new();
    let mut fragments = 0;
    let mut discarded_bytes = 0;
    for chunk in bytes.chunks(chunk_size.max(1)) {
        let feed = decoder.feed(chunk);
        for fragment in &feed.fragments {
            out.write_all(fragment.as_bytes())?;
        }
        out.flush()?;
        fragments += feed.fragments.len();
        if feed.done {
            break;
        }
    }
    if !decoder.is_done() {
        discarded_bytes = decoder.finish().discarded_bytes;
    }
    Ok(ReplaySummary {
        fragments,
        message: decoder.message().to_owned(),
        end_reason: decoder.end_reason(),
        discarded_bytes,
    })
}

/// Replays the transcript stored at `path`.
pub fn replay_file(
    path: &Path,
    chunk_size: usize,
    out: &mut impl Write,
) -> std::io::Result<ReplaySummary> {
    let bytes = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), chunk_size, "replaying transcript");
    replay_bytes(&bytes, chunk_size, out)
}
