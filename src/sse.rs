//! Server-Sent Events framing.
//!
//! Records are separated by a blank line and carry their payload on one or
//! more `data:` lines:
//! ```text
//! data: {"type": "token", "content": "Hel"}
//!
//! data: {"type": "done"}
//!
//! ```
//!
//! Network chunks do not line up with records, so both the byte-to-text step
//! ([`Utf8Decoder`]) and the record framing ([`ChunkBuffer`]) keep state
//! across chunks.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use itertools::Itertools;
use tracing::debug;

use crate::client::ClientError;

/// Prefix of the SSE field that carries a record's payload.
pub const DATA_PREFIX: &str = "data:";

const RECORD_DELIMITER: &str = "\n\n";

/// One delimited unit of the stream: the payload carried by its `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub data: String,
}

/// Accumulates decoded text and splits it into [`EventRecord`]s.
///
/// The incomplete tail after the last delimiter stays buffered until more
/// text arrives. Text that is not a `data:` record is skipped, never an error.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    buffer: String,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every record it completed, in arrival order.
    pub fn feed(&mut self, chunk: &str) -> Vec<EventRecord> {
        if chunk.is_empty() {
            return Vec::new();
        }

        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut records = Vec::new();
        while let Some(idx) = self.buffer.find(RECORD_DELIMITER) {
            let block: String = self.buffer.drain(..idx + RECORD_DELIMITER.len()).collect();
            let block = &block[..idx];

            match parse_record(block) {
                Some(record) => records.push(record),
                None if block.trim().is_empty() => {}
                None => debug!(block = %block, "skipping SSE block without data field"),
            }
        }
        records
    }

    /// Drop whatever unterminated text is left at end of stream.
    pub fn flush(&mut self) {
        if !self.buffer.trim().is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated SSE tail"
            );
        }
        self.buffer.clear();
    }

    /// Number of buffered bytes not yet part of a complete record.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any held-back bytes) as possible.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            let (valid, invalid_len) = match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => (e.valid_up_to(), e.error_len()),
            };

            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
            match invalid_len {
                Some(len) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + len);
                }
                None => {
                    // Incomplete sequence at the end; wait for the next chunk.
                    self.pending.drain(..valid);
                    return out;
                }
            }
        }
    }

    /// Flush held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Extension trait turning a byte stream into a stream of [`EventRecord`]s.
///
/// # Example
/// ```ignore
/// use streamchat::sse::SseStreamExt;
///
/// let mut records = body.sse_records();
/// while let Some(record) = records.next().await {
///     println!("payload: {}", record?.data);
/// }
/// ```
pub trait SseStreamExt {
    /// Frame the byte stream into records.
    ///
    /// Ends when the underlying stream ends; the first transport error is
    /// yielded and ends the record stream as well.
    fn sse_records(self) -> impl Stream<Item = Result<EventRecord, ClientError>> + Send;
}

impl<S> SseStreamExt for S
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    fn sse_records(self) -> impl Stream<Item = Result<EventRecord, ClientError>> + Send {
        let state = RecordState {
            bytes: Box::pin(self),
            decoder: Utf8Decoder::new(),
            framer: ChunkBuffer::new(),
            ready: VecDeque::new(),
            ended: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(record) = state.ready.pop_front() {
                    return Some((Ok(record), state));
                }

                if state.ended {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let text = state.decoder.decode(&chunk);
                        state.ready.extend(state.framer.feed(&text));
                    }
                    Some(Err(e)) => {
                        state.ended = true;
                        state.framer.flush();
                        return Some((Err(e), state));
                    }
                    None => {
                        let text = state.decoder.finish();
                        state.ready.extend(state.framer.feed(&text));
                        state.framer.flush();
                        state.ended = true;
                    }
                }
            }
        })
    }
}

struct RecordState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: Utf8Decoder,
    framer: ChunkBuffer,
    ready: VecDeque<EventRecord>,
    ended: bool,
}

/// Extract the payload of a `data:` line.
///
/// A single space after the colon is part of the field separator.
///
/// # Example
/// ```
/// use streamchat::sse::strip_data_prefix;
///
/// assert_eq!(strip_data_prefix("data: {\"type\":\"done\"}"), Some("{\"type\":\"done\"}"));
/// assert_eq!(strip_data_prefix("data:x"), Some("x"));
/// assert_eq!(strip_data_prefix("event: token"), None);
/// ```
pub fn strip_data_prefix(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

fn parse_record(block: &str) -> Option<EventRecord> {
    let mut data_lines = block.lines().filter_map(strip_data_prefix).peekable();
    data_lines.peek()?;
    Some(EventRecord {
        data: data_lines.join("\n"),
    })
}
