//! Server-sent event decoding for streamed chat completions.
//!
//! Only `data:` lines matter. `[DONE]` ends the stream; comments, event
//! names and blank separators are skipped.

use agent_core::error::AgentError;
use agent_core::provider::{CompletionStream, StreamChunk};
use futures::{Stream, StreamExt};
use std::fmt::Display;

use crate::openai::parse_stream_data;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    Done,
}

/// Line-buffered decoder; bytes may be split anywhere, even mid-character.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?;
    let data = data.trim_start();

    if data.is_empty() {
        None
    } else if data == DONE_SENTINEL {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

/// Turn a raw body stream into completion chunks.
///
/// A transport error ends the stream after being yielded once. The final
/// item is always a `done` chunk unless the transport failed.
pub(crate) fn decode_stream<S, B, E>(body: S) -> CompletionStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut body = Box::pin(body);
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::default();

        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(AgentError::Provider(format!("stream read failed: {}", e)));
                    return;
                }
            };

            for event in decoder.push(bytes.as_ref()) {
                match event {
                    SseEvent::Done => {
                        yield Ok(StreamChunk { done: true, ..StreamChunk::default() });
                        return;
                    }
                    SseEvent::Data(data) => {
                        if let Some(chunk) = parse_stream_data(&data) {
                            yield Ok(chunk);
                        }
                    }
                }
            }
        }

        if let Some(SseEvent::Data(data)) = decoder.finish() {
            if let Some(chunk) = parse_stream_data(&data) {
                yield Ok(chunk);
            }
        }
        tracing::debug!("Stream closed without a [DONE] marker");
        yield Ok(StreamChunk { done: true, ..StreamChunk::default() });
    };

    Box::pin(stream)
}
