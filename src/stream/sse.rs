//! SSE (Server-Sent Events) frame parser and stream adapter.
//!
//! Handles the low-level parsing of SSE frames from a byte stream,
//! including buffering partial lines and multi-byte UTF-8 sequences split
//! across chunks.
use std::collections::VecDeque;

use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;

use super::SseEvent;

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (arriving on arbitrary boundaries) and it yields
/// fully assembled [`SseEvent`] frames.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// - `event:` sets the event type for the next frame
    /// - `data:` appends to the data buffer (one leading space stripped);
    ///   multiple `data:` lines are joined with `\n`
    /// - an empty line dispatches the frame
    /// - `:` lines are comments
    /// - `id:` sets the last event id
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = 0;
        let buffer = std::mem::take(&mut self.buffer);
        for line_end in memchr_iter(b'\n', buffer.as_bytes()) {
            let line = &buffer[processed_up_to..line_end];
            self.process_line(line.strip_suffix('\r').unwrap_or(line), out);
            processed_up_to = line_end + 1;
        }
        self.buffer = buffer;
        self.buffer.drain(..processed_up_to);
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if self.has_data {
                events.push(SseEvent {
                    event: self.event_type.take(),
                    data: std::mem::take(&mut self.data_buffer),
                    id: self.last_event_id.clone(),
                });
                self.has_data = false;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data_buffer.push('\n');
                } else {
                    self.has_data = true;
                }
                self.data_buffer.push_str(value);
            }
            "event" => self.event_type = Some(value.to_string()),
            "id" => self.last_event_id = Some(value.to_string()),
            // `retry` and unknown fields are ignored
            _ => {}
        }
    }
}

struct StreamState<S> {
    stream: std::pin::Pin<Box<S>>,
    parser: SseParser,
    remainder: Vec<u8>,
    pending: VecDeque<SseEvent>,
    failed: bool,
}

/// Split a byte stream into SSE events.
///
/// Transport errors are yielded once and end the stream.
pub fn sse_event_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent, E>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    let state = StreamState {
        stream: Box::pin(byte_stream),
        parser: SseParser::new(),
        remainder: Vec::new(),
        pending: VecDeque::new(),
        failed: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.failed {
                return None;
            }

            match state.stream.next().await? {
                Ok(bytes) => {
                    state.remainder.extend_from_slice(&bytes);
                    let mut parsed = Vec::new();
                    match std::str::from_utf8(&state.remainder) {
                        Ok(text) => {
                            state.parser.feed_into(text, &mut parsed);
                            state.remainder.clear();
                        }
                        // Incomplete trailing sequence: keep it for the next chunk.
                        Err(err) if err.error_len().is_none() => {
                            let valid_up_to = err.valid_up_to();
                            if let Ok(text) = std::str::from_utf8(&state.remainder[..valid_up_to]) {
                                state.parser.feed_into(text, &mut parsed);
                            }
                            state.remainder.drain(..valid_up_to);
                        }
                        Err(_) => {
                            let text = String::from_utf8_lossy(&state.remainder).into_owned();
                            state.parser.feed_into(&text, &mut parsed);
                            state.remainder.clear();
                        }
                    }
                    state.pending.extend(parsed);
                }
                Err(err) => {
                    state.failed = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_parse_simple_data_frame() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello world\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello world");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_parse_named_event_with_id() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: message\nid: 7\ndata: {\"msg\":\"estimation\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "{\"msg\":\"estimation\"}");
    }

    #[test]
    fn test_parse_multiline_data_and_comments() {
        let mut parser = SseParser::new();
        let events = parser.feed(": ping\ndata: line1\r\ndata: line2\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_parse_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: par").is_empty());
        assert!(parser.feed("tial\n").is_empty());
        let events = parser.feed("\ndata: next\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "partial");
        assert_eq!(events[1].data, "next");
    }

    #[tokio::test]
    async fn test_stream_handles_split_utf8() {
        let text = "data: caf\u{e9}\n\n".as_bytes().to_vec();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::copy_from_slice(&text[..split])),
            Ok(Bytes::copy_from_slice(&text[split..])),
        ];
        let events: Vec<_> = sse_event_stream(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().data, "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_stream_surfaces_error_once() {
        let chunks: Vec<Result<Bytes, &'static str>> = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("reset"),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let events: Vec<_> = sse_event_stream(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, "a");
        assert_eq!(events[1].as_ref().unwrap_err(), &"reset");
    }
}
