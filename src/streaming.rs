//! Decoding of the line-delimited event stream returned by the completion
//! endpoint.
//!
//! The body is a sequence of `\n`-separated records. Records carrying data
//! start with `data: ` followed by a JSON chunk; the payload `[DONE]` closes
//! the stream.

use crate::error::LlmError;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Meaning of a single record of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
    /// Non-empty text delta
    Delta(String),
    /// End-of-stream sentinel
    Done,
    /// Blank line, non-data line, or a chunk without text
    Ignored,
    /// Data line whose payload is not valid JSON
    Malformed(String),
}

/// Classify one line of the event stream
pub fn parse_record(line: &str) -> StreamRecord {
    let line = line.trim();
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return StreamRecord::Ignored;
    };

    let data = data.trim();
    if data == DONE_SENTINEL {
        return StreamRecord::Done;
    }

    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(chunk) => chunk
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("delta"))
            .and_then(|delta| delta.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.is_empty())
            .map(|content| StreamRecord::Delta(content.to_string()))
            .unwrap_or(StreamRecord::Ignored),
        Err(e) => StreamRecord::Malformed(e.to_string()),
    }
}

/// Splits raw body bytes into complete lines.
///
/// Bytes are buffered rather than decoded per network chunk, so a UTF-8
/// sequence split across two chunks is decoded intact once its line is
/// complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline_pos).collect();
            lines.push(String::from_utf8_lossy(&line[..newline_pos]).into_owned());
        }
        lines
    }

    /// Flush a trailing line that was never newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    lines: SseLineBuffer,
    ready: VecDeque<String>,
    body_done: bool,
}

/// Lazy, finite sequence of text fragments decoded from a response body.
///
/// Yields each delta in arrival order and ends at the `[DONE]` sentinel or
/// at the end of the body. A transport failure is yielded once as an error
/// and ends the sequence. Malformed records are logged and skipped.
pub struct TextStream {
    inner: BoxStream<'static, Result<String, LlmError>>,
}

impl TextStream {
    pub fn from_body<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let state = DecodeState {
            body: Box::pin(body),
            lines: SseLineBuffer::new(),
            ready: VecDeque::new(),
            body_done: false,
        };

        let inner = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(line) = state.ready.pop_front() {
                    match parse_record(&line) {
                        StreamRecord::Delta(text) => return Some((Ok(text), state)),
                        StreamRecord::Done => {
                            debug!("Stream finished with sentinel");
                            return None;
                        }
                        StreamRecord::Ignored => continue,
                        StreamRecord::Malformed(err) => {
                            warn!("Skipping malformed stream record: {}", err);
                            continue;
                        }
                    }
                }

                if state.body_done {
                    return None;
                }

                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        let lines = state.lines.push(bytes.as_ref());
                        state.ready.extend(lines);
                    }
                    Some(Err(e)) => {
                        state.body_done = true;
                        state.ready.clear();
                        return Some((Err(LlmError::Stream(e.to_string())), state));
                    }
                    None => {
                        debug!("Response body ended without sentinel");
                        state.body_done = true;
                        state.ready.extend(state.lines.finish());
                    }
                }
            }
        })
        .fuse()
        .boxed();

        Self { inner }
    }

    /// Drain the sequence, handing each fragment to `on_chunk`, and return
    /// the concatenated text.
    pub async fn collect_with<F>(mut self, mut on_chunk: F) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let mut full = String::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            full.push_str(&chunk);
            on_chunk(&chunk);
        }
        Ok(full)
    }
}

impl Stream for TextStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&str]) -> TextStream {
        let items: Vec<Result<Vec<u8>, std::io::Error>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        TextStream::from_body(futures::stream::iter(items))
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    async fn collect(stream: TextStream) -> Vec<String> {
        stream
            .map(|chunk| chunk.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[test]
    fn parse_record_classifies_lines() {
        assert_eq!(parse_record(""), StreamRecord::Ignored);
        assert_eq!(parse_record(": keep-alive"), StreamRecord::Ignored);
        assert_eq!(parse_record("event: ping"), StreamRecord::Ignored);
        assert_eq!(parse_record("data: [DONE]"), StreamRecord::Done);
        assert_eq!(parse_record("data: [DONE]\r"), StreamRecord::Done);
        assert_eq!(
            parse_record(delta("Hi").trim_end()),
            StreamRecord::Delta("Hi".to_string())
        );
        assert!(matches!(parse_record("data: {oops"), StreamRecord::Malformed(_)));
    }

    #[test]
    fn chunk_without_text_is_ignored() {
        assert_eq!(
            parse_record(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamRecord::Ignored
        );
        assert_eq!(
            parse_record(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            StreamRecord::Ignored
        );
        assert_eq!(
            parse_record(r#"data: {"choices":[],"usage":{}}"#),
            StreamRecord::Ignored
        );
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut lines = SseLineBuffer::new();
        assert!(lines.push(b"data: a").is_empty());
        assert_eq!(lines.push(b"bc\ndata: d"), vec!["data: abc".to_string()]);
        assert_eq!(lines.finish(), Some("data: d".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn line_buffer_reassembles_split_utf8() {
        let text = "data: héllo\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut lines = SseLineBuffer::new();
        assert!(lines.push(&text[..split]).is_empty());
        assert_eq!(lines.push(&text[split..]), vec!["data: héllo".to_string()]);
    }

    #[tokio::test]
    async fn yields_deltas_in_order() {
        let stream = body(&[&delta("Hel"), &delta("lo"), &delta(" world"), "data: [DONE]\n"]);
        assert_eq!(collect(stream).await, vec!["Hel", "lo", " world"]);
    }

    #[tokio::test]
    async fn records_split_across_network_chunks() {
        let first = delta("Guten");
        let (a, b) = first.split_at(10);
        let stream = body(&[a, b, &delta(" Tag"), "data: [DO", "NE]\n"]);
        assert_eq!(collect(stream).await, vec!["Guten", " Tag"]);
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_sentinel() {
        let stream = body(&[&delta("one"), "data: [DONE]\n", &delta("two")]);
        assert_eq!(collect(stream).await, vec!["one"]);
    }

    #[tokio::test]
    async fn malformed_record_between_good_ones_is_skipped() {
        let stream = body(&[&delta("first"), "data: {not json}\n", &delta("second"), "data: [DONE]\n"]);
        assert_eq!(collect(stream).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn body_without_sentinel_flushes_last_line() {
        let last = delta("tail");
        let stream = body(&[&delta("head"), last.trim_end()]);
        assert_eq!(collect(stream).await, vec!["head", "tail"]);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let items: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(delta("partial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(delta("never").into_bytes()),
        ];
        let mut stream = TextStream::from_body(futures::stream::iter(items));

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(matches!(stream.next().await, Some(Err(LlmError::Stream(_)))));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn collect_with_matches_delivered_chunks() {
        let stream = body(&[&delta("a"), &delta("b"), &delta("c"), "data: [DONE]\n"]);
        let mut seen = Vec::new();

        let full = stream.collect_with(|chunk| seen.push(chunk.to_string())).await.unwrap();

        assert_eq!(full, seen.concat());
        assert_eq!(full, "abc");
    }
}
