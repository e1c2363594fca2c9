/// SSE (Server-Sent Events) line decoder and output framing helpers.
///
/// The decoder works on raw bytes so that a chunk boundary falling inside a
/// line, or inside a multi-byte character, never produces a partial event.
/// Only complete lines are classified; the incomplete tail is kept until the
/// next chunk or the end of the stream.
use crate::error::BridgeError;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::Stream;
use memchr::memchr_iter;
use serde_json::Value;
use smallvec::SmallVec;
use std::pin::Pin;

/// Field kind of a decoded SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Data,
    Event,
    Id,
    Retry,
}

/// One classified SSE field line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub raw_value: String,
    /// Parsed payload of a `data` line, when it is valid JSON.
    pub parsed_json: Option<Value>,
    pub is_json: bool,
    /// Parsed interval of a `retry` line.
    pub retry_ms: Option<u64>,
}

impl RawEvent {
    fn plain(kind: RawEventKind, value: &str) -> Self {
        Self {
            kind,
            raw_value: value.to_string(),
            parsed_json: None,
            is_json: false,
            retry_ms: None,
        }
    }

    fn data(value: &str) -> Self {
        match serde_json::from_str::<Value>(value) {
            Ok(parsed) => Self {
                kind: RawEventKind::Data,
                raw_value: value.to_string(),
                parsed_json: Some(parsed),
                is_json: true,
                retry_ms: None,
            },
            Err(_) => Self::plain(RawEventKind::Data, value),
        }
    }
}

impl Default for RawEvent {
    fn default() -> Self {
        Self::plain(RawEventKind::Data, "")
    }
}

struct PendingEvents {
    events: SmallVec<[RawEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn new() -> Self {
        Self {
            events: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<RawEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<RawEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

// ---------------------------------------------------------------------------
// SseLineDecoder: incremental line classifier
// ---------------------------------------------------------------------------

/// Incremental SSE line decoder.
///
/// Feed it raw byte chunks in arbitrary boundaries and it yields one
/// [`RawEvent`] per complete `data`/`event`/`id`/`retry` line.
#[derive(Default)]
pub struct SseLineDecoder {
    buffer: BytesMut,
}

impl SseLineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return any events decoded from complete lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw bytes and append decoded events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<RawEvent>) {
        self.buffer.extend_from_slice(chunk);
        let mut processed_up_to = 0usize;
        for line_end in memchr_iter(b'\n', &self.buffer) {
            decode_line(&self.buffer[processed_up_to..line_end], out);
            processed_up_to = line_end + 1;
        }
        if processed_up_to > 0 {
            self.buffer.advance(processed_up_to);
        }
    }

    /// Decode whatever unterminated line remains once the input has ended.
    pub fn finish_into(&mut self, out: &mut Vec<RawEvent>) {
        if self.buffer.is_empty() {
            return;
        }
        let tail = self.buffer.split();
        decode_line(&tail, out);
    }

    /// Number of buffered bytes belonging to the incomplete trailing line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8], out: &mut Vec<RawEvent>) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() || line[0] == b':' {
        return;
    }
    let text = String::from_utf8_lossy(line);
    let Some((field, value)) = text.split_once(':') else {
        return;
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    match field {
        "data" => out.push(RawEvent::data(value)),
        "event" => out.push(RawEvent::plain(RawEventKind::Event, value)),
        "id" => out.push(RawEvent::plain(RawEventKind::Id, value)),
        "retry" => match value.trim().parse::<u64>() {
            Ok(ms) => {
                let mut event = RawEvent::plain(RawEventKind::Retry, value);
                event.retry_ms = Some(ms);
                out.push(event);
            }
            Err(_) => tracing::debug!(value, "dropping SSE retry line with non-integer value"),
        },
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

type ByteSource<S> = Option<Pin<Box<S>>>;

/// Decode an HTTP body stream into [`RawEvent`]s.
///
/// The stream ends when the body ends. A body read error is yielded once as
/// [`BridgeError::Transport`] and the stream ends after it. The byte source is
/// released as soon as it ends or fails, or when the returned stream is dropped.
pub fn raw_event_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<RawEvent, BridgeError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    let source: ByteSource<S> = Some(Box::pin(byte_stream));
    futures_util::stream::unfold(
        (
            source,
            SseLineDecoder::new(),
            Vec::<RawEvent>::with_capacity(8),
            PendingEvents::new(),
        ),
        |(mut source, mut decoder, mut parsed, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (source, decoder, parsed, pending)));
                }
                let next = source.as_mut()?.as_mut().next().await;
                match next {
                    Some(Ok(bytes)) => decoder.feed_into(&bytes, &mut parsed),
                    Some(Err(err)) => {
                        source = None;
                        let err = BridgeError::Transport(format!("upstream body read failed: {err}"));
                        return Some((Err(err), (source, decoder, parsed, pending)));
                    }
                    None => {
                        source = None;
                        decoder.finish_into(&mut parsed);
                    }
                }
                pending.extend_from_vec(&mut parsed);
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(8 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PHASE_STREAM: &str = "\
: keep-alive\n\
event: message\n\
id: 7\n\
retry: 1500\n\
data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"thinking\",\"delta_content\":\"嗯，\"}}\n\
\n\
data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"你好 world\"}}\r\n\
\r\n\
data: not json\n\
data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"done\",\"done\":true}}";

    fn decode_all(chunks: &[&[u8]]) -> Vec<RawEvent> {
        let mut decoder = SseLineDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.feed_into(chunk, &mut out);
        }
        decoder.finish_into(&mut out);
        out
    }

    #[test]
    fn test_classifies_fields() {
        let events = decode_all(&[PHASE_STREAM.as_bytes()]);
        let kinds: Vec<RawEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RawEventKind::Event,
                RawEventKind::Id,
                RawEventKind::Retry,
                RawEventKind::Data,
                RawEventKind::Data,
                RawEventKind::Data,
                RawEventKind::Data,
            ]
        );
        assert_eq!(events[0].raw_value, "message");
        assert_eq!(events[1].raw_value, "7");
        assert_eq!(events[2].retry_ms, Some(1500));
        assert!(events[3].is_json);
        assert_eq!(
            events[4].parsed_json.as_ref().unwrap()["data"]["delta_content"],
            "你好 world"
        );
        assert!(!events[5].is_json);
        assert_eq!(events[5].raw_value, "not json");
        assert!(events[5].parsed_json.is_none());
    }

    #[test]
    fn test_unterminated_final_line_is_decoded_at_end() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.feed(b"data: {\"a\":1}");
        assert!(events.is_empty());
        assert_eq!(decoder.pending_len(), 13);
        let mut out = Vec::new();
        decoder.finish_into(&mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_json);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_ignores_comments_unknown_fields_and_colonless_lines() {
        let events = decode_all(&[b": ping\nfoo: bar\nnocolon\n\n\ndata:x\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].raw_value, "x");
    }

    #[test]
    fn test_only_one_leading_space_is_removed() {
        let events = decode_all(&[b"data:  two\n"]);
        assert_eq!(events[0].raw_value, " two");
    }

    #[test]
    fn test_bad_retry_is_dropped() {
        let events = decode_all(&[b"retry: soon\ndata: 1\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RawEventKind::Data);
        assert_eq!(events[0].parsed_json, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_any_chunking_yields_same_events() {
        let bytes = PHASE_STREAM.as_bytes();
        let expected = decode_all(&[bytes]);
        // Every split point, including inside multi-byte characters.
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at {split}");
        }
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), expected);
        let threes: Vec<&[u8]> = bytes.chunks(3).collect();
        assert_eq!(decode_all(&threes), expected);
    }

    #[tokio::test]
    async fn test_raw_event_stream_yields_events_in_order() {
        let source = futures_util::stream::iter(vec![
            Ok::<Bytes, std::io::Error>(Bytes::from_static(b"data: {\"n\":1}\n\nda")),
            Ok(Bytes::from_static(b"ta: {\"n\":2}\n\n")),
            Ok(Bytes::from_static(b"data: {\"n\":3}")),
        ]);
        let events: Vec<_> = raw_event_stream(source).collect().await;
        let values: Vec<i64> = events
            .into_iter()
            .map(|e| e.unwrap().parsed_json.unwrap()["n"].as_i64().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_raw_event_stream_yields_transport_error_once() {
        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"data: {\"n\":2}\n")),
        ]);
        let events: Vec<_> = raw_event_stream(source).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        match &events[1] {
            Err(BridgeError::Transport(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_byte_source_released_once_on_early_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(drops.clone());
        let source = futures_util::stream::iter(vec![
            Ok::<Bytes, std::io::Error>(Bytes::from_static(b"data: 1\ndata: 2\n")),
            Ok(Bytes::from_static(b"data: 3\n")),
        ])
        .map(move |item| {
            let _keep = &guard;
            item
        });
        let mut events = Box::pin(raw_event_stream(source));
        assert!(events.next().await.is_some());
        drop(events);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_byte_source_released_at_end_of_body() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(drops.clone());
        let source = futures_util::stream::iter(vec![Ok::<Bytes, std::io::Error>(
            Bytes::from_static(b"data: 1\n"),
        )])
        .map(move |item| {
            let _keep = &guard;
            item
        });
        let mut events = Box::pin(raw_event_stream(source));
        assert!(events.next().await.is_some());
        assert!(events.next().await.is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(events);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_openai_sse_frame_helper() {
        let json = r#"{"id":"chatcmpl-1"}"#;
        assert_eq!(openai_sse_frame(json), "data: {\"id\":\"chatcmpl-1\"}\n\n");
        assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
    }
}
