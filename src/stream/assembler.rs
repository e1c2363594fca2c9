//! Streaming `chat.completion.chunk` assembly.

use bytes::Bytes;
use futures_util::Stream;
use smallvec::SmallVec;
use std::pin::Pin;
use std::time::Instant;

use crate::error::BridgeError;
use crate::fc::{extract_tool_invocations, strip_tool_json};
use crate::observability::log_request_complete;
use crate::protocol::openai_chat::encoder::ChunkEncoder;
use crate::stream::accumulator::{Fragment, Fragments, PhaseAccumulator, Step, TerminalCause};
use crate::stream::sse::{RawEvent, DONE_FRAME};

/// Lifecycle of one streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Init,
    RoleSent,
    Streaming,
    Ended,
}

/// Drives a [`PhaseAccumulator`] and encodes its output as SSE frames.
///
/// The terminal sequence (tool calls or residual text, the finish chunk and
/// `data: [DONE]`) is emitted at most once.
#[derive(Debug)]
pub struct StreamAssembler {
    state: AssemblerState,
    encoder: ChunkEncoder,
    accumulator: PhaseAccumulator,
    scan_limit: usize,
    finish_reason: Option<&'static str>,
    started: Instant,
}

impl StreamAssembler {
    #[must_use]
    pub fn new(encoder: ChunkEncoder, accumulator: PhaseAccumulator, scan_limit: usize) -> Self {
        Self {
            state: AssemblerState::Init,
            encoder,
            accumulator,
            scan_limit,
            finish_reason: None,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state == AssemblerState::Ended
    }

    /// Finish reason reported in the final chunk, once ended.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&'static str> {
        self.finish_reason
    }

    #[must_use]
    pub fn accumulator(&self) -> &PhaseAccumulator {
        &self.accumulator
    }

    /// Emit the role announcement. Only the first call has an effect.
    pub fn start(&mut self, out: &mut Vec<Bytes>) {
        if self.state != AssemblerState::Init {
            return;
        }
        push_frame(out, self.encoder.role());
        self.state = AssemblerState::RoleSent;
    }

    /// Feed one decoder item.
    ///
    /// A decoder error ends the response the same way an upstream error frame does.
    pub fn on_event(&mut self, item: Result<RawEvent, BridgeError>, out: &mut Vec<Bytes>) {
        if self.is_ended() {
            return;
        }
        self.start(out);
        match item {
            Ok(event) => {
                let mut fragments = Fragments::new();
                let step = self.accumulator.push_event(&event, &mut fragments);
                self.emit_fragments(fragments, out);
                if step == Step::Terminal {
                    self.finish(out);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "upstream stream failed; closing response");
                self.accumulator
                    .fail(TerminalCause::Transport(err.to_string()));
                self.finish(out);
            }
        }
    }

    /// Upstream body ended. Emits the terminal sequence if it was not sent yet.
    pub fn on_end_of_stream(&mut self, out: &mut Vec<Bytes>) {
        if self.is_ended() {
            return;
        }
        self.start(out);
        if self.accumulator.fail(TerminalCause::EndOfStream) == Step::Terminal {
            tracing::debug!("upstream body ended without a terminal frame");
        }
        self.finish(out);
    }

    fn emit_fragments(&mut self, fragments: Fragments, out: &mut Vec<Bytes>) {
        for fragment in fragments {
            let frame = match &fragment {
                Fragment::Reasoning(text) => self.encoder.reasoning(text),
                Fragment::Content(text) => self.encoder.content(text),
            };
            push_frame(out, frame);
            self.state = AssemblerState::Streaming;
        }
    }

    fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.is_ended() {
            return;
        }
        let mut finish_reason = "stop";

        if self.accumulator.tool_mode() {
            let scan_limit = self.scan_limit;
            let state = self.accumulator.state_mut();
            let buffer = std::mem::take(&mut state.tool_buffer);
            match extract_tool_invocations(&buffer, scan_limit) {
                Some(calls) => {
                    for (index, call) in (0u32..).zip(calls.iter()) {
                        push_frame(out, self.encoder.tool_call(index, call));
                    }
                    self.accumulator.state_mut().extracted_tools = Some(calls);
                    finish_reason = "tool_calls";
                }
                None => {
                    let residual = strip_tool_json(&buffer, scan_limit);
                    if !residual.is_empty() {
                        push_frame(out, self.encoder.content(&residual));
                    }
                }
            }
        }

        push_frame(
            out,
            self.encoder.finish(finish_reason, self.accumulator.usage()),
        );
        out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
        self.finish_reason = Some(finish_reason);
        self.state = AssemblerState::Ended;
        log_request_complete(
            self.encoder.model(),
            finish_reason,
            self.accumulator.usage().as_ref(),
            self.started,
        );
    }
}

fn push_frame(out: &mut Vec<Bytes>, frame: Result<String, BridgeError>) {
    match frame {
        Ok(text) => out.push(Bytes::from(text)),
        Err(err) => tracing::error!(error = %err, "dropping unencodable chunk"),
    }
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn new() -> Self {
        Self {
            chunks: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_vec(&mut self, frame_chunks: &mut Vec<Bytes>) {
        if frame_chunks.is_empty() {
            return;
        }
        self.chunks.reserve(frame_chunks.len());
        self.chunks.extend(frame_chunks.drain(..));
    }
}

/// Turn decoded upstream events into the client SSE byte stream.
///
/// The event source is dropped as soon as the response has ended, so a
/// duplicate terminal frame or trailing bytes are never read.
pub fn sse_chunk_stream<S>(
    events: S,
    mut assembler: StreamAssembler,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<RawEvent, BridgeError>> + Send + 'static,
{
    use futures_util::StreamExt;

    let mut first = Vec::with_capacity(1);
    assembler.start(&mut first);
    let mut pending = PendingBytes::new();
    pending.extend_from_vec(&mut first);

    futures_util::stream::unfold(
        (
            Some(Box::pin(events)) as Option<Pin<Box<S>>>,
            assembler,
            Vec::<Bytes>::with_capacity(8),
            pending,
        ),
        |(mut events, mut assembler, mut scratch, mut pending)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((chunk, (events, assembler, scratch, pending)));
                }
                if assembler.is_ended() {
                    return None;
                }
                let next = events.as_mut()?.as_mut().next().await;
                match next {
                    Some(item) => assembler.on_event(item, &mut scratch),
                    None => assembler.on_end_of_stream(&mut scratch),
                }
                if assembler.is_ended() {
                    events = None;
                }
                pending.extend_from_vec(&mut scratch);
            }
        },
    )
}
