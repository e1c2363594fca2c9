//! Phase-driven translation of upstream frames into `OpenAI` delta fragments.

use smallvec::SmallVec;

use crate::config::ThinkingMode;
use crate::fc::ToolInvocation;
use crate::protocol::openai_chat::OpenAiUsage;
use crate::protocol::upstream::{decode_frame, Phase, UpstreamError, UpstreamFrame};
use crate::stream::sse::{RawEvent, RawEventKind};
use crate::stream::thinking::transform_thinking_content;

const DETAILS_CLOSE: &str = "</details>";

/// How answer content is delivered by the driving assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Streamed chunk by chunk; the first `edit_content` snapshot seeds the answer.
    Incremental,
    /// Collected into one response; only `delta_content` is used.
    Collect,
}

/// One piece of output produced from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Reasoning(String),
    Content(String),
}

pub type Fragments = SmallVec<[Fragment; 2]>;

/// Why translation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCause {
    /// `done: true` or `phase: "done"`.
    Done,
    /// The upstream reported an error inside a frame.
    Error(UpstreamError),
    /// Reading the upstream body failed.
    Transport(String),
    /// The upstream body ended without a terminal frame.
    EndOfStream,
}

/// One-way lifecycle latch of a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Ended(TerminalCause),
}

/// Per-request translation state. Never shared between requests.
#[derive(Debug)]
pub struct TranslationState {
    pub tool_buffer: String,
    pub sent_initial_answer: bool,
    pub lifecycle: Lifecycle,
    pub extracted_tools: Option<Vec<ToolInvocation>>,
}

impl TranslationState {
    fn new() -> Self {
        Self {
            tool_buffer: String::new(),
            sent_initial_answer: false,
            lifecycle: Lifecycle::Active,
            extracted_tools: None,
        }
    }
}

/// Result of feeding one item to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The translation just ended with this item.
    Terminal,
    /// The translation had already ended; the item was ignored.
    Ignored,
}

/// Phase state machine shared by the stream and full-response assemblers.
#[derive(Debug)]
pub struct PhaseAccumulator {
    delivery: DeliveryMode,
    thinking_mode: ThinkingMode,
    tool_mode: bool,
    state: TranslationState,
    usage: Option<OpenAiUsage>,
}

impl PhaseAccumulator {
    #[must_use]
    pub fn new(delivery: DeliveryMode, thinking_mode: ThinkingMode, tool_mode: bool) -> Self {
        Self {
            delivery,
            thinking_mode,
            tool_mode,
            state: TranslationState::new(),
            usage: None,
        }
    }

    #[must_use]
    pub fn tool_mode(&self) -> bool {
        self.tool_mode
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        matches!(self.state.lifecycle, Lifecycle::Ended(_))
    }

    #[must_use]
    pub fn terminal_cause(&self) -> Option<&TerminalCause> {
        match &self.state.lifecycle {
            Lifecycle::Active => None,
            Lifecycle::Ended(cause) => Some(cause),
        }
    }

    /// Last usage reported by the upstream.
    #[must_use]
    pub fn usage(&self) -> Option<OpenAiUsage> {
        self.usage
    }

    #[must_use]
    pub fn state(&self) -> &TranslationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TranslationState {
        &mut self.state
    }

    /// Feed one decoded SSE line. Only JSON `data` lines carry frames.
    pub fn push_event(&mut self, event: &RawEvent, out: &mut Fragments) -> Step {
        if self.is_ended() {
            return Step::Ignored;
        }
        if event.kind != RawEventKind::Data {
            return Step::Continue;
        }
        let Some(payload) = event.parsed_json.as_ref() else {
            if event.raw_value.trim() == "[DONE]" {
                return self.end(TerminalCause::Done);
            }
            tracing::debug!(value = %event.raw_value, "skipping non-JSON upstream data line");
            return Step::Continue;
        };
        match decode_frame(payload) {
            Ok(frame) => self.push_frame(&frame, out),
            Err(err) => {
                tracing::debug!(error = %err, "skipping upstream payload without frame shape");
                Step::Continue
            }
        }
    }

    /// Feed one upstream frame, appending any emitted fragments to `out`.
    pub fn push_frame(&mut self, frame: &UpstreamFrame, out: &mut Fragments) -> Step {
        if self.is_ended() {
            return Step::Ignored;
        }
        if let Some(error) = &frame.error {
            tracing::warn!(code = error.code, detail = %error.detail, "upstream reported an error");
            return self.end(TerminalCause::Error(error.clone()));
        }
        if let Some(usage) = frame.usage {
            self.usage = Some(usage);
        }

        match frame.phase {
            Phase::Thinking => {
                let text = transform_thinking_content(&frame.delta_content, self.thinking_mode);
                if self.tool_mode {
                    self.push_content(&text, out);
                } else if !text.is_empty() {
                    out.push(Fragment::Reasoning(text));
                }
            }
            Phase::Answer => {
                let text = self.answer_text(frame);
                self.push_content(text, out);
            }
            Phase::Other | Phase::Done => {
                self.push_content(&frame.delta_content, out);
            }
        }

        if frame.is_terminal() {
            return self.end(TerminalCause::Done);
        }
        Step::Continue
    }

    /// Mark the translation as ended without a terminal frame.
    ///
    /// Returns [`Step::Ignored`] when it had already ended.
    pub fn fail(&mut self, cause: TerminalCause) -> Step {
        if self.is_ended() {
            return Step::Ignored;
        }
        self.end(cause)
    }

    fn end(&mut self, cause: TerminalCause) -> Step {
        self.state.lifecycle = Lifecycle::Ended(cause);
        Step::Terminal
    }

    fn answer_text<'a>(&mut self, frame: &'a UpstreamFrame) -> &'a str {
        if self.delivery == DeliveryMode::Collect
            || self.state.sent_initial_answer
            || frame.edit_content.is_empty()
        {
            return &frame.delta_content;
        }
        self.state.sent_initial_answer = true;
        match frame.edit_content.find(DETAILS_CLOSE) {
            Some(pos) => &frame.edit_content[pos + DETAILS_CLOSE.len()..],
            None => &frame.delta_content,
        }
    }

    fn push_content(&mut self, text: &str, out: &mut Fragments) {
        if text.is_empty() {
            return;
        }
        if self.tool_mode {
            self.state.tool_buffer.push_str(text);
        } else {
            out.push(Fragment::Content(text.to_string()));
        }
    }
}
