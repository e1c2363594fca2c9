//! Non-streaming `chat.completion` assembly.

use futures_util::{Stream, StreamExt};

use crate::error::BridgeError;
use crate::fc::{extract_tool_invocations, strip_tool_json};
use crate::protocol::openai_chat::encoder::encode_chat_response;
use crate::protocol::openai_chat::{OpenAiChatResponse, OpenAiResponseMessage};
use crate::stream::accumulator::{Fragment, Fragments, PhaseAccumulator, Step, TerminalCause};
use crate::stream::sse::RawEvent;

/// Identity of the response being assembled.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub id: String,
    pub model: String,
    pub created: u64,
}

/// Collects a whole upstream stream into one response.
#[derive(Debug)]
pub struct FullAssembler {
    accumulator: PhaseAccumulator,
    scan_limit: usize,
    content: String,
    reasoning: String,
}

impl FullAssembler {
    #[must_use]
    pub fn new(accumulator: PhaseAccumulator, scan_limit: usize) -> Self {
        Self {
            accumulator,
            scan_limit,
            content: String::new(),
            reasoning: String::new(),
        }
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.accumulator.is_ended()
    }

    pub fn on_event(&mut self, item: Result<RawEvent, BridgeError>) {
        if self.is_ended() {
            return;
        }
        match item {
            Ok(event) => {
                let mut fragments = Fragments::new();
                let step = self.accumulator.push_event(&event, &mut fragments);
                for fragment in fragments {
                    match fragment {
                        Fragment::Reasoning(text) => self.reasoning.push_str(&text),
                        Fragment::Content(text) => self.content.push_str(&text),
                    }
                }
                if step == Step::Terminal {
                    tracing::debug!(cause = ?self.accumulator.terminal_cause(), "upstream stream ended");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "upstream stream failed; returning partial response");
                self.accumulator
                    .fail(TerminalCause::Transport(err.to_string()));
            }
        }
    }

    /// Build the final response from everything collected so far.
    #[must_use]
    pub fn finish(mut self, meta: &ResponseMeta) -> OpenAiChatResponse {
        self.accumulator.fail(TerminalCause::EndOfStream);
        let usage = self.accumulator.usage().unwrap_or_default();
        let reasoning = (!self.reasoning.is_empty()).then_some(self.reasoning);

        let (message, finish_reason) = if self.accumulator.tool_mode() {
            let buffer = std::mem::take(&mut self.accumulator.state_mut().tool_buffer);
            match extract_tool_invocations(&buffer, self.scan_limit) {
                Some(calls) => (
                    OpenAiResponseMessage {
                        role: "assistant".to_string(),
                        content: None,
                        reasoning_content: reasoning,
                        tool_calls: Some(calls),
                    },
                    "tool_calls",
                ),
                None => (
                    text_message(strip_tool_json(&buffer, self.scan_limit), reasoning),
                    "stop",
                ),
            }
        } else {
            (text_message(self.content, reasoning), "stop")
        };

        encode_chat_response(
            &meta.id,
            &meta.model,
            meta.created,
            message,
            finish_reason,
            usage,
        )
    }
}

fn text_message(content: String, reasoning: Option<String>) -> OpenAiResponseMessage {
    OpenAiResponseMessage {
        role: "assistant".to_string(),
        content: Some(content),
        reasoning_content: reasoning,
        tool_calls: None,
    }
}

/// Drain `events` into a single response.
///
/// Reading stops at the first terminal frame; anything after it is never polled.
pub async fn collect_response<S>(
    events: S,
    mut assembler: FullAssembler,
    meta: &ResponseMeta,
) -> OpenAiChatResponse
where
    S: Stream<Item = Result<RawEvent, BridgeError>>,
{
    let mut events = std::pin::pin!(events);
    while !assembler.is_ended() {
        match events.next().await {
            Some(item) => assembler.on_event(item),
            None => break,
        }
    }
    assembler.finish(meta)
}
