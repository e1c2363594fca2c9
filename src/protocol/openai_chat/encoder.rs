use crate::error::BridgeError;
use crate::stream::sse::openai_sse_frame;

use super::{
    OpenAiChatResponse, OpenAiChoice, OpenAiDelta, OpenAiResponseMessage, OpenAiStreamChoice,
    OpenAiStreamChunk, OpenAiStreamToolCall, OpenAiToolCall, OpenAiUsage,
};

/// Builds `chat.completion.chunk` SSE frames sharing one id, model and timestamp.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    id: String,
    model: String,
    created: u64,
}

impl ChunkEncoder {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Role-only announcement chunk.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Translation`] if the chunk cannot be serialized.
    pub fn role(&self) -> Result<String, BridgeError> {
        self.frame(
            OpenAiDelta {
                role: Some("assistant".to_string()),
                ..OpenAiDelta::default()
            },
            None,
            None,
        )
    }

    /// Answer text chunk.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Translation`] if the chunk cannot be serialized.
    pub fn content(&self, text: &str) -> Result<String, BridgeError> {
        self.frame(
            OpenAiDelta {
                content: Some(text.to_string()),
                ..OpenAiDelta::default()
            },
            None,
            None,
        )
    }

    /// Reasoning text chunk.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Translation`] if the chunk cannot be serialized.
    pub fn reasoning(&self, text: &str) -> Result<String, BridgeError> {
        self.frame(
            OpenAiDelta {
                reasoning_content: Some(text.to_string()),
                ..OpenAiDelta::default()
            },
            None,
            None,
        )
    }

    /// One complete tool call tagged with its position.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Translation`] if the chunk cannot be serialized.
    pub fn tool_call(&self, index: u32, call: &OpenAiToolCall) -> Result<String, BridgeError> {
        self.frame(
            OpenAiDelta {
                tool_calls: Some(vec![OpenAiStreamToolCall {
                    index,
                    id: call.id.clone(),
                    type_: call.type_.clone(),
                    function: call.function.clone(),
                }]),
                ..OpenAiDelta::default()
            },
            None,
            None,
        )
    }

    /// Final empty-delta chunk carrying the finish reason and usage.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Translation`] if the chunk cannot be serialized.
    pub fn finish(
        &self,
        finish_reason: &str,
        usage: Option<OpenAiUsage>,
    ) -> Result<String, BridgeError> {
        self.frame(
            OpenAiDelta::default(),
            Some(finish_reason.to_string()),
            usage,
        )
    }

    fn frame(
        &self,
        delta: OpenAiDelta,
        finish_reason: Option<String>,
        usage: Option<OpenAiUsage>,
    ) -> Result<String, BridgeError> {
        let chunk = OpenAiStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![OpenAiStreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        };
        let json = serde_json::to_string(&chunk)
            .map_err(|e| BridgeError::Translation(format!("chunk serialization failed: {e}")))?;
        Ok(openai_sse_frame(&json))
    }
}

/// Assemble a non-streaming `chat.completion` response.
#[must_use]
pub fn encode_chat_response(
    id: &str,
    model: &str,
    created: u64,
    message: OpenAiResponseMessage,
    finish_reason: &str,
    usage: OpenAiUsage,
) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message,
            finish_reason: finish_reason.to_string(),
        }],
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::OpenAiToolCallFunction;

    fn parse_frame(frame: &str) -> serde_json::Value {
        let json = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("sse frame");
        serde_json::from_str(json).expect("chunk json")
    }

    #[test]
    fn test_role_chunk_shape() {
        let enc = ChunkEncoder::new("chatcmpl-1", "glm-4.5", 1_700_000_000);
        let chunk = parse_frame(&enc.role().unwrap());
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["id"], "chatcmpl-1");
        assert_eq!(chunk["created"], 1_700_000_000u64);
        assert_eq!(chunk["choices"][0]["index"], 0);
        assert_eq!(chunk["choices"][0]["delta"]["role"], "assistant");
        assert!(chunk["choices"][0]["finish_reason"].is_null());
        assert!(chunk.get("usage").is_none());
    }

    #[test]
    fn test_reasoning_chunk_has_no_content_field() {
        let enc = ChunkEncoder::new("c", "m", 0);
        let chunk = parse_frame(&enc.reasoning("hmm").unwrap());
        let delta = &chunk["choices"][0]["delta"];
        assert_eq!(delta["reasoning_content"], "hmm");
        assert!(delta.get("content").is_none());
    }

    #[test]
    fn test_tool_call_chunk_carries_index() {
        let enc = ChunkEncoder::new("c", "m", 0);
        let call = OpenAiToolCall {
            id: "call_1".into(),
            type_: "function".into(),
            function: OpenAiToolCallFunction {
                name: "f".into(),
                arguments: "{\"a\":1}".into(),
            },
        };
        let chunk = parse_frame(&enc.tool_call(2, &call).unwrap());
        let tc = &chunk["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(tc["index"], 2);
        assert_eq!(tc["id"], "call_1");
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["arguments"], "{\"a\":1}");
    }

    #[test]
    fn test_finish_chunk_has_empty_delta_and_usage() {
        let enc = ChunkEncoder::new("c", "m", 0);
        let usage = OpenAiUsage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: 7,
        };
        let chunk = parse_frame(&enc.finish("stop", Some(usage)).unwrap());
        assert_eq!(chunk["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(chunk["choices"][0]["finish_reason"], "stop");
        assert_eq!(chunk["usage"]["total_tokens"], 7);
    }
}
