use serde::Serialize;
use serde_json::Value;

use crate::protocol::openai_chat::OpenAiChatRequest;

/// Body posted to the upstream streaming chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub stream: bool,
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub params: UpstreamParams,
    pub features: UpstreamFeatures,
    pub chat_id: String,
    pub id: String,
}

/// Plain-text message accepted by the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

impl UpstreamMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded from the client request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpstreamParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamFeatures {
    pub enable_thinking: bool,
}

/// Build the upstream request body.
///
/// `messages` must already be flattened to plain text (see
/// [`crate::fc::preprocess`]). `chat_id` and `id` identify the conversation and
/// this turn to the upstream.
#[must_use]
pub fn encode_upstream_request(
    client: &OpenAiChatRequest,
    upstream_model: &str,
    messages: Vec<UpstreamMessage>,
    enable_thinking: bool,
    chat_id: String,
    id: String,
) -> UpstreamChatRequest {
    UpstreamChatRequest {
        stream: true,
        model: upstream_model.to_string(),
        messages,
        params: UpstreamParams {
            temperature: client.temperature,
            top_p: client.top_p,
            max_tokens: client.max_tokens,
        },
        features: UpstreamFeatures { enable_thinking },
        chat_id,
        id,
    }
}

/// Flatten an `OpenAI` message `content` value to plain text.
///
/// Strings pass through; arrays of content parts keep their `text` parts
/// joined by newlines; anything else becomes empty.
#[must_use]
pub fn content_to_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => {
            let mut out = String::new();
            for part in parts {
                let text = match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                };
                if let Some(text) = text {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
            out
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let client: OpenAiChatRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2
        }))
        .unwrap();
        let body = encode_upstream_request(
            &client,
            "glm-4.5",
            vec![UpstreamMessage::new("user", "hi")],
            false,
            "chat-1".into(),
            "msg-1".into(),
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["model"], "glm-4.5");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["params"]["temperature"], 0.2);
        assert!(json["params"].get("top_p").is_none());
        assert_eq!(json["features"]["enable_thinking"], false);
        assert_eq!(json["chat_id"], "chat-1");
        assert_eq!(json["id"], "msg-1");
    }

    #[test]
    fn test_content_to_text_joins_text_parts() {
        let content = json!([
            {"type": "text", "text": "look at"},
            {"type": "image_url", "image_url": {"url": "data:..."}},
            {"type": "text", "text": "this"}
        ]);
        assert_eq!(content_to_text(Some(&content)), "look at\nthis");
        assert_eq!(content_to_text(Some(&json!("plain"))), "plain");
        assert_eq!(content_to_text(None), "");
    }
}
