//! Wire model of the upstream phase/delta chat API.

pub mod request;

use serde::de::Error as _;
use serde_json::Value;

use crate::protocol::openai_chat::OpenAiUsage;

/// Generation stage declared by an upstream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    Thinking,
    Answer,
    Done,
    #[default]
    Other,
}

impl Phase {
    fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("thinking") => Phase::Thinking,
            Some("answer") => Phase::Answer,
            Some("done") => Phase::Done,
            _ => Phase::Other,
        }
    }
}

/// Error reported inside an upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub code: i64,
    pub detail: String,
}

/// Decoded payload of one upstream `data:` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamFrame {
    pub frame_type: String,
    pub phase: Phase,
    pub delta_content: String,
    pub edit_content: String,
    pub done: bool,
    pub usage: Option<OpenAiUsage>,
    pub error: Option<UpstreamError>,
}

impl UpstreamFrame {
    /// Whether this frame ends the response.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.done || self.phase == Phase::Done
    }
}

/// Decode a parsed upstream `data:` payload.
///
/// The error is looked up at the outer `error`, then `data.error`, then
/// `data.inner.error`; the first non-null one wins. Every other field is read
/// on its own, so a field with an unexpected type is dropped without losing the
/// rest of the frame.
///
/// # Errors
///
/// Returns an error when the payload is not a JSON object.
pub fn decode_frame(value: &Value) -> Result<UpstreamFrame, serde_json::Error> {
    let Some(root) = value.as_object() else {
        return Err(serde_json::Error::custom(format!(
            "upstream frame must be a JSON object, got {value}"
        )));
    };
    let error = [
        value.get("error"),
        value.pointer("/data/error"),
        value.pointer("/data/inner/error"),
    ]
    .into_iter()
    .flatten()
    .find_map(upstream_error_from_value);

    let data = root.get("data").and_then(Value::as_object);
    let field = |key: &str| data.and_then(|data| data.get(key));

    Ok(UpstreamFrame {
        frame_type: text_field(root.get("type")),
        phase: Phase::from_wire(field("phase").and_then(Value::as_str)),
        delta_content: text_field(field("delta_content")),
        edit_content: text_field(field("edit_content")),
        done: field("done").and_then(Value::as_bool).unwrap_or(false),
        usage: field("usage").and_then(usage_from_value),
        error,
    })
}

fn text_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Token count as an integer, a whole float or a numeric string.
fn token_count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn usage_from_value(value: &Value) -> Option<OpenAiUsage> {
    let usage = value.as_object()?;
    let prompt_tokens = token_count(usage.get("prompt_tokens")).unwrap_or(0);
    let completion_tokens = token_count(usage.get("completion_tokens")).unwrap_or(0);
    Some(OpenAiUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: token_count(usage.get("total_tokens"))
            .unwrap_or(prompt_tokens + completion_tokens),
    })
}

fn upstream_error_from_value(value: &Value) -> Option<UpstreamError> {
    match value {
        Value::Null => None,
        Value::String(detail) => Some(UpstreamError {
            code: 0,
            detail: detail.clone(),
        }),
        Value::Object(map) => {
            let code = match map.get("code") {
                Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
                Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
                _ => 0,
            };
            let detail = ["detail", "message", "msg"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map_or_else(|| value.to_string(), str::to_string);
            Some(UpstreamError { code, detail })
        }
        other => Some(UpstreamError {
            code: 0,
            detail: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_answer_frame() {
        let frame = decode_frame(&json!({
            "type": "chat:completion",
            "data": {"phase": "answer", "delta_content": "hi", "edit_content": ""}
        }))
        .unwrap();
        assert_eq!(frame.frame_type, "chat:completion");
        assert_eq!(frame.phase, Phase::Answer);
        assert_eq!(frame.delta_content, "hi");
        assert!(!frame.is_terminal());
        assert!(frame.error.is_none());
    }

    #[test]
    fn test_decode_tolerates_nulls_and_unknown_phase() {
        let frame = decode_frame(&json!({
            "type": "chat:completion",
            "data": {"phase": "tool_call", "delta_content": null, "done": null}
        }))
        .unwrap();
        assert_eq!(frame.phase, Phase::Other);
        assert_eq!(frame.delta_content, "");
        assert!(!frame.done);
    }

    #[test]
    fn test_done_phase_and_flag_are_terminal() {
        let by_phase = decode_frame(&json!({"data": {"phase": "done"}})).unwrap();
        assert!(by_phase.is_terminal());
        let by_flag = decode_frame(&json!({"data": {"phase": "answer", "done": true}})).unwrap();
        assert!(by_flag.is_terminal());
    }

    #[test]
    fn test_usage_total_defaults_to_sum() {
        let frame = decode_frame(&json!({
            "data": {"usage": {"prompt_tokens": 5, "completion_tokens": 6}}
        }))
        .unwrap();
        assert_eq!(
            frame.usage,
            Some(OpenAiUsage {
                prompt_tokens: 5,
                completion_tokens: 6,
                total_tokens: 11
            })
        );
    }

    #[test]
    fn test_error_precedence_outer_first() {
        let frame = decode_frame(&json!({
            "error": {"code": 401, "detail": "outer"},
            "data": {
                "error": {"code": 500, "detail": "data"},
                "inner": {"error": {"code": 429, "detail": "inner"}}
            }
        }))
        .unwrap();
        assert_eq!(
            frame.error,
            Some(UpstreamError {
                code: 401,
                detail: "outer".into()
            })
        );
    }

    #[test]
    fn test_error_falls_through_to_inner() {
        let frame = decode_frame(&json!({
            "error": null,
            "data": {"error": null, "inner": {"error": {"code": "429", "message": "busy"}}}
        }))
        .unwrap();
        let err = frame.error.unwrap();
        assert_eq!(err.code, 429);
        assert_eq!(err.detail, "busy");
    }

    #[test]
    fn test_outer_error_survives_malformed_inner() {
        let frame = decode_frame(&json!({
            "error": {"code": 500, "detail": "boom"},
            "data": {"inner": "oops"}
        }))
        .unwrap();
        assert_eq!(
            frame.error,
            Some(UpstreamError {
                code: 500,
                detail: "boom".into()
            })
        );
    }

    #[test]
    fn test_mistyped_field_keeps_rest_of_frame() {
        let frame = decode_frame(&json!({
            "type": 7,
            "data": {
                "phase": "answer",
                "delta_content": "hello",
                "done": "yes",
                "usage": "n/a",
                "inner": ["x"]
            }
        }))
        .unwrap();
        assert_eq!(frame.phase, Phase::Answer);
        assert_eq!(frame.delta_content, "hello");
        assert_eq!(frame.frame_type, "");
        assert!(!frame.done);
        assert!(frame.usage.is_none());
        assert!(frame.error.is_none());
    }

    #[test]
    fn test_float_token_counts_are_accepted() {
        let frame = decode_frame(&json!({
            "data": {"phase": "answer", "delta_content": "hi", "usage": {"prompt_tokens": 3.0, "completion_tokens": "2"}}
        }))
        .unwrap();
        assert_eq!(
            frame.usage,
            Some(OpenAiUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            })
        );
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(decode_frame(&json!("plain text")).is_err());
    }
}
