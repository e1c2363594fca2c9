use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::response::Response;

use crate::api::common::{handle_non_streaming, handle_streaming};
use crate::error::BridgeError;
use crate::fc::{generate_tool_prompt, inject_tool_prompt, preprocess_messages};
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::upstream::request::{encode_upstream_request, UpstreamMessage};
use crate::state::AppState;
use crate::util::unix_now_secs;

use super::parse::parse_openai_chat_request_wire;

pub(crate) async fn handler_inner(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, BridgeError> {
    let start_time = Instant::now();
    state.authenticate(&headers)?;
    let request = parse_openai_chat_request_wire(&body)?;

    let tool_mode = state.config.features.tool_support && request.wants_tools();
    let messages = build_upstream_messages(&state, &request, tool_mode)?;

    let upstream_config = &state.config.upstream;
    let upstream_model = upstream_config.resolve_model(&request.model);
    let client_model = if request.model.is_empty() {
        upstream_config.default_model.as_str()
    } else {
        request.model.as_str()
    };
    let stream = request.stream.unwrap_or(false);
    let ids = state.next_request_ids();
    tracing::debug!(
        request_seq = ids.seq,
        client_model,
        upstream_model,
        stream,
        tool_mode,
        "forwarding chat completion"
    );

    let upstream_request = encode_upstream_request(
        &request,
        upstream_model,
        messages,
        upstream_config.enable_thinking,
        ids.chat_id.to_string(),
        ids.message_id.to_string(),
    );
    let upstream_body = serde_json::to_vec(&upstream_request)
        .map_err(|e| BridgeError::Internal(format!("upstream request serialization failed: {e}")))?;

    let upstream_response = state
        .transport
        .send_chat(&state.upstream, bytes::Bytes::from(upstream_body))
        .await?;

    let created = unix_now_secs();
    if stream {
        Ok(handle_streaming(
            &state.config,
            upstream_response,
            &ids,
            client_model,
            created,
            tool_mode,
        ))
    } else {
        handle_non_streaming(
            &state.config,
            upstream_response,
            &ids,
            client_model,
            created,
            tool_mode,
            start_time,
        )
        .await
    }
}

/// Flatten the conversation and, in tool mode, put the tool prompt in front.
fn build_upstream_messages(
    state: &AppState,
    request: &OpenAiChatRequest,
    tool_mode: bool,
) -> Result<Vec<UpstreamMessage>, BridgeError> {
    let mut messages = preprocess_messages(&request.messages);
    if tool_mode {
        let features = &state.config.features;
        let prompt = generate_tool_prompt(
            request.tools.as_deref().unwrap_or_default(),
            request.tool_choice.as_ref(),
            features.tool_prompt_template.as_deref(),
        )?;
        inject_tool_prompt(&mut messages, &prompt);
    }
    Ok(messages)
}
