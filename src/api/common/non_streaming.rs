use std::time::Instant;

use axum::response::Response;

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::observability::log_request_complete;
use crate::state::RequestIds;
use crate::stream::{
    collect_response, raw_event_stream, DeliveryMode, FullAssembler, PhaseAccumulator,
    ResponseMeta,
};
use crate::transport::response_byte_stream;

#[inline]
pub(crate) fn ok_json_response(body_bytes: bytes::Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Drain the upstream stream and answer with one `chat.completion` object.
///
/// # Errors
///
/// Returns [`BridgeError::Internal`] if the response cannot be serialized.
pub(crate) async fn handle_non_streaming(
    config: &AppConfig,
    upstream_response: reqwest::Response,
    ids: &RequestIds,
    client_model: &str,
    created: u64,
    tool_mode: bool,
    start_time: Instant,
) -> Result<Response, BridgeError> {
    let features = &config.features;
    let assembler = FullAssembler::new(
        PhaseAccumulator::new(DeliveryMode::Collect, features.thinking_mode, tool_mode),
        features.scan_limit,
    );
    let meta = ResponseMeta {
        id: ids.completion_id.clone(),
        model: client_model.to_string(),
        created,
    };
    let events = raw_event_stream(response_byte_stream(upstream_response));
    let response = collect_response(events, assembler, &meta).await;

    if let Some(choice) = response.choices.first() {
        log_request_complete(
            client_model,
            &choice.finish_reason,
            Some(&response.usage),
            start_time,
        );
    }

    let body = serde_json::to_vec(&response)
        .map_err(|e| BridgeError::Internal(format!("response serialization failed: {e}")))?;
    Ok(ok_json_response(bytes::Bytes::from(body)))
}
