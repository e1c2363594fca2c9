use std::convert::Infallible;

use axum::response::Response;
use futures_util::StreamExt;

use crate::config::AppConfig;
use crate::state::RequestIds;
use crate::stream::{
    raw_event_stream, sse_chunk_stream, DeliveryMode, PhaseAccumulator, StreamAssembler,
};
use crate::protocol::openai_chat::encoder::ChunkEncoder;
use crate::transport::response_byte_stream;

/// Stream an accepted upstream response to the client as `chat.completion.chunk` frames.
///
/// Dropping the returned body (client disconnect) drops the decoder and the
/// upstream body with it.
pub(crate) fn handle_streaming(
    config: &AppConfig,
    upstream_response: reqwest::Response,
    ids: &RequestIds,
    client_model: &str,
    created: u64,
    tool_mode: bool,
) -> Response {
    let features = &config.features;
    let assembler = StreamAssembler::new(
        ChunkEncoder::new(ids.completion_id.as_str(), client_model, created),
        PhaseAccumulator::new(DeliveryMode::Incremental, features.thinking_mode, tool_mode),
        features.scan_limit,
    );
    let events = raw_event_stream(response_byte_stream(upstream_response));
    let body = sse_chunk_stream(events, assembler).map(Ok::<bytes::Bytes, Infallible>);
    sse_ok_response(axum::body::Body::from_stream(body))
}

#[inline]
fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
