use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::api::common::ok_json_response;
use crate::config::UpstreamConfig;
use crate::error::BridgeError;
use crate::state::AppState;

const MODEL_CREATED: u64 = 1_677_610_602;
const MODEL_OWNER: &str = "z2api";

/// List advertised models in `OpenAI` format.
pub fn handler(State(state): State<Arc<AppState>>, headers: &HeaderMap) -> Response {
    if let Err(err) = state.authenticate(headers) {
        return err.into_response();
    }
    match serde_json::to_vec(&models_response_body(&state.config.upstream)) {
        Ok(body) => ok_json_response(bytes::Bytes::from(body)),
        Err(e) => BridgeError::Internal(format!("models serialization failed: {e}")).into_response(),
    }
}

/// Default model, listed models and alias names, deduplicated and sorted.
fn visible_model_ids(upstream: &UpstreamConfig) -> BTreeSet<&str> {
    std::iter::once(upstream.default_model.as_str())
        .chain(upstream.models.iter().map(String::as_str))
        .chain(upstream.model_aliases.keys().map(String::as_str))
        .filter(|id| !id.trim().is_empty())
        .collect()
}

fn models_response_body(upstream: &UpstreamConfig) -> Value {
    let data: Vec<Value> = visible_model_ids(upstream)
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": MODEL_CREATED,
                "owned_by": MODEL_OWNER,
                "permission": [],
                "root": id,
                "parent": null,
            })
        })
        .collect();
    json!({ "object": "list", "data": data })
}
