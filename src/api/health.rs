use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "z2api-rs is running",
        "config": {
            "default_model": config.upstream.default_model,
            "models_count": config.upstream.models.len(),
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "features": {
                "tool_support": config.features.tool_support,
                "thinking_mode": config.features.thinking_mode.to_string(),
                "enable_thinking": config.upstream.enable_thinking,
                "log_level": config.features.log_level,
            }
        }
    }))
}
