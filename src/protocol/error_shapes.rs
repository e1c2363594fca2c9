use crate::error::ErrorCategory;

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Permission => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::ServerError => "server_error",
        ErrorCategory::Unknown => "upstream_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::Permission => "permission_denied",
        ErrorCategory::RateLimit => "rate_limit_exceeded",
        ErrorCategory::ServerError => "server_error",
        ErrorCategory::Unknown => "bad_gateway",
    }
}

#[must_use]
pub(crate) fn openai_error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": openai_error_type(cat),
            "code": openai_error_code(cat),
            "param": null,
        }
    })
}
