use std::time::{Duration, Instant};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::openai_chat::OpenAiUsage;

/// Map a configured log level onto a tracing filter directive.
///
/// `DISABLED` yields `None`; `WARNING` becomes `WARN` and `CRITICAL` becomes `ERROR`.
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG`, when set, takes precedence over the config value.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Log model, finish reason and usage for a completed request.
pub fn log_request_complete(
    model: &str,
    finish_reason: &str,
    usage: Option<&OpenAiUsage>,
    start_time: Instant,
) {
    log_request_usage(model, finish_reason, usage, start_time.elapsed());
}

fn log_request_usage(
    model: &str,
    finish_reason: &str,
    usage: Option<&OpenAiUsage>,
    elapsed: Duration,
) {
    let usage = usage.copied().unwrap_or_default();
    info!(
        model = model,
        finish_reason = finish_reason,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_ms = elapsed.as_millis() as u64,
        "request complete"
    );
}
