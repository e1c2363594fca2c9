use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_features(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    if config.client_authentication.allowed_keys.is_empty() {
        return Err(validation_err("allowed_keys cannot be empty"));
    }
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let base_url = upstream.base_url.trim();
    if base_url.is_empty() {
        return Err(validation_err("upstream.base_url cannot be empty"));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(validation_err(format!(
            "upstream.base_url must start with http:// or https://, got '{base_url}'"
        )));
    }
    if upstream.api_token.trim().is_empty() {
        return Err(validation_err("upstream.api_token cannot be empty"));
    }
    if upstream.default_model.trim().is_empty() {
        return Err(validation_err("upstream.default_model cannot be empty"));
    }
    for (name, value) in &upstream.headers {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "upstream.headers contains an invalid header name '{name}'"
            )));
        }
        if http::HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "upstream.headers['{name}'] is not a valid header value"
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level must be one of {VALID_LOG_LEVELS:?}, got '{}'",
            config.features.log_level
        )));
    }
    Ok(())
}

fn validate_features(config: &AppConfig) -> Result<(), ConfigError> {
    let features = &config.features;
    if features.scan_limit == 0 {
        return Err(validation_err("features.scan_limit must be greater than 0"));
    }
    if let Some(template) = features.tool_prompt_template.as_deref() {
        if !template.contains("{tools}") {
            return Err(validation_err(
                "features.tool_prompt_template must contain the {tools} placeholder",
            ));
        }
    }
    Ok(())
}
