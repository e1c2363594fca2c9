use std::collections::HashSet;

use crate::config::AppConfig;
use crate::error::BridgeError;
use http::header::AUTHORIZATION;

/// Compact key index used in hot-path authentication.
pub enum AllowedClientKeys {
    Empty,
    Single { raw: Box<str>, bearer: Box<str> },
    Multiple(HashSet<String>),
}

/// Extract the API key from `Authorization: Bearer <key>`.
///
/// # Errors
///
/// Returns `BridgeError::Auth` when the header is missing or not a bearer token.
pub fn extract_api_key(headers: &http::HeaderMap) -> Result<&str, BridgeError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| BridgeError::Auth("Missing API key".to_string()))
}

/// Authenticate an incoming request against the pre-indexed `allowed_keys`.
///
/// # Errors
///
/// Returns `BridgeError::Auth` when the API key is missing or invalid.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), BridgeError> {
    match allowed_keys {
        AllowedClientKeys::Single { raw: _, bearer } => match headers.get(AUTHORIZATION) {
            Some(value) if value.as_bytes() == bearer.as_bytes() => Ok(()),
            Some(_) => Err(BridgeError::Auth("Invalid API key".to_string())),
            None => Err(BridgeError::Auth("Missing API key".to_string())),
        },
        AllowedClientKeys::Multiple(allowed_set) => {
            let client_key = extract_api_key(headers)?;
            if allowed_set.contains(client_key) {
                Ok(())
            } else {
                Err(BridgeError::Auth("Invalid API key".to_string()))
            }
        }
        AllowedClientKeys::Empty => Err(BridgeError::Auth("Invalid API key".to_string())),
    }
}

/// Build a hash-set index for allowed client keys.
#[must_use]
pub fn build_allowed_key_set(config: &AppConfig) -> AllowedClientKeys {
    let mut allowed_set: HashSet<String> = config
        .client_authentication
        .allowed_keys
        .iter()
        .cloned()
        .collect();

    match allowed_set.len() {
        0 => AllowedClientKeys::Empty,
        1 => match allowed_set.drain().next() {
            Some(single_key) => AllowedClientKeys::Single {
                bearer: format!("Bearer {single_key}").into_boxed_str(),
                raw: single_key.into_boxed_str(),
            },
            None => AllowedClientKeys::Empty,
        },
        _ => AllowedClientKeys::Multiple(allowed_set),
    }
}
