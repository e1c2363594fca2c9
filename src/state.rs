mod request_id;

use crate::auth::{authenticate, build_allowed_key_set, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIdGenerator;
pub use request_id::RequestIds;

/// Shared application state accessible to all handlers.
///
/// Holds only immutable configuration and connection pools; translation state
/// lives in the per-request assemblers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let transport = HttpTransport::new(&config.server);
        let upstream = PreparedUpstream::new(&config.upstream);
        let allowed_client_keys = build_allowed_key_set(&config);
        Self {
            config,
            transport,
            upstream,
            allowed_client_keys,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Authenticate a request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    #[must_use]
    pub fn next_request_ids(&self) -> RequestIds {
        self.request_ids.next_ids()
    }
}
