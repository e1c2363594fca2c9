use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::config::ServerConfig;
use crate::error::BridgeError;

use super::PreparedUpstream;

/// Upper bound on how much of a non-2xx body is echoed into the error message.
const ERROR_BODY_PREVIEW_BYTES: usize = 512;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
) -> Result<reqwest::Client, BridgeError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the upstream chat endpoint.
pub struct HttpTransport {
    base_client: OnceLock<Arc<reqwest::Client>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
}

impl HttpTransport {
    #[inline]
    fn effective_pool_max_idle_per_host(config: &ServerConfig) -> usize {
        let configured = config.http_pool_max_idle_per_host.max(1);
        match config.runtime_worker_threads {
            // Single-worker runtimes target low RSS.
            Some(1) => configured.min(8),
            _ => configured,
        }
    }

    /// Create a transport with connection pooling and timeouts from the server config.
    ///
    /// The underlying client is built on first use.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        Self {
            base_client: OnceLock::new(),
            pool_max_idle_per_host: Self::effective_pool_max_idle_per_host(config),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn build_base_client(&self) -> Arc<reqwest::Client> {
        match build_reqwest_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            self.timeout,
        ) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        }
    }

    fn base_client(&self) -> Arc<reqwest::Client> {
        if let Some(existing) = self.base_client.get() {
            return existing.clone();
        }

        let built = self.build_base_client();
        let _ = self.base_client.set(built.clone());
        self.base_client.get().cloned().unwrap_or(built)
    }

    /// POST a chat request and return the upstream response once its status is known.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the request cannot be sent and
    /// [`BridgeError::Upstream`] when the upstream answers with a non-2xx status.
    pub async fn send_chat(
        &self,
        upstream: &PreparedUpstream,
        body: Bytes,
    ) -> Result<reqwest::Response, BridgeError> {
        let response = self
            .base_client()
            .post(upstream.url())
            .headers(upstream.static_headers().clone())
            .body(body)
            .send()
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let preview_len = body.len().min(ERROR_BODY_PREVIEW_BYTES);
        let message = String::from_utf8_lossy(&body[..preview_len]).into_owned();
        tracing::warn!(
            status = status.as_u16(),
            body = %message,
            "upstream rejected chat request"
        );
        Err(BridgeError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

/// Body of an accepted upstream response as a byte stream.
pub fn response_byte_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
    response.bytes_stream()
}
