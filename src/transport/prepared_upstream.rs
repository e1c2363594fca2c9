use crate::config::UpstreamConfig;

/// Precomputed upstream endpoint and headers used by the request path.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    url: String,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// Header names and values are validated at config load time; anything
    /// that still fails to convert is skipped.
    #[must_use]
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            url: upstream.base_url.trim().to_string(),
            static_headers: Self::build_headers(upstream),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn static_headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }

    fn build_headers(upstream: &UpstreamConfig) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("text/event-stream"),
        );

        for (name, value) in &upstream.headers {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "skipping invalid static upstream header"),
            }
        }

        // Applied last so a static header cannot replace the token.
        if let Ok(val) = http::HeaderValue::from_str(&format!("Bearer {}", upstream.api_token)) {
            headers.insert(http::header::AUTHORIZATION, val);
        }
        headers
    }
}
