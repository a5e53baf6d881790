//! Authenticated JSON session against xueqiu.com.
//!
//! Every request carries the session cookie captured from a logged-in browser
//! and a browser user agent; without both the service answers with a captcha
//! page instead of JSON.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

pub const XUEQIU_BASE_URL: &str = "https://xueqiu.com";

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:60.0) Gecko/20100101 Firefox/60.0";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Shared HTTP session. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct XueqiuHttp {
    client: Client,
    token: Arc<SecretString>,
    base_url: String,
    timeout: Duration,
}

impl XueqiuHttp {
    /// Create a session using `token` as the raw `Cookie` header value.
    pub fn new(token: SecretString) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            token: Arc::new(token),
            base_url: XUEQIU_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the site root (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// The HTTP status is ignored: the service reports unknown
    /// cubes as a 4xx with a JSON error envelope, and callers classify that
    /// envelope themselves.
    pub async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header(COOKIE, self.token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            tracing::debug!(url, status = %status, "non-success status from xueqiu");
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
