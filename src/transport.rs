//! HTTP transport used by the task creator and the result poller.
//!
//! The protocol components only ever see the [`Transport`] trait, so tests can
//! swap in a scripted double and production code uses [`HttpTransport`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{SolverError, SolverResult, TransportError};

/// Longest response body excerpt carried in an error message.
const MAX_BODY_EXCERPT: usize = 512;

/// A JSON-over-HTTP POST endpoint relative to a fixed base URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `path` and return the decoded JSON response.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError>;
}

/// reqwest-backed transport. Read-only after construction and safe to share.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a client with the configured timeout and `User-Agent` header.
    pub fn new(config: &ClientConfig) -> SolverResult<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            SolverError::InvalidConfig(format!("invalid base url {:?}: {}", config.base_url, e))
        })?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SolverError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let url = self.endpoint(path)?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: excerpt(text),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            TransportError::Malformed(format!(
                "failed to parse response: {}, body: {}",
                e,
                excerpt(text)
            ))
        })
    }
}

/// Cut a response body down to [`MAX_BODY_EXCERPT`] characters for error messages.
fn excerpt(mut body: String) -> String {
    if let Some((cut, _)) = body.char_indices().nth(MAX_BODY_EXCERPT) {
        let total = body.len();
        body.truncate(cut);
        body.push_str(&format!("... [truncated, {} bytes total]", total));
    }
    body
}
