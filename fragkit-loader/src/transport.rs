//! Fragment transport
//!
//! One batched request per batch key:
//!
//! ```text
//! GET <base_url><id>,<id>,.../?lines_of_context=<spec>&allow_expansion=1&<cache_token>
//! ```
//!
//! The body is the framed record stream decoded by `fragkit_common::framing`.

use async_trait::async_trait;
use fragkit_common::config::LoaderConfig;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Ids to fetch under one batch key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub batch_key: String,
    pub item_ids: Vec<String>,
}

/// Fetches the framed body for one batch
#[async_trait]
pub trait FragmentTransport: Send + Sync {
    async fn fetch(&self, request: &BatchRequest) -> Result<Vec<u8>, TransportError>;
}

/// Build the request URL for a set of item ids
pub fn build_request_url(config: &LoaderConfig, item_ids: &[String]) -> String {
    let mut url = format!("{}{}/?", config.base_url, item_ids.join(","));

    if let Some(lines) = &config.lines_of_context {
        url.push_str("lines_of_context=");
        url.push_str(lines);
        url.push('&');
    }
    url.push_str("allow_expansion=1");
    if let Some(token) = &config.cache_token {
        url.push('&');
        url.push_str(token);
    }

    url
}

/// reqwest-backed transport
pub struct HttpTransport {
    http_client: reqwest::Client,
    config: LoaderConfig,
}

impl HttpTransport {
    pub fn new(config: LoaderConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn request_url(&self, request: &BatchRequest) -> String {
        build_request_url(&self.config, &request.item_ids)
    }
}

#[async_trait]
impl FragmentTransport for HttpTransport {
    async fn fetch(&self, request: &BatchRequest) -> Result<Vec<u8>, TransportError> {
        let url = self.request_url(request);

        tracing::debug!(
            batch_key = %request.batch_key,
            items = request.item_ids.len(),
            url = %url,
            "Requesting fragment batch"
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(status.as_u16(), error_text));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragkit_common::config::{FailurePolicy, LoggingConfig};

    fn config(lines: Option<&str>, token: Option<&str>) -> LoaderConfig {
        LoaderConfig {
            base_url: "http://reviews.example.com/r/1/fragments/".to_string(),
            lines_of_context: lines.map(str::to_string),
            cache_token: token.map(str::to_string),
            request_timeout_secs: 30,
            user_agent: "fragkit-test".to_string(),
            failure_policy: FailurePolicy::Continue,
            logging: LoggingConfig::default(),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_url_with_all_parameters() {
        let url = build_request_url(&config(Some("5"), Some("1700000000")), &ids(&["12", "13"]));
        assert_eq!(
            url,
            "http://reviews.example.com/r/1/fragments/12,13/?lines_of_context=5&allow_expansion=1&1700000000"
        );
    }

    #[test]
    fn test_url_without_optional_parameters() {
        let url = build_request_url(&config(None, None), &ids(&["7"]));
        assert_eq!(
            url,
            "http://reviews.example.com/r/1/fragments/7/?allow_expansion=1"
        );
    }

    #[test]
    fn test_client_creation() {
        let transport = HttpTransport::new(config(None, None));
        assert!(transport.is_ok());
    }
}
