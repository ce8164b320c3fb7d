//! HTTP client for the external category classification service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::MappingError;
use crate::retry::{self, retry_with_backoff};
use crate::traits::{CategoryDetector, DetectedCategory, DetectionRequest};

const DETECT_PATH: &str = "v1/categories/detect";

/// Retry policy for [`HttpCategoryDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// Longest back-off a single call can sleep across all retries.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        retry::max_total_delay(self.max_retries, self.backoff_base_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

/// Calls `POST {base}/v1/categories/detect` with a JSON
/// [`DetectionRequest`] and expects a [`DetectedCategory`] back.
pub struct HttpCategoryDetector {
    client: Client,
    api_key: Option<String>,
    endpoint: Url,
    retry: RetryPolicy,
}

impl HttpCategoryDetector {
    /// Builds a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`MappingError::InvalidBaseUrl`] if `base_url` does
    /// not parse.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, MappingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("sfimport/0.1 (catalog-import)")
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let invalid = |reason: String| MappingError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let endpoint = Url::parse(&normalised)
            .and_then(|base| base.join(DETECT_PATH))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            endpoint,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn detect_once(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectedCategory, MappingError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MappingError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| MappingError::Deserialize {
            context: format!("detect_category(title={})", request.title),
            source,
        })
    }
}

#[async_trait]
impl CategoryDetector for HttpCategoryDetector {
    async fn detect_category(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectedCategory, MappingError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            self.detect_once(request)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_under_base_path() {
        let detector =
            HttpCategoryDetector::with_base_url(None, 5, "http://ai.local/classifier/").unwrap();
        assert_eq!(
            detector.endpoint().as_str(),
            "http://ai.local/classifier/v1/categories/detect"
        );

        let detector = HttpCategoryDetector::with_base_url(None, 5, "http://ai.local").unwrap();
        assert_eq!(
            detector.endpoint().as_str(),
            "http://ai.local/v1/categories/detect"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpCategoryDetector::with_base_url(None, 5, "not a url");
        assert!(matches!(result, Err(MappingError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let detector = HttpCategoryDetector::with_base_url(Some("  "), 5, "http://ai.local").unwrap();
        assert!(detector.api_key.is_none());
    }
}
