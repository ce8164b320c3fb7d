//! Fetching catalog files by URL.
//!
//! The format comes from, in order: the caller, the extension of the last
//! URL path segment, the response `Content-Type`.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use sfimport_core::FileType;
use thiserror::Error;

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid catalog URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network, TLS or timeout failure.
    #[error("HTTP error fetching catalog: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("catalog at {url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("cannot tell the format of {url} (content type {content_type}); pass the file type")]
    UnknownFormat { url: String, content_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Whole-request timeout, body included.
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

/// A fetched catalog, ready to submit.
#[derive(Debug, Clone)]
pub struct DownloadedCatalog {
    pub url: String,
    /// Last path segment of the URL, if it has one.
    pub file_name: Option<String>,
    pub file_type: FileType,
    pub bytes: Vec<u8>,
}

pub struct CatalogDownloader {
    client: Client,
    max_bytes: u64,
}

fn invalid(url: &str, reason: impl Into<String>) -> DownloadError {
    DownloadError::InvalidUrl {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn url_file_name(url: &Url) -> Option<String> {
    url.path()
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Maps a `Content-Type` header onto a catalog format. Parameters such as
/// `charset` are ignored.
fn file_type_from_content_type(content_type: &str) -> Option<FileType> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "text/csv" | "application/csv" | "text/comma-separated-values" => Some(FileType::Csv),
        "text/xml" | "application/xml" => Some(FileType::Xml),
        "application/zip" | "application/x-zip-compressed" => Some(FileType::Zip),
        other if other.ends_with("+xml") => Some(FileType::Xml),
        _ => None,
    }
}

impl CatalogDownloader {
    /// # Errors
    ///
    /// Returns [`DownloadError::Http`] if the `reqwest::Client` cannot be
    /// constructed.
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .user_agent("sfimport/0.1 (catalog-import)")
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    /// Downloads `url` whole. `explicit` overrides format detection.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] unless `url` is an absolute http(s) URL.
    /// - [`DownloadError::UnexpectedStatus`] for a non-2xx response.
    /// - [`DownloadError::UnknownFormat`] when no format can be inferred.
    /// - [`DownloadError::TooLarge`] once the body passes the size limit.
    /// - [`DownloadError::Http`] on network failure or timeout.
    pub async fn fetch(
        &self,
        url: &str,
        explicit: Option<FileType>,
    ) -> Result<DownloadedCatalog, DownloadError> {
        let parsed = Url::parse(url.trim()).map_err(|e| invalid(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(url, format!("unsupported scheme '{}'", parsed.scheme())));
        }
        let file_name = url_file_name(&parsed);

        let mut response = self.client.get(parsed.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UnexpectedStatus {
                status: status.as_u16(),
                url: parsed.to_string(),
            });
        }
        let too_large = || DownloadError::TooLarge {
            url: parsed.to_string(),
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|length| length > self.max_bytes)
        {
            return Err(too_large());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let file_type = explicit
            .or_else(|| file_name.as_deref().and_then(FileType::from_file_name))
            .or_else(|| content_type.as_deref().and_then(file_type_from_content_type))
            .ok_or_else(|| DownloadError::UnknownFormat {
                url: parsed.to_string(),
                content_type: content_type.clone().unwrap_or_else(|| "unset".to_string()),
            })?;

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let total = u64::try_from(bytes.len() + chunk.len()).unwrap_or(u64::MAX);
            if total > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::info!(
            url = %parsed,
            %file_type,
            bytes = bytes.len(),
            content_type = content_type.as_deref().unwrap_or("-"),
            "catalog downloaded"
        );
        Ok(DownloadedCatalog {
            url: parsed.to_string(),
            file_name,
            file_type,
            bytes,
        })
    }
}
