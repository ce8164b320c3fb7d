use sfimport_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    /// Network or TLS failure talking to the classifier.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("category detection timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid classifier URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("category path is empty")]
    EmptyCategoryPath,

    #[error("category {0} does not exist")]
    UnknownCategory(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
