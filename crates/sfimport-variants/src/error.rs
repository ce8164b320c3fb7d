use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("invalid {class} pattern \"{pattern}\": {source}")]
    InvalidPattern {
        class: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read pattern file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
