//! Shared domain types for the storefront catalog import pipeline.
//!
//! Everything here is plain data: jobs, normalized product records, typed
//! attribute values, taxonomy templates and mapping results. Behaviour lives
//! in the parser, variant, mapping and pipeline crates.

pub mod app_config;
pub mod config;
pub mod jobs;
pub mod products;
pub mod taxonomy;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use jobs::{
    CategoryMappingMode, FileType, ImportError, ImportJob, ImportJobStatus, ImportOptions,
    JobCounters, JobStatus, NewImportJob, UpdateMode,
};
pub use products::{
    record_location, AttributeValue, Attributes, ImportProductRequest, ImportValidationError,
    ORIGINAL_CATEGORY_ATTRIBUTE, VARIANT_GROUP_ATTRIBUTE,
};
pub use taxonomy::{
    AttributePurpose, AttributeTemplate, AttributeValueType, Category, CategoryMappingSuggestion,
    MappedAttribute, NewCategoryMapping, StorefrontCategoryMapping, ValidationRules,
};

/// Errors raised when converting stored or user-supplied strings into
/// domain enums.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid job status: {0}")]
    InvalidJobStatus(String),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("invalid update mode: {0}")]
    InvalidUpdateMode(String),
    #[error("invalid category mapping mode: {0}")]
    InvalidCategoryMappingMode(String),
    #[error("invalid attribute value type: {0}")]
    InvalidAttributeType(String),
    #[error("invalid attribute purpose: {0}")]
    InvalidAttributePurpose(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Failure reported by a persistence collaborator.
///
/// Storage backends convert their own errors into this type so the pipeline
/// crates stay independent of any particular database driver.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
