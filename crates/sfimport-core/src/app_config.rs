use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Number of import workers draining the shared task queue.
    pub queue_workers: usize,
    /// Bounded capacity of the task queue; a full queue rejects new jobs.
    pub queue_capacity: usize,
    /// Base URL of the category classification service. `None` disables AI
    /// detection and every unmapped path falls back to the default category.
    pub ai_detector_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_timeout_secs: u64,
    pub ai_max_retries: u32,
    pub ai_retry_backoff_base_ms: u64,
    pub default_category_id: i64,
    pub variant_min_group_size: usize,
    pub variant_min_confidence: f64,
    /// Optional YAML file with extra variant pattern tokens.
    pub variant_patterns_path: Option<PathBuf>,
    /// Whole-request timeout for catalogs fetched by URL.
    pub download_timeout_secs: u64,
    /// Largest catalog accepted from a URL.
    pub download_max_bytes: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("queue_workers", &self.queue_workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("ai_detector_url", &self.ai_detector_url)
            .field(
                "ai_api_key",
                &self.ai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("ai_timeout_secs", &self.ai_timeout_secs)
            .field("ai_max_retries", &self.ai_max_retries)
            .field("ai_retry_backoff_base_ms", &self.ai_retry_backoff_base_ms)
            .field("default_category_id", &self.default_category_id)
            .field("variant_min_group_size", &self.variant_min_group_size)
            .field("variant_min_confidence", &self.variant_min_confidence)
            .field("variant_patterns_path", &self.variant_patterns_path)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("download_max_bytes", &self.download_max_bytes)
            .finish()
    }
}
