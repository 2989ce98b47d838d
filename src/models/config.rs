//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Domain;
use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Document generation settings
    #[serde(default)]
    pub generate: GenerateConfig,

    /// Upload settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Search engine location
    #[serde(default)]
    pub solr: SolrConfig,

    /// Local database location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.generate.chunk_size == 0 {
            return Err(AppError::validation("generate.chunk_size must be > 0"));
        }
        if self.generate.concurrency == 0 {
            return Err(AppError::validation("generate.concurrency must be > 0"));
        }
        if self.upload.concurrency == 0 {
            return Err(AppError::validation("upload.concurrency must be > 0"));
        }
        url::Url::parse(&self.solr.host)
            .map_err(|e| AppError::validation(format!("solr.host is invalid: {e}")))?;
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::duration")]
    pub duration_ms: u64,

    /// Attempts per page before a transient failure becomes fatal
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// Delay between attempts in seconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,

    /// Contest categories to crawl submissions for (empty = all)
    #[serde(default)]
    pub submission_targets: Vec<String>,
}

impl CrawlerConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            duration_ms: defaults::duration(),
            retry_limit: defaults::retry_limit(),
            retry_delay_secs: defaults::retry_delay(),
            submission_targets: Vec::new(),
        }
    }
}

/// Document generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Root directory for chunk files; each domain gets a subdirectory
    #[serde(default = "defaults::save_dir")]
    pub save_dir: PathBuf,

    /// Documents per chunk file
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Converter workers
    #[serde(default = "defaults::generate_concurrency")]
    pub concurrency: usize,
}

impl GenerateConfig {
    /// Chunk directory for one domain.
    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.save_dir.join(domain)
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            save_dir: defaults::save_dir(),
            chunk_size: defaults::chunk_size(),
            concurrency: defaults::generate_concurrency(),
        }
    }
}

/// Upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload workers
    #[serde(default = "defaults::upload_concurrency")]
    pub concurrency: usize,

    /// Optimize instead of commit after a successful upload
    #[serde(default)]
    pub optimize: bool,

    /// Delete every document in the core before uploading
    #[serde(default)]
    pub truncate: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::upload_concurrency(),
            optimize: false,
            truncate: false,
        }
    }
}

/// Solr host and per-domain core names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrConfig {
    #[serde(default = "defaults::solr_host")]
    pub host: String,

    #[serde(default = "defaults::problem_core")]
    pub problem_core: String,

    #[serde(default = "defaults::user_core")]
    pub user_core: String,

    #[serde(default = "defaults::submission_core")]
    pub submission_core: String,
}

impl SolrConfig {
    pub fn core_name(&self, domain: Domain) -> &str {
        match domain {
            Domain::Problem => &self.problem_core,
            Domain::User => &self.user_core,
            Domain::Submission => &self.submission_core,
        }
    }
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            host: defaults::solr_host(),
            problem_core: defaults::problem_core(),
            user_core: defaults::user_core(),
            submission_core: defaults::submission_core(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: defaults::database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; acs-batch/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn duration() -> u64 {
        1000
    }
    pub fn retry_limit() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        60
    }

    // Generate defaults
    pub fn save_dir() -> PathBuf {
        PathBuf::from("data/documents")
    }
    pub fn chunk_size() -> usize {
        1000
    }
    pub fn generate_concurrency() -> usize {
        4
    }

    // Upload defaults
    pub fn upload_concurrency() -> usize {
        2
    }

    // Solr defaults
    pub fn solr_host() -> String {
        "http://localhost:8983".into()
    }
    pub fn problem_core() -> String {
        "problem".into()
    }
    pub fn user_core() -> String {
        "user".into()
    }
    pub fn submission_core() -> String {
        "submission".into()
    }

    pub fn database_path() -> PathBuf {
        PathBuf::from("data/acs.db")
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
