//! Configuration for the storage utility
//!
//! Values are read once from the environment (and an optional `.env` file)
//! into immutable structs that clients take ownership of at construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

use shared::observability::{init_logging, LogConfig, LogFormat, LogLevel};
use shared::reporting::{ErrorReporter, TracingReporter, WebhookReporter};

use crate::error::StorageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub cdn: CdnConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage = StorageConfig::from_env()?;
        let cdn = CdnConfig::from_env(&storage)?;

        Ok(Self {
            storage,
            cdn,
            reporting: ReportingConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.cdn.validate()?;
        Ok(())
    }
}

/// Object storage credentials and addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    /// Custom endpoint (MinIO, R2, ...). AWS is used when unset.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Per-attempt timeout; expiry surfaces as a transient timeout
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_key_id: env::var("STORAGE_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: env::var("STORAGE_SECRET_ACCESS_KEY").unwrap_or_default(),
            region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("STORAGE_BUCKET").unwrap_or_default(),
            endpoint: env::var("STORAGE_ENDPOINT").ok().filter(|s| !s.trim().is_empty()),
            force_path_style: env::var("STORAGE_FORCE_PATH_STYLE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid STORAGE_FORCE_PATH_STYLE")?,
            request_timeout_seconds: env::var("STORAGE_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid STORAGE_REQUEST_TIMEOUT_SECONDS")?,
            max_retries: env::var("STORAGE_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid STORAGE_MAX_RETRIES")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            anyhow::bail!("Storage bucket cannot be empty");
        }
        if self.region.trim().is_empty() {
            anyhow::bail!("Storage region cannot be empty");
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            anyhow::bail!("Storage credentials are required");
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("Storage request timeout must be at least 1 second");
        }
        Ok(())
    }

    /// Same checks as `validate`, surfaced as a storage error for client construction
    pub(crate) fn ensure_valid(&self) -> Result<(), StorageError> {
        self.validate().map_err(|e| StorageError::Config(e.to_string()))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
            bucket: String::new(),
            endpoint: None,
            force_path_style: false,
            request_timeout_seconds: 60,
            max_retries: 3,
        }
    }
}

/// CDN credentials default to the storage ones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub distribution_id: Option<String>,
}

impl CdnConfig {
    pub fn from_env(storage: &StorageConfig) -> Result<Self> {
        Ok(Self {
            access_key_id: env::var("CDN_ACCESS_KEY_ID")
                .unwrap_or_else(|_| storage.access_key_id.clone()),
            secret_access_key: env::var("CDN_SECRET_ACCESS_KEY")
                .unwrap_or_else(|_| storage.secret_access_key.clone()),
            distribution_id: env::var("CDN_DISTRIBUTION_ID").ok().filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            anyhow::bail!("CDN credentials are required");
        }
        Ok(())
    }
}

/// Where escalated errors are sent; the log is used when no webhook is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl ReportingConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: env::var("ERROR_WEBHOOK_URL").ok().filter(|s| !s.trim().is_empty()),
            webhook_secret: env::var("ERROR_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn build_reporter(&self) -> Arc<dyn ErrorReporter> {
        match &self.webhook_url {
            Some(url) => Arc::new(WebhookReporter::new(url.clone(), self.webhook_secret.clone())),
            None => Arc::new(TracingReporter),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        };
        config.to_log_config()?;
        Ok(config)
    }

    pub fn to_log_config(&self) -> Result<LogConfig> {
        let level: LogLevel = self.level.parse().context("Invalid LOG_LEVEL")?;
        let format: LogFormat = self.format.parse().context("Invalid LOG_FORMAT")?;
        Ok(LogConfig {
            level,
            format,
            ..Default::default()
        })
    }

    /// Install the global subscriber for `component`
    pub fn init(&self, component: &str) -> Result<()> {
        let mut log_config = self.to_log_config()?;
        log_config.component = component.to_string();
        init_logging(log_config).context("Failed to initialize logging")?;
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
