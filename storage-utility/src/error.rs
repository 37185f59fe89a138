//! Error types for storage and CDN operations

use thiserror::Error;

/// S3 error code the service returns when it gave up waiting on the request body
pub const REQUEST_TIMEOUT_CODE: &str = "RequestTimeout";

#[derive(Debug, Error)]
pub enum StorageError {
    /// The transport or the service timed out. This is the only retriable kind.
    #[error("Request timeout: {message}")]
    Timeout {
        message: String,
        http_body: Option<String>,
    },

    #[error("Storage service error ({}): {message}", code.as_deref().unwrap_or("unknown"))]
    Service {
        code: Option<String>,
        message: String,
        http_body: Option<String>,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

impl StorageError {
    pub fn timeout(message: impl Into<String>) -> Self {
        StorageError::Timeout {
            message: message.into(),
            http_body: None,
        }
    }

    pub fn is_transient_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }

    /// Raw response body attached to the error, if the service sent one
    pub fn http_body(&self) -> Option<&str> {
        match self {
            StorageError::Timeout { http_body, .. } | StorageError::Service { http_body, .. } => {
                http_body.as_deref()
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Timeout { .. } => "timeout",
            StorageError::Service { .. } => "service",
            StorageError::NotFound(_) => "not_found",
            StorageError::Transport(_) => "transport",
            StorageError::Transfer(_) => "transfer",
            StorageError::Io(_) => "io",
            StorageError::Config(_) => "config",
            StorageError::Signing(_) => "signing",
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// CDN invalidation errors
#[derive(Debug, Error)]
pub enum CdnError {
    #[error("Invalid invalidation request: {0}")]
    InvalidRequest(String),

    #[error("CDN service error ({}): {message}", code.as_deref().unwrap_or("unknown"))]
    Service {
        code: Option<String>,
        message: String,
    },

    #[error("CDN transport error: {0}")]
    Transport(String),

    #[error("CDN returned no invalidation for distribution {0}")]
    MissingInvalidation(String),
}

pub type CdnResult<T> = Result<T, CdnError>;
