//! Observability utilities for logging and operation tracing

pub mod logging;
pub mod spans;

pub use logging::*;
pub use spans::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Logging setup error: {0}")]
    Logging(String),
}

pub type ObservabilityResult<T> = Result<T, ObservabilityError>;
