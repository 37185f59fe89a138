//! Bounded retry for transient storage timeouts
//!
//! Only `StorageError::Timeout` is retried, immediately and at most
//! `max_retries` times. When the budget runs out the final error is handed to
//! the error reporter once and then returned. Every other error returns on the
//! spot without a report.

use std::future::Future;
use std::sync::Arc;

use shared::reporting::{ErrorReport, ErrorReporter, TracingReporter};
use tracing::{debug, error, warn};

use crate::error::StorageResult;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct Retrier {
    max_retries: u32,
    reporter: Arc<dyn ErrorReporter>,
}

impl Retrier {
    pub fn new(max_retries: u32, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            max_retries,
            reporter,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `work` until it succeeds, fails with a non-transient error, or
    /// exhausts the retry budget. The closure is called once per attempt, so
    /// anything it resolves (bucket, object handle) is fresh each time.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut work: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retries = 0u32;

        loop {
            match work().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(operation = %operation, retries, "Storage operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient_timeout() => {
                    retries += 1;
                    if retries > self.max_retries {
                        error!(
                            operation = %operation,
                            attempts = retries,
                            "Storage operation timed out, giving up: {}",
                            err
                        );
                        let report = ErrorReport::new(operation, err.kind(), &err)
                            .with_attempts(retries)
                            .with_http_body(err.http_body().map(str::to_string));
                        self.reporter.notify(report).await;
                        return Err(err);
                    }
                    warn!(operation = %operation, attempt = retries, "Error: {}, retrying", err);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Arc::new(TracingReporter))
    }
}
