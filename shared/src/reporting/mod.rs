//! Out-of-band error reporting
//!
//! Reporters are fire-and-forget: `notify` never fails, and a reporter that
//! cannot deliver logs the problem and moves on so the caller's original
//! error is what propagates.

pub mod webhook;

pub use webhook::WebhookReporter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// An error escalated after local recovery gave up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub operation: String,
    pub error: String,
    pub kind: String,
    pub attempts: u32,
    /// Raw service response body, when there was one
    pub http_body: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(operation: &str, kind: &str, error: impl std::fmt::Display) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            error: error.to_string(),
            kind: kind.to_string(),
            attempts: 1,
            http_body: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_http_body(mut self, http_body: Option<String>) -> Self {
        self.http_body = http_body;
        self
    }
}

#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn notify(&self, report: ErrorReport);
}

/// Writes reports to the `error` log level
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    async fn notify(&self, report: ErrorReport) {
        error!(
            report_id = %report.id,
            operation = %report.operation,
            kind = %report.kind,
            attempts = report.attempts,
            http_body = report.http_body.as_deref().unwrap_or(""),
            "{}",
            report.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_builder() {
        let report = ErrorReport::new("store", "timeout", "Request timeout: slow")
            .with_attempts(4)
            .with_http_body(Some("<Error/>".to_string()));

        assert_eq!(report.operation, "store");
        assert_eq!(report.kind, "timeout");
        assert_eq!(report.error, "Request timeout: slow");
        assert_eq!(report.attempts, 4);
        assert_eq!(report.http_body.as_deref(), Some("<Error/>"));
    }

    #[test]
    fn test_report_serializes_http_body() {
        let report = ErrorReport::new("delete", "timeout", "slow")
            .with_http_body(Some("body".to_string()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["http_body"], "body");
        assert_eq!(json["operation"], "delete");
    }

    #[tokio::test]
    async fn test_tracing_reporter_does_not_fail() {
        TracingReporter.notify(ErrorReport::new("copy", "timeout", "slow")).await;
    }
}
