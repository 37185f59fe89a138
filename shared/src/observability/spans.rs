//! Spans and timing helpers for storage and CDN calls

use std::time::Instant;
use tracing::{info, warn, Span};
use uuid::Uuid;

/// Per-call context logged when a storage operation finishes
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation_id: String,
    pub operation: String,
    pub target: String,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn new(operation: &str, target: &str) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            target: target.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn log_completion(&self, succeeded: bool) {
        let elapsed = self.elapsed_ms();

        if succeeded {
            info!(
                operation_id = %self.operation_id,
                operation = %self.operation,
                target = %self.target,
                duration_ms = elapsed,
                "Storage operation completed"
            );
        } else {
            warn!(
                operation_id = %self.operation_id,
                operation = %self.operation,
                target = %self.target,
                duration_ms = elapsed,
                "Storage operation failed"
            );
        }
    }
}

/// Span for an object-storage call
pub fn storage_span(operation: &str, bucket: &str, key: &str) -> Span {
    tracing::info_span!(
        "object_storage",
        operation = %operation,
        bucket = %bucket,
        key = %key
    )
}

/// Span for a CDN invalidation call
pub fn cdn_span(operation: &str, distribution_id: &str) -> Span {
    tracing::info_span!(
        "cdn",
        operation = %operation,
        distribution_id = %distribution_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_context() {
        let ctx = OperationContext::new("store", "uploads/a.png");
        assert!(!ctx.operation_id.is_empty());
        assert_eq!(ctx.operation, "store");
        assert_eq!(ctx.target, "uploads/a.png");
        assert_ne!(ctx.operation_id, OperationContext::new("store", "uploads/a.png").operation_id);
    }

    #[test]
    fn test_elapsed_time() {
        let ctx = OperationContext::new("download", "big.bin");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(ctx.elapsed_ms() >= 10);
    }
}
