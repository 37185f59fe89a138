//! Shared utilities for the storage utility workspace

// Re-export common dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use uuid;

pub mod observability;
pub mod reporting;

pub use reporting::{ErrorReport, ErrorReporter, TracingReporter, WebhookReporter};
