//! Object storage and CDN invalidation façade.
//!
//! Wraps an S3-compatible store and CloudFront behind small traits, adds a
//! bounded retry for transient timeouts, long-lived signed read URLs and a
//! fixed content-type table.

pub mod backend;
pub mod cdn;
pub mod config;
pub mod content_type;
pub mod error;
pub mod expiration;
pub mod presign;
pub mod retry;
pub mod storage;

pub use backend::{InMemoryBackend, ObjectBackend, ObjectBody, ObjectRef, S3Backend, WriteOptions};
pub use cdn::{CdnBackend, CdnClient, CloudFrontBackend, Invalidation};
pub use config::{CdnConfig, Config, ReportingConfig, StorageConfig};
pub use error::{CdnError, CdnResult, StorageError, StorageResult};
pub use expiration::{doomsday, doomsday_from, platform_ceiling};
pub use retry::Retrier;
pub use storage::{Attachment, StorageClient, StoreOptions};
