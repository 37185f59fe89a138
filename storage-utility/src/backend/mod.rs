//! Object-storage backends
//!
//! `ObjectBackend` is the contract the storage client needs from a store:
//! existence checks, whole and chunked reads, writes, deletes, server-side
//! copies and signed read URLs.

pub mod memory;
pub mod s3;

pub use memory::InMemoryBackend;
pub use s3::S3Backend;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::StorageResult;

/// A named object inside a bucket. Resolving one never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Attributes applied when an object is written or copied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// Canned ACL such as "public-read"
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl WriteOptions {
    /// Whether a copy must replace the source's stored attributes.
    /// The ACL is not a stored attribute and is applied on its own.
    pub fn replaces_attributes(&self) -> bool {
        self.content_type.is_some() || self.cache_control.is_some() || !self.metadata.is_empty()
    }
}

/// Content to upload. A file body is opened by the backend on each attempt
/// and streamed, so it is never held in memory as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl ObjectBody {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ObjectBody::File(path.into())
    }
}

impl From<Bytes> for ObjectBody {
    fn from(bytes: Bytes) -> Self {
        ObjectBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ObjectBody {
    fn from(bytes: Vec<u8>) -> Self {
        ObjectBody::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for ObjectBody {
    fn from(text: String) -> Self {
        ObjectBody::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for ObjectBody {
    fn from(text: &'static str) -> Self {
        ObjectBody::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for ObjectBody {
    fn from(bytes: &'static [u8]) -> Self {
        ObjectBody::Bytes(Bytes::from_static(bytes))
    }
}

/// Object body delivered in chunks as they arrive
pub type ChunkStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn exists(&self, object: &ObjectRef) -> StorageResult<bool>;

    async fn read(&self, object: &ObjectRef) -> StorageResult<Bytes>;

    async fn read_chunks(&self, object: &ObjectRef) -> StorageResult<ChunkStream>;

    async fn write(&self, object: &ObjectRef, body: ObjectBody, options: &WriteOptions) -> StorageResult<()>;

    async fn delete(&self, object: &ObjectRef) -> StorageResult<()>;

    /// Server-side copy. The source's attributes are kept unless `options`
    /// replace them; an ACL is applied either way.
    async fn copy(&self, source: &ObjectRef, target: &ObjectRef, options: &WriteOptions) -> StorageResult<()>;

    /// Signed GET URL valid until `expires_at`
    fn signed_url(&self, object: &ObjectRef, expires_at: DateTime<Utc>, secure: bool) -> StorageResult<String>;
}
