use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChunkStream, ObjectBackend, ObjectBody, ObjectRef, WriteOptions};
use crate::error::{StorageError, StorageResult};
use crate::presign::UrlSigner;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Bytes,
    pub options: WriteOptions,
    pub last_modified: DateTime<Utc>,
}

/// Process-local object store for offline use and tests.
///
/// Timeouts can be injected: each network-style call consumes one pending
/// timeout and fails with `StorageError::Timeout` until none are left.
pub struct InMemoryBackend {
    objects: RwLock<HashMap<ObjectRef, StoredObject>>,
    signer: UrlSigner,
    chunk_size: usize,
    pending_timeouts: AtomicU32,
}

impl InMemoryBackend {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pending_timeouts: AtomicU32::new(0),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail the next `count` calls with a transient timeout
    pub fn inject_timeouts(&self, count: u32) {
        self.pending_timeouts.store(count, Ordering::SeqCst);
    }

    pub fn pending_timeouts(&self) -> u32 {
        self.pending_timeouts.load(Ordering::SeqCst)
    }

    pub async fn object(&self, object: &ObjectRef) -> Option<StoredObject> {
        self.objects.read().await.get(object).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn check_injected_timeout(&self, operation: &str) -> StorageResult<()> {
        let consumed = self
            .pending_timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            debug!(operation = %operation, "Injected timeout");
            return Err(StorageError::Timeout {
                message: format!("{} timed out", operation),
                http_body: Some("<Error><Code>RequestTimeout</Code></Error>".to_string()),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(UrlSigner::new("memory", "memory", "localhost", true))
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn exists(&self, object: &ObjectRef) -> StorageResult<bool> {
        self.check_injected_timeout("exists")?;
        Ok(self.objects.read().await.contains_key(object))
    }

    async fn read(&self, object: &ObjectRef) -> StorageResult<Bytes> {
        self.check_injected_timeout("read")?;
        self.objects
            .read()
            .await
            .get(object)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn read_chunks(&self, object: &ObjectRef) -> StorageResult<ChunkStream> {
        let data = self.read(object).await?;
        let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| Ok(data.slice(start..(start + self.chunk_size).min(data.len()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn write(&self, object: &ObjectRef, body: ObjectBody, options: &WriteOptions) -> StorageResult<()> {
        self.check_injected_timeout("write")?;
        let data = match body {
            ObjectBody::Bytes(bytes) => bytes,
            ObjectBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };
        self.objects.write().await.insert(
            object.clone(),
            StoredObject {
                data,
                options: options.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> StorageResult<()> {
        self.check_injected_timeout("delete")?;
        self.objects.write().await.remove(object);
        Ok(())
    }

    async fn copy(&self, source: &ObjectRef, target: &ObjectRef, options: &WriteOptions) -> StorageResult<()> {
        self.check_injected_timeout("copy")?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;

        let mut attributes = if options.replaces_attributes() {
            options.clone()
        } else {
            stored.options
        };
        if options.acl.is_some() {
            attributes.acl = options.acl.clone();
        }
        objects.insert(
            target.clone(),
            StoredObject {
                data: stored.data,
                options: attributes,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn signed_url(&self, object: &ObjectRef, expires_at: DateTime<Utc>, secure: bool) -> StorageResult<String> {
        self.signer.signed_url(&object.bucket, &object.key, expires_at, secure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_write_read_delete() {
        let backend = InMemoryBackend::default();
        let object = ObjectRef::new("media", "a.txt");

        assert!(!backend.exists(&object).await.unwrap());
        backend
            .write(&object, Bytes::from_static(b"hello").into(), &WriteOptions::default())
            .await
            .unwrap();
        assert!(backend.exists(&object).await.unwrap());
        assert_eq!(backend.read(&object).await.unwrap(), Bytes::from_static(b"hello"));

        backend.delete(&object).await.unwrap();
        assert!(backend.is_empty().await);
        assert!(matches!(backend.read(&object).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chunked_read() {
        let backend = InMemoryBackend::default().with_chunk_size(4);
        let object = ObjectRef::new("media", "big.bin");
        backend
            .write(&object, Bytes::from_static(b"0123456789").into(), &WriteOptions::default())
            .await
            .unwrap();

        let chunks: Vec<Bytes> = backend
            .read_chunks(&object)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![
            Bytes::from_static(b"0123"),
            Bytes::from_static(b"4567"),
            Bytes::from_static(b"89"),
        ]);
    }

    #[tokio::test]
    async fn test_copy_keeps_source_attributes_unless_replaced() {
        let backend = InMemoryBackend::default();
        let source = ObjectRef::new("media", "a.png");
        let options = WriteOptions {
            content_type: Some("image/png".to_string()),
            ..Default::default()
        };
        backend.write(&source, Bytes::from_static(b"png").into(), &options).await.unwrap();

        let kept = ObjectRef::new("archive", "a.png");
        backend.copy(&source, &kept, &WriteOptions::default()).await.unwrap();
        assert_eq!(backend.object(&kept).await.unwrap().options, options);

        let replaced = ObjectRef::new("archive", "a.bin");
        let new_options = WriteOptions {
            content_type: Some("application/octet-stream".to_string()),
            ..Default::default()
        };
        backend.copy(&source, &replaced, &new_options).await.unwrap();
        assert_eq!(backend.object(&replaced).await.unwrap().options, new_options);
    }

    #[tokio::test]
    async fn test_acl_only_copy_keeps_content_type() {
        let backend = InMemoryBackend::default();
        let source = ObjectRef::new("media", "a.png");
        let options = WriteOptions {
            content_type: Some("image/png".to_string()),
            cache_control: Some("max-age=60".to_string()),
            ..Default::default()
        };
        backend.write(&source, Bytes::from_static(b"png").into(), &options).await.unwrap();

        let target = ObjectRef::new("media", "b.png");
        let acl_only = WriteOptions {
            acl: Some("public-read".to_string()),
            ..Default::default()
        };
        backend.copy(&source, &target, &acl_only).await.unwrap();

        let copied = backend.object(&target).await.unwrap().options;
        assert_eq!(copied.content_type.as_deref(), Some("image/png"));
        assert_eq!(copied.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(copied.acl.as_deref(), Some("public-read"));
    }

    #[tokio::test]
    async fn test_file_body_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"from disk").unwrap();

        let backend = InMemoryBackend::default();
        let object = ObjectRef::new("media", "upload.bin");
        backend
            .write(&object, ObjectBody::from_path(&path), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(backend.read(&object).await.unwrap(), Bytes::from_static(b"from disk"));

        let missing = ObjectBody::from_path(dir.path().join("absent.bin"));
        assert!(matches!(
            backend.write(&object, missing, &WriteOptions::default()).await,
            Err(StorageError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_timeouts_are_consumed() {
        let backend = InMemoryBackend::default();
        let object = ObjectRef::new("media", "a.txt");
        backend.inject_timeouts(2);

        assert!(backend.exists(&object).await.unwrap_err().is_transient_timeout());
        assert!(backend.exists(&object).await.unwrap_err().is_transient_timeout());
        assert_eq!(backend.pending_timeouts(), 0);
        assert!(!backend.exists(&object).await.unwrap());
    }
}
