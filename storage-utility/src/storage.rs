//! Object operations: store, fetch URLs, copy, delete and download.
//!
//! Network calls go through the client's `Retrier`. Each attempt resolves
//! its object handle again inside the retried closure, so a retry never
//! reuses state from the attempt that timed out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use shared::observability::{storage_span, OperationContext};
use shared::reporting::ErrorReporter;
use tokio::io::AsyncWriteExt;
use tracing::{debug, Instrument};

use crate::backend::{ObjectBackend, ObjectBody, ObjectRef, S3Backend, WriteOptions};
use crate::config::StorageConfig;
use crate::content_type::{content_ext, content_type_for_name};
use crate::error::StorageResult;
use crate::expiration::doomsday;
use crate::retry::Retrier;

/// Chunks written between progress events in `download_large`
pub const PROGRESS_INTERVAL_CHUNKS: u64 = 1000;

/// Per-call options. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    pub content_type: Option<String>,
    /// Bucket to use instead of the configured one
    pub bucket: Option<String>,
    /// Signed URL scheme; HTTPS unless set to `false`
    pub secure: Option<bool>,
    pub cache_control: Option<String>,
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn in_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            content_type: self.content_type.clone(),
            cache_control: self.cache_control.clone(),
            acl: self.acl.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// An uploaded file waiting in a temp location
#[derive(Debug, Clone)]
pub struct Attachment {
    pub content_type: String,
    pub path: PathBuf,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            content_type: content_type.into(),
            path: path.into(),
        }
    }
}

pub struct StorageClient {
    backend: Arc<dyn ObjectBackend>,
    default_bucket: String,
    retrier: Retrier,
}

impl StorageClient {
    pub fn new(backend: Arc<dyn ObjectBackend>, default_bucket: impl Into<String>, retrier: Retrier) -> Self {
        Self {
            backend,
            default_bucket: default_bucket.into(),
            retrier,
        }
    }

    /// Client on the S3 backend, escalating exhausted retries to `reporter`
    pub async fn connect(config: &StorageConfig, reporter: Arc<dyn ErrorReporter>) -> StorageResult<Self> {
        let backend = S3Backend::connect(config).await?;
        Ok(Self::new(
            Arc::new(backend),
            config.bucket.clone(),
            Retrier::new(config.max_retries, reporter),
        ))
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Handle for `name` in the override bucket or the configured one.
    /// Existence is not checked.
    pub fn resolve_object(&self, name: &str, options: &StoreOptions) -> ObjectRef {
        let bucket = options.bucket.as_deref().unwrap_or(&self.default_bucket);
        ObjectRef::new(bucket, name)
    }

    fn signed_url(&self, object: &ObjectRef, options: &StoreOptions) -> StorageResult<String> {
        let secure = options.secure.unwrap_or(true);
        self.backend.signed_url(object, doomsday(), secure)
    }

    /// Write `content` to `name`. Without an explicit content type one is
    /// inferred from the name's extension; an unknown extension leaves it
    /// unset. Returns a signed read URL once the object exists, `None` if it
    /// does not.
    pub async fn store(
        &self,
        name: &str,
        content: impl Into<ObjectBody>,
        options: &StoreOptions,
    ) -> StorageResult<Option<String>> {
        let content: ObjectBody = content.into();
        let mut write_options = options.write_options();
        if write_options.content_type.is_none() {
            write_options.content_type = content_type_for_name(name).map(str::to_string);
        }

        let ctx = OperationContext::new("store", name);
        let content = &content;
        let write_options = &write_options;
        let result = self
            .retrier
            .run("store", || async move {
                let object = self.resolve_object(name, options);
                self.backend.write(&object, content.clone(), write_options).await?;
                if self.backend.exists(&object).await? {
                    self.signed_url(&object, options).map(Some)
                } else {
                    Ok(None)
                }
            })
            .instrument(storage_span("store", &self.resolve_object(name, options).bucket, name))
            .await;

        ctx.log_completion(result.is_ok());
        result
    }

    /// Store the contents of a local file. The content type is inferred from
    /// the local file's extension when not given. The file is streamed by the
    /// backend on each attempt rather than read into memory here.
    pub async fn store_file(
        &self,
        name: &str,
        local_path: impl AsRef<Path>,
        options: &StoreOptions,
    ) -> StorageResult<Option<String>> {
        let local_path = local_path.as_ref();
        let mut options = options.clone();
        if options.content_type.is_none() {
            options.content_type = content_type_for_name(&local_path.to_string_lossy()).map(str::to_string);
        }

        // a missing or unreadable file fails before any network call
        tokio::fs::File::open(local_path).await?;

        self.store(name, ObjectBody::from_path(local_path), &options).await
    }

    /// Store an attachment under `name` plus the extension of its content type
    pub async fn store_attachment(&self, name: &str, attachment: &Attachment) -> StorageResult<Option<String>> {
        let name = format!("{}{}", name, content_ext(&attachment.content_type));
        let options = StoreOptions::new().with_content_type(attachment.content_type.clone());
        self.store_file(&name, &attachment.path, &options).await
    }

    /// Signed read URL expiring at the platform's latest allowed instant, or
    /// `None` when the object does not exist
    pub async fn object_url(&self, name: &str, options: &StoreOptions) -> StorageResult<Option<String>> {
        let object = self.resolve_object(name, options);
        if !self.backend.exists(&object).await? {
            debug!(object = %object, "No object to sign");
            return Ok(None);
        }
        self.signed_url(&object, options).map(Some)
    }

    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        let options = StoreOptions::default();
        let options = &options;
        self.retrier
            .run("delete", || async move {
                let object = self.resolve_object(name, options);
                self.backend.delete(&object).await
            })
            .instrument(storage_span("delete", &self.default_bucket, name))
            .await
    }

    /// Server-side copy. A missing source is a no-op, not an error.
    pub async fn copy(
        &self,
        source: &str,
        source_options: &StoreOptions,
        target: &str,
        target_options: &StoreOptions,
    ) -> StorageResult<()> {
        let write_options = target_options.write_options();
        let write_options = &write_options;
        self.retrier
            .run("copy", || async move {
                let source_object = self.resolve_object(source, source_options);
                if !self.backend.exists(&source_object).await? {
                    debug!(source = %source_object, "Copy source missing, skipping");
                    return Ok(());
                }
                let target_object = self.resolve_object(target, target_options);
                self.backend.copy(&source_object, &target_object, write_options).await
            })
            .instrument(storage_span("copy", &self.resolve_object(source, source_options).bucket, source))
            .await
    }

    /// Read the whole object and write it to `local_path`, replacing any
    /// existing file
    pub async fn download(&self, name: &str, local_path: impl AsRef<Path>, options: &StoreOptions) -> StorageResult<()> {
        let local_path = local_path.as_ref();
        let ctx = OperationContext::new("download", name);
        let result = self
            .retrier
            .run("download", || async move {
                let object = self.resolve_object(name, options);
                let data = self.backend.read(&object).await?;
                tokio::fs::write(local_path, &data).await?;
                Ok(())
            })
            .instrument(storage_span("download", &self.resolve_object(name, options).bucket, name))
            .await;

        ctx.log_completion(result.is_ok());
        result
    }

    /// Stream the object to `local_path` chunk by chunk so memory stays
    /// bounded. Only the bucket override in `options` is used.
    pub async fn download_large(
        &self,
        name: &str,
        local_path: impl AsRef<Path>,
        options: &StoreOptions,
    ) -> StorageResult<()> {
        let local_path = local_path.as_ref();
        let options = StoreOptions {
            bucket: options.bucket.clone(),
            ..Default::default()
        };
        let options = &options;
        let ctx = OperationContext::new("download_large", name);
        let result = self
            .retrier
            .run("download_large", || async move {
                let object = self.resolve_object(name, options);
                let mut chunks = self.backend.read_chunks(&object).await?;
                let mut file = tokio::fs::File::create(local_path).await?;
                let mut count: u64 = 0;
                while let Some(chunk) = chunks.next().await {
                    file.write_all(&chunk?).await?;
                    count += 1;
                    if count % PROGRESS_INTERVAL_CHUNKS == 0 {
                        debug!(object = %object, chunks = count, "Download progress");
                    }
                }
                file.flush().await?;
                Ok(())
            })
            .instrument(storage_span("download_large", &self.resolve_object(name, options).bucket, name))
            .await;

        ctx.log_completion(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, MockObjectBackend};
    use crate::error::StorageError;
    use bytes::Bytes;
    use mockall::predicate::always;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts events that carry a `chunks` field
    struct ProgressCounter(Arc<AtomicUsize>);

    struct HasChunks(bool);

    impl Visit for HasChunks {
        fn record_u64(&mut self, field: &Field, _value: u64) {
            if field.name() == "chunks" {
                self.0 = true;
            }
        }

        fn record_debug(&mut self, field: &Field, _value: &dyn std::fmt::Debug) {
            if field.name() == "chunks" {
                self.0 = true;
            }
        }
    }

    impl<S: Subscriber> Layer<S> for ProgressCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = HasChunks(false);
            event.record(&mut visitor);
            if visitor.0 {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn client_with(mock: MockObjectBackend) -> StorageClient {
        StorageClient::new(Arc::new(mock), "media", Retrier::default())
    }

    #[test]
    fn test_resolve_object_uses_override_bucket() {
        let client = client_with(MockObjectBackend::new());
        assert_eq!(
            client.resolve_object("a.png", &StoreOptions::default()),
            ObjectRef::new("media", "a.png")
        );
        assert_eq!(
            client.resolve_object("a.png", &StoreOptions::new().in_bucket("archive")),
            ObjectRef::new("archive", "a.png")
        );
    }

    #[tokio::test]
    async fn test_copy_skips_missing_source() {
        let mut mock = MockObjectBackend::new();
        mock.expect_exists()
            .withf(|object| object == &ObjectRef::new("media", "missing.png"))
            .times(1)
            .returning(|_| Ok(false));
        mock.expect_copy().never();

        let client = client_with(mock);
        tokio_test::assert_ok!(
            client
                .copy("missing.png", &StoreOptions::default(), "copy.png", &StoreOptions::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_copy_targets_override_bucket() {
        let mut mock = MockObjectBackend::new();
        mock.expect_exists().times(1).returning(|_| Ok(true));
        mock.expect_copy()
            .withf(|source, target, options| {
                source == &ObjectRef::new("media", "a.png")
                    && target == &ObjectRef::new("archive", "b.png")
                    && options.content_type.as_deref() == Some("image/png")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let client = client_with(mock);
        let target_options = StoreOptions::new().in_bucket("archive").with_content_type("image/png");
        client
            .copy("a.png", &StoreOptions::default(), "b.png", &target_options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_infers_content_type_and_signs_url() {
        let mut mock = MockObjectBackend::new();
        mock.expect_write()
            .withf(|object, content, options| {
                object.key == "docs/report.pdf"
                    && *content == ObjectBody::Bytes(Bytes::from_static(b"%PDF"))
                    && options.content_type.as_deref() == Some("application/pdf")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_exists().times(1).returning(|_| Ok(true));
        mock.expect_signed_url()
            .with(always(), always(), mockall::predicate::eq(true))
            .times(1)
            .returning(|object, _, _| Ok(format!("https://signed/{}", object.key)));

        let client = client_with(mock);
        let url = client
            .store("docs/report.pdf", &b"%PDF"[..], &StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://signed/docs/report.pdf"));
    }

    #[tokio::test]
    async fn test_store_returns_none_when_object_missing_after_write() {
        let mut mock = MockObjectBackend::new();
        mock.expect_write()
            .withf(|_, _, options| options.content_type.is_none())
            .returning(|_, _, _| Ok(()));
        mock.expect_exists().returning(|_| Ok(false));
        mock.expect_signed_url().never();

        let client = client_with(mock);
        let url = client
            .store("notes.unknown", Bytes::from_static(b"x"), &StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(url, None);
    }

    #[tokio::test]
    async fn test_store_retries_write_timeouts() {
        let mut mock = MockObjectBackend::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_write()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StorageError::timeout("slow")));
        mock.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_exists().times(1).returning(|_| Ok(true));
        mock.expect_signed_url()
            .returning(|_, _, _| Ok("https://signed".to_string()));

        let client = client_with(mock);
        let url = client.store("a.txt", "hello", &StoreOptions::default()).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://signed"));
    }

    #[tokio::test]
    async fn test_object_url_honours_insecure_flag() {
        let mut mock = MockObjectBackend::new();
        mock.expect_exists().returning(|_| Ok(true));
        mock.expect_signed_url()
            .withf(|_, expires_at, secure| *expires_at == crate::expiration::doomsday() && !*secure)
            .times(1)
            .returning(|_, _, _| Ok("http://signed".to_string()));

        let client = client_with(mock);
        let url = client
            .object_url("a.txt", &StoreOptions::new().secure(false))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("http://signed"));
    }

    #[tokio::test]
    async fn test_delete_propagates_service_errors() {
        let mut mock = MockObjectBackend::new();
        mock.expect_delete().times(1).returning(|_| {
            Err(StorageError::Service {
                code: Some("AccessDenied".to_string()),
                message: "denied".to_string(),
                http_body: None,
            })
        });

        let client = client_with(mock);
        let err = client.delete("a.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::Service { .. }));
    }

    #[tokio::test]
    async fn test_store_file_hands_backend_a_file_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let mut mock = MockObjectBackend::new();
        let expected = ObjectBody::from_path(&path);
        mock.expect_write()
            .withf(move |object, content, options| {
                object.key == "docs/scan"
                    && *content == expected
                    && options.content_type.as_deref() == Some("application/pdf")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_exists().returning(|_| Ok(true));
        mock.expect_signed_url()
            .returning(|_, _, _| Ok("https://signed".to_string()));

        let client = client_with(mock);
        tokio_test::assert_ok!(client.store_file("docs/scan", &path, &StoreOptions::default()).await);
    }

    #[tokio::test]
    async fn test_download_large_reports_progress_every_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ProgressCounter(count.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let backend = Arc::new(InMemoryBackend::default().with_chunk_size(1));
        let client = StorageClient::new(backend, "media", Retrier::default());
        let body = vec![7u8; 2 * PROGRESS_INTERVAL_CHUNKS as usize + 500];
        client.store("big.bin", body.clone(), &StoreOptions::default()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.bin");
        client
            .download_large("big.bin", &target, &StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), body);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
