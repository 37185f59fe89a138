//! S3-compatible object storage backend
//!
//! Works against AWS S3 or compatible services (MinIO, R2, ...). SDK-level
//! retries and stalled-stream protection are disabled so the storage client's
//! retry policy is the only one in play. The per-attempt timeout and a body
//! read that stalls past the same limit both surface as `StorageError::Timeout`.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region, StalledStreamProtectionConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{MetadataDirective, ObjectCannedAcl};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{ChunkStream, ObjectBackend, ObjectBody, ObjectRef, WriteOptions};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult, REQUEST_TIMEOUT_CODE};
use crate::presign::{encode_key, UrlSigner};

pub struct S3Backend {
    client: Client,
    signer: UrlSigner,
    /// Longest wait for the next body chunk
    read_timeout: Duration,
}

impl S3Backend {
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        config.ensure_valid()?;
        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "Initializing S3 backend"
        );

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None, // session token
            None, // expiration
            "storage-utility",
        );

        let request_timeout = Duration::from_secs(config.request_timeout_seconds);
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(request_timeout)
                    .read_timeout(request_timeout)
                    .build(),
            )
            .load()
            .await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(s3_config.build()),
            signer: UrlSigner::from_config(config),
            read_timeout: request_timeout,
        })
    }
}

/// Translate an SDK failure into the storage taxonomy. Transport timeouts
/// and the service's `RequestTimeout` code both become `Timeout`.
fn map_sdk_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => StorageError::timeout(format!("{} timed out", operation)),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            StorageError::timeout(format!("{} timed out while connecting", operation))
        }
        SdkError::ServiceError(context) => {
            let http_body = context
                .raw()
                .body()
                .bytes()
                .map(|body| String::from_utf8_lossy(body).into_owned());
            let code = context.err().code().map(str::to_string);
            let message = context
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

            if code.as_deref() == Some(REQUEST_TIMEOUT_CODE) {
                StorageError::Timeout { message, http_body }
            } else {
                StorageError::Service { code, message, http_body }
            }
        }
        _ => StorageError::Transport(format!("{}: {}", operation, DisplayErrorContext(&err))),
    }
}

/// A body stream error is a timeout when any error in its source chain is an
/// io `TimedOut`; anything else is a failed transfer.
fn map_stream_error<E>(err: E) -> StorageError
where
    E: std::error::Error + 'static,
{
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(source) = current {
        if let Some(io) = source.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return StorageError::timeout(format!("body read timed out: {}", err));
            }
        }
        current = source.source();
    }
    StorageError::Transfer(DisplayErrorContext(&err).to_string())
}

/// Next body chunk, or a timeout when none arrives within `read_timeout`
async fn next_chunk(body: &mut ByteStream, read_timeout: Duration, object: &str) -> Option<StorageResult<Bytes>> {
    match tokio::time::timeout(read_timeout, body.next()).await {
        Ok(chunk) => chunk.map(|chunk| chunk.map_err(map_stream_error)),
        Err(_) => Some(Err(StorageError::timeout(format!(
            "no body data from {} for {}s",
            object,
            read_timeout.as_secs()
        )))),
    }
}

impl S3Backend {
    async fn get_body(&self, object: &ObjectRef) -> StorageResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().map(|e| e.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound(object.to_string())
                } else {
                    map_sdk_error("get_object", err)
                }
            })?;
        Ok(output.body)
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn exists(&self, object: &ObjectRef) -> StorageResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => Ok(false),
            Err(err) => Err(map_sdk_error("head_object", err)),
        }
    }

    async fn read(&self, object: &ObjectRef) -> StorageResult<Bytes> {
        let mut body = self.get_body(object).await?;
        let label = object.to_string();
        let mut data = BytesMut::new();
        while let Some(chunk) = next_chunk(&mut body, self.read_timeout, &label).await {
            data.extend_from_slice(&chunk?);
        }

        debug!(object = %object, size = data.len(), "Object read");
        Ok(data.freeze())
    }

    async fn read_chunks(&self, object: &ObjectRef) -> StorageResult<ChunkStream> {
        let body = self.get_body(object).await?;
        let read_timeout = self.read_timeout;
        let label = object.to_string();

        // the stream ends after the first error
        let chunks = futures::stream::unfold(Some(body), move |body| {
            let label = label.clone();
            async move {
                let Some(mut body) = body else {
                    return None;
                };
                match next_chunk(&mut body, read_timeout, &label).await {
                    Some(Ok(chunk)) => Some((Ok(chunk), Some(body))),
                    Some(Err(err)) => Some((Err(err), None)),
                    None => None,
                }
            }
        });
        Ok(Box::pin(chunks))
    }

    async fn write(&self, object: &ObjectRef, body: ObjectBody, options: &WriteOptions) -> StorageResult<()> {
        let (body, size) = match body {
            ObjectBody::Bytes(bytes) => {
                let size = bytes.len() as u64;
                (ByteStream::from(bytes), size)
            }
            ObjectBody::File(path) => {
                let size = tokio::fs::metadata(&path).await?.len();
                let stream = ByteStream::from_path(&path).await.map_err(map_stream_error)?;
                (stream, size)
            }
        };
        let mut request = self
            .client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(body)
            .set_content_type(options.content_type.clone())
            .set_cache_control(options.cache_control.clone());

        if let Some(acl) = &options.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if !options.metadata.is_empty() {
            request = request.set_metadata(Some(options.metadata.clone()));
        }

        request.send().await.map_err(|err| map_sdk_error("put_object", err))?;
        debug!(object = %object, size, "Object written");
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|err| map_sdk_error("delete_object", err))?;
        Ok(())
    }

    async fn copy(&self, source: &ObjectRef, target: &ObjectRef, options: &WriteOptions) -> StorageResult<()> {
        let copy_source = format!("{}/{}", source.bucket, encode_key(&source.key));
        let mut request = self
            .client
            .copy_object()
            .copy_source(copy_source)
            .bucket(&target.bucket)
            .key(&target.key);

        if options.replaces_attributes() {
            request = request
                .metadata_directive(MetadataDirective::Replace)
                .set_content_type(options.content_type.clone())
                .set_cache_control(options.cache_control.clone());
            if !options.metadata.is_empty() {
                request = request.set_metadata(Some(options.metadata.clone()));
            }
        }
        if let Some(acl) = &options.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        request.send().await.map_err(|err| map_sdk_error("copy_object", err))?;
        debug!(source = %source, target = %target, "Object copied");
        Ok(())
    }

    fn signed_url(&self, object: &ObjectRef, expires_at: DateTime<Utc>, secure: bool) -> StorageResult<String> {
        self.signer.signed_url(&object.bucket, &object.key, expires_at, secure)
    }
}
