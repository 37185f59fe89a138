use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::config::{Credentials, Region};
use aws_sdk_cloudfront::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{CdnBackend, Invalidation};
use crate::config::CdnConfig;
use crate::error::{CdnError, CdnResult};

/// CloudFront is a global service addressed through us-east-1
const CLOUDFRONT_REGION: &str = "us-east-1";

pub struct CloudFrontBackend {
    client: Client,
}

impl CloudFrontBackend {
    pub async fn connect(config: &CdnConfig) -> CdnResult<Self> {
        config
            .validate()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "storage-utility",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(CLOUDFRONT_REGION))
            .credentials_provider(credentials)
            .load()
            .await;

        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }
}

fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> CdnError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::ServiceError(context) => CdnError::Service {
            code: context.err().code().map(str::to_string),
            message: context
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        },
        _ => CdnError::Transport(format!("{}: {}", operation, DisplayErrorContext(&err))),
    }
}

/// The API counts paths as a 32-bit integer
fn batch_quantity(len: usize) -> CdnResult<i32> {
    i32::try_from(len).map_err(|_| CdnError::InvalidRequest(format!("too many paths: {}", len)))
}

fn convert_invalidation(invalidation: &aws_sdk_cloudfront::types::Invalidation) -> Invalidation {
    let batch = invalidation.invalidation_batch();
    Invalidation {
        id: invalidation.id().to_string(),
        status: invalidation.status().to_string(),
        create_time: DateTime::<Utc>::from_timestamp(invalidation.create_time().secs(), 0),
        paths: batch
            .and_then(|b| b.paths())
            .map(|paths| paths.items().to_vec())
            .unwrap_or_default(),
        caller_reference: batch.map(|b| b.caller_reference().to_string()),
    }
}

#[async_trait]
impl CdnBackend for CloudFrontBackend {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> CdnResult<Invalidation> {
        let paths = Paths::builder()
            .quantity(batch_quantity(paths.len())?)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(caller_reference)
            .build()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|err| map_sdk_error("create_invalidation", err))?;

        debug!(location = output.location().unwrap_or(""), "Invalidation created");
        output
            .invalidation()
            .map(convert_invalidation)
            .ok_or_else(|| CdnError::MissingInvalidation(distribution_id.to_string()))
    }

    async fn get_invalidation(&self, distribution_id: &str, id: &str) -> CdnResult<Invalidation> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(distribution_id)
            .id(id)
            .send()
            .await
            .map_err(|err| map_sdk_error("get_invalidation", err))?;

        output
            .invalidation()
            .map(convert_invalidation)
            .ok_or_else(|| CdnError::MissingInvalidation(distribution_id.to_string()))
    }
}
