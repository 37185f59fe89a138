//! CDN cache invalidation
//!
//! `CdnBackend` is the collaborator contract; `CdnClient` adds the caller
//! reference and the status helpers on top of it.

pub mod cloudfront;

pub use cloudfront::CloudFrontBackend;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shared::observability::cdn_span;
use tracing::{info, Instrument};

use crate::config::CdnConfig;
use crate::error::{CdnError, CdnResult};

pub const CALLER_REFERENCE_PREFIX: &str = "INVALIDATE_CF_";

/// A cache invalidation as reported by the CDN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invalidation {
    pub id: String,
    /// e.g. "InProgress" or "Completed"
    pub status: String,
    pub create_time: Option<DateTime<Utc>>,
    pub paths: Vec<String>,
    pub caller_reference: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CdnBackend: Send + Sync {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> CdnResult<Invalidation>;

    async fn get_invalidation(&self, distribution_id: &str, id: &str) -> CdnResult<Invalidation>;
}

pub struct CdnClient {
    backend: Arc<dyn CdnBackend>,
}

impl CdnClient {
    pub fn new(backend: Arc<dyn CdnBackend>) -> Self {
        Self { backend }
    }

    pub async fn connect(config: &CdnConfig) -> CdnResult<Self> {
        let backend = CloudFrontBackend::connect(config).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// Reference unique per call; the CDN uses it to deduplicate submissions
    pub fn caller_reference(now: DateTime<Utc>) -> String {
        format!(
            "{}{}",
            CALLER_REFERENCE_PREFIX,
            now.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }

    pub async fn create_invalidations(&self, files: &[String], distribution_id: &str) -> CdnResult<Invalidation> {
        if files.is_empty() {
            return Err(CdnError::InvalidRequest("no paths to invalidate".to_string()));
        }

        let caller_reference = Self::caller_reference(Utc::now());
        let invalidation = self
            .backend
            .create_invalidation(distribution_id, files, &caller_reference)
            .instrument(cdn_span("create_invalidation", distribution_id))
            .await?;

        info!(
            distribution_id = %distribution_id,
            invalidation_id = %invalidation.id,
            paths = files.len(),
            "Invalidation submitted"
        );
        Ok(invalidation)
    }

    /// Current state of a previously created invalidation
    pub async fn get_invalidation_update(
        &self,
        invalidation: &Invalidation,
        distribution_id: &str,
    ) -> CdnResult<Invalidation> {
        self.backend
            .get_invalidation(distribution_id, &invalidation.id)
            .instrument(cdn_span("get_invalidation", distribution_id))
            .await
    }

    pub async fn get_invalidation_status(
        &self,
        invalidation: &Invalidation,
        distribution_id: &str,
    ) -> CdnResult<String> {
        Ok(self.get_invalidation_update(invalidation, distribution_id).await?.status)
    }
}
