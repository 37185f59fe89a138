use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ErrorReport, ErrorReporter};

type HmacSha256 = Hmac<Sha256>;

/// Posts error reports as JSON to an HTTP endpoint
pub struct WebhookReporter {
    http_client: Client,
    url: String,
    signing_secret: Option<String>,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>, signing_secret: Option<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("storage-utility-reporter/1.0")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            url: url.into(),
            signing_secret,
        }
    }

    /// HMAC-SHA256 of the payload, hex encoded
    fn generate_signature(&self, payload: &str) -> Option<String> {
        let secret = self.signing_secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    async fn deliver(&self, report: &ErrorReport) -> Result<(), String> {
        let payload = serde_json::to_string(report)
            .map_err(|e| format!("failed to serialize report: {}", e))?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Report-Id", report.id.to_string());

        if let Some(signature) = self.generate_signature(&payload) {
            request = request.header("X-Report-Signature", signature);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| format!("webhook request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("webhook returned {}: {}", status, body))
        }
    }
}

#[async_trait]
impl ErrorReporter for WebhookReporter {
    async fn notify(&self, report: ErrorReport) {
        match self.deliver(&report).await {
            Ok(()) => debug!(report_id = %report.id, url = %self.url, "Error report delivered"),
            Err(e) => warn!(report_id = %report.id, url = %self.url, "Error report not delivered: {}", e),
        }
    }
}
