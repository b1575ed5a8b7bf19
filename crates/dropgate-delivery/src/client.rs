//! Signed, retried batch delivery to the downstream processing API.
//!
//! # Design
//! - The body, timestamp, and signature are computed once per batch and
//!   replayed verbatim on every retry.
//! - Any transport failure or non-2xx status is retried after a fixed delay.
//! - `send` converts every failure into `false`; `deliver` exposes the cause.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dropgate_config::{DeliveryPolicy, PipelineConfig, TenantConfig};
use dropgate_sftp::FileRecord;
use dropgate_telemetry::Metrics;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::{debug, error, info, warn};

use crate::envelope::{DeliveryEnvelope, SignedPayload};
use crate::error::{DeliveryError, DeliveryResult};

/// Header carrying the signed Unix timestamp.
pub const HEADER_TIMESTAMP: &str = "x-hmac-timestamp";
/// Header carrying the hex HMAC-SHA256 signature.
pub const HEADER_SIGNATURE: &str = "x-hmac-signature";
/// Header carrying the tenant identifier.
pub const HEADER_PROJECT_ID: &str = "x-project-id";

/// Outcome of an acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Success status returned by the downstream service.
    pub status: u16,
}

/// HTTP client that signs and posts batches.
#[derive(Clone)]
pub struct DeliveryClient {
    http: Client,
    endpoint: Url,
    profile_code: String,
    policy: DeliveryPolicy,
    metrics: Metrics,
}

impl DeliveryClient {
    /// Build a client for the endpoint and retry policy in `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Config`] when the API URL is unusable and
    /// [`DeliveryError::Client`] when the HTTP client cannot be built.
    pub fn new(pipeline: &PipelineConfig, metrics: Metrics) -> DeliveryResult<Self> {
        let endpoint = Url::parse(pipeline.api_url.trim()).map_err(|_| DeliveryError::Config {
            field: "api_url",
            reason: "not a valid URL",
        })?;
        let http = Client::builder()
            .connect_timeout(pipeline.delivery.connect_timeout)
            .timeout(pipeline.delivery.request_timeout)
            .build()
            .map_err(|source| DeliveryError::Client { source })?;
        Ok(Self {
            http,
            endpoint,
            profile_code: pipeline.profile_code.clone(),
            policy: pipeline.delivery,
            metrics,
        })
    }

    /// Deliver `batch`, returning whether the downstream service acknowledged it.
    pub async fn send(
        &self,
        tenant: &TenantConfig,
        batch: &[FileRecord],
        uploaded_by: &str,
        source: &str,
    ) -> bool {
        match self.deliver(tenant, batch, uploaded_by, source).await {
            Ok(receipt) => {
                info!(
                    tenant_id = %tenant.tenant_id,
                    batch_size = batch.len(),
                    attempts = receipt.attempts,
                    status = receipt.status,
                    "batch delivered"
                );
                true
            }
            Err(err) => {
                error!(
                    tenant_id = %tenant.tenant_id,
                    batch_size = batch.len(),
                    error = %err,
                    "batch delivery failed"
                );
                false
            }
        }
    }

    /// Deliver `batch`, retrying per the configured policy.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Config`] when the tenant has no signing secret,
    /// [`DeliveryError::EmptyBatch`] for an empty batch, and
    /// [`DeliveryError::Exhausted`] once every attempt has failed.
    pub async fn deliver(
        &self,
        tenant: &TenantConfig,
        batch: &[FileRecord],
        uploaded_by: &str,
        source: &str,
    ) -> DeliveryResult<DeliveryReceipt> {
        let payload = self.prepare(tenant, batch, uploaded_by, source)?;
        self.deliver_prepared(tenant, &payload, batch.len()).await
    }

    /// Post an already signed payload, replaying it unchanged on every retry.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Exhausted`] once every attempt has failed.
    pub async fn deliver_prepared(
        &self,
        tenant: &TenantConfig,
        payload: &SignedPayload,
        batch_size: usize,
    ) -> DeliveryResult<DeliveryReceipt> {
        let max_attempts = self.policy.max_attempts.max(1);

        let outcome = retry(max_attempts, self.policy.retry_delay, |attempt| {
            self.attempt(tenant, payload, attempt, max_attempts, batch_size)
        })
        .await;

        match outcome {
            Ok((attempts, status)) => Ok(DeliveryReceipt { attempts, status }),
            Err((attempts, last)) => Err(DeliveryError::Exhausted {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Build and sign the payload for `batch` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Config`] when the tenant has no signing secret
    /// and [`DeliveryError::EmptyBatch`] for an empty batch.
    pub fn prepare(
        &self,
        tenant: &TenantConfig,
        batch: &[FileRecord],
        uploaded_by: &str,
        source: &str,
    ) -> DeliveryResult<SignedPayload> {
        if tenant.secret.is_empty() {
            return Err(DeliveryError::Config {
                field: "secret",
                reason: "tenant has no signing secret",
            });
        }
        if batch.is_empty() {
            return Err(DeliveryError::EmptyBatch);
        }
        let envelope = DeliveryEnvelope::new(&self.profile_code, batch, uploaded_by, source);
        SignedPayload::new(&envelope, &tenant.secret, unix_now())
    }

    async fn attempt(
        &self,
        tenant: &TenantConfig,
        payload: &SignedPayload,
        attempt: u32,
        max_attempts: u32,
        batch_size: usize,
    ) -> DeliveryResult<u16> {
        self.metrics.inc_delivery_attempt();
        info!(
            tenant_id = %tenant.tenant_id,
            attempt,
            max_attempts,
            batch_size,
            payload_age_secs = payload.age_secs(unix_now()),
            "posting batch"
        );

        let result = self
            .http
            .post(self.endpoint.clone())
            .header(HEADER_TIMESTAMP, payload.timestamp.to_string())
            .header(HEADER_SIGNATURE, payload.signature.as_str())
            .header(HEADER_PROJECT_ID, tenant.tenant_id.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.body.clone())
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                debug!(tenant_id = %tenant.tenant_id, status, response = %text, "downstream accepted batch");
                Ok(status)
            }
            Ok(response) => Err(DeliveryError::Status {
                status: response.status().as_u16(),
            }),
            Err(source) => Err(DeliveryError::Http { source }),
        };
        if let Err(err) = &outcome {
            warn!(tenant_id = %tenant.tenant_id, attempt, max_attempts, error = %err, "delivery attempt failed");
        }
        outcome
    }
}

/// Run `operation` up to `max_attempts` times, sleeping `delay` between failures.
///
/// Returns the attempt number alongside the value or the final error.
pub(crate) async fn retry<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut operation: F,
) -> Result<(u32, T), (u32, E)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok((attempt, value)),
            Err(err) if attempt >= max_attempts => return Err((attempt, err)),
            Err(_) => {
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
