//! Typed configuration models for tenants and the polling pipeline.
//!
//! # Design
//! - Pure data carriers; nothing here reads the process environment.
//! - Secrets never appear in `Debug` output.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::defaults::{
    BATCH_CAPACITY, DEFAULT_FILE_EXTENSION, DEFAULT_IN_PROGRESS_DIR, DEFAULT_INPUT_DIR,
    DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, DEFAULT_SFTP_PORT,
    DEFAULT_SOURCE, DEFAULT_UPLOADED_BY, DELIVERY_CONNECT_TIMEOUT, DELIVERY_REQUEST_TIMEOUT,
    DELIVERY_RETRY_DELAY, MAX_DELIVERY_ATTEMPTS,
};

const REDACTED: &str = "<redacted>";

/// Connection target, remote layout and signing key for a single tenant.
///
/// Owned by the caller and only ever borrowed by the pipeline.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct TenantConfig {
    /// Identifier used to key pooled sessions and sent as `x-project-id`.
    #[serde(alias = "project_id", deserialize_with = "string_or_number")]
    pub tenant_id: String,
    /// Remote file-transfer host.
    #[serde(alias = "sftp_host")]
    pub host: String,
    /// Remote file-transfer port.
    #[serde(default = "default_port", alias = "sftp_port")]
    pub port: u16,
    /// Login user.
    #[serde(alias = "sftp_user")]
    pub user: String,
    /// Login password.
    #[serde(alias = "sftp_pass")]
    pub password: String,
    /// Base remote directory holding the input and in-progress trees.
    #[serde(default)]
    pub path: String,
    /// Shared key used to sign delivery payloads.
    #[serde(default)]
    pub secret: String,
    /// Optional override of the input directory name.
    #[serde(default)]
    pub input_dir: Option<String>,
    /// Optional override of the in-progress directory name.
    #[serde(default)]
    pub in_progress_dir: Option<String>,
}

impl TenantConfig {
    /// Input directory name for this tenant, falling back to the pipeline default.
    #[must_use]
    pub fn input_dir_name<'a>(&'a self, pipeline: &'a PipelineConfig) -> &'a str {
        self.input_dir.as_deref().unwrap_or(&pipeline.input_dir)
    }

    /// In-progress directory name for this tenant, falling back to the pipeline default.
    #[must_use]
    pub fn in_progress_dir_name<'a>(&'a self, pipeline: &'a PipelineConfig) -> &'a str {
        self.in_progress_dir
            .as_deref()
            .unwrap_or(&pipeline.in_progress_dir)
    }
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TenantConfig")
            .field("tenant_id", &self.tenant_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("path", &self.path)
            .field("secret", &REDACTED)
            .field("input_dir", &self.input_dir)
            .field("in_progress_dir", &self.in_progress_dir)
            .finish()
    }
}

/// Retry and timeout policy for the delivery HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            retry_delay: DELIVERY_RETRY_DELAY,
            connect_timeout: DELIVERY_CONNECT_TIMEOUT,
            request_timeout: DELIVERY_REQUEST_TIMEOUT,
        }
    }
}

/// Pipeline-wide settings shared by every tenant's poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Downstream batch-processing endpoint.
    pub api_url: String,
    /// Profile code stamped on every batch item.
    pub profile_code: String,
    /// Default input directory name.
    pub input_dir: String,
    /// Default in-progress directory name.
    pub in_progress_dir: String,
    /// Uploader recorded on the envelope.
    pub uploaded_by: String,
    /// Source label recorded on the envelope.
    pub source: String,
    /// Extension (without dot) of files picked up, compared case-insensitively.
    pub file_extension: String,
    /// Files per delivery.
    pub batch_capacity: usize,
    /// Delay between the two readiness size samples.
    pub settle_delay: Duration,
    /// Delivery retry policy.
    pub delivery: DeliveryPolicy,
}

impl PipelineConfig {
    /// Build a pipeline configuration for `api_url` with every other field defaulted.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            profile_code: String::new(),
            input_dir: DEFAULT_INPUT_DIR.to_string(),
            in_progress_dir: DEFAULT_IN_PROGRESS_DIR.to_string(),
            uploaded_by: DEFAULT_UPLOADED_BY.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            batch_capacity: BATCH_CAPACITY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            delivery: DeliveryPolicy::default(),
        }
    }

    /// Whether `filename` carries the configured extension.
    #[must_use]
    pub fn matches_extension(&self, filename: &str) -> bool {
        filename.rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty() && ext.eq_ignore_ascii_case(&self.file_extension)
        })
    }
}

/// Top-level service configuration assembled by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Shared pipeline settings.
    pub pipeline: PipelineConfig,
    /// Tenants polled by this process.
    pub tenants: Vec<TenantConfig>,
    /// Interval between scheduled poll cycles per tenant.
    pub poll_interval: Duration,
    /// Keep-alive interval configured on remote sessions.
    pub keepalive_interval: Duration,
}

impl ServiceConfig {
    /// Assemble a service configuration with default intervals.
    #[must_use]
    pub const fn new(pipeline: PipelineConfig, tenants: Vec<TenantConfig>) -> Self {
        Self {
            pipeline,
            tenants,
            poll_interval: DEFAULT_POLL_INTERVAL,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

const fn default_port() -> u16 {
    DEFAULT_SFTP_PORT
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(value) => value,
        Raw::Signed(value) => value.to_string(),
        Raw::Unsigned(value) => value.to_string(),
    })
}
