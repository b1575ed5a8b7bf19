//! Environment and tenant-file loading.
//!
//! # Design
//! - Only the binary edge reads the environment; libraries receive the result.
//! - Lookups go through a closure so tests never mutate process state.
//! - Legacy variable names are honoured as fallbacks for existing deployments.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PipelineConfig, ServiceConfig, TenantConfig};
use crate::validate::validate_service;

/// Downstream endpoint (required).
pub const ENV_API_URL: &str = "DROPGATE_API_URL";
/// YAML file listing tenants (required).
pub const ENV_TENANTS_FILE: &str = "DROPGATE_TENANTS_FILE";
/// Profile code stamped on batch items.
pub const ENV_PROFILE_CODE: &str = "DROPGATE_PROFILE_CODE";
/// Input directory name.
pub const ENV_INPUT_DIR: &str = "DROPGATE_INPUT_DIR";
/// In-progress directory name.
pub const ENV_IN_PROGRESS_DIR: &str = "DROPGATE_IN_PROGRESS_DIR";
/// Extension of files picked up.
pub const ENV_FILE_EXTENSION: &str = "DROPGATE_FILE_EXTENSION";
/// Seconds between poll cycles.
pub const ENV_POLL_INTERVAL_SECS: &str = "DROPGATE_POLL_INTERVAL_SECS";
/// Seconds between session keep-alives.
pub const ENV_KEEPALIVE_SECS: &str = "DROPGATE_KEEPALIVE_SECS";
/// Milliseconds between readiness samples.
pub const ENV_SETTLE_DELAY_MS: &str = "DROPGATE_SETTLE_DELAY_MS";

const LEGACY_API_URL: &str = "DOC_AI_API_URL";
const LEGACY_PROFILE_CODE: &str = "PROFILE_CODE";
const LEGACY_INPUT_DIR: &str = "SOURCE_FILES";
const LEGACY_IN_PROGRESS_DIR: &str = "IN_Progress_Path";

#[derive(Deserialize)]
struct TenantsDocument {
    #[serde(default)]
    tenants: Vec<TenantConfig>,
}

impl ServiceConfig {
    /// Load and validate the service configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing, a value cannot be
    /// parsed, the tenants file cannot be read, or validation fails.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load and validate the service configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &str, legacy: Option<&str>| {
            lookup(primary)
                .or_else(|| legacy.and_then(|name| lookup(name)))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = read(ENV_API_URL, Some(LEGACY_API_URL))
            .ok_or(ConfigError::MissingEnv { name: ENV_API_URL })?;
        let tenants_file = read(ENV_TENANTS_FILE, None).ok_or(ConfigError::MissingEnv {
            name: ENV_TENANTS_FILE,
        })?;

        let mut pipeline = PipelineConfig::new(api_url);
        if let Some(code) = read(ENV_PROFILE_CODE, Some(LEGACY_PROFILE_CODE)) {
            pipeline.profile_code = code;
        }
        if let Some(dir) = read(ENV_INPUT_DIR, Some(LEGACY_INPUT_DIR)) {
            pipeline.input_dir = dir;
        }
        if let Some(dir) = read(ENV_IN_PROGRESS_DIR, Some(LEGACY_IN_PROGRESS_DIR)) {
            pipeline.in_progress_dir = dir;
        }
        if let Some(ext) = read(ENV_FILE_EXTENSION, None) {
            pipeline.file_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(raw) = read(ENV_SETTLE_DELAY_MS, None) {
            pipeline.settle_delay = Duration::from_millis(parse_u64(ENV_SETTLE_DELAY_MS, &raw)?);
        }

        let tenants = read_tenants_file(Path::new(&tenants_file))?;
        let mut config = Self::new(pipeline, tenants);
        if let Some(raw) = read(ENV_POLL_INTERVAL_SECS, None) {
            config.poll_interval = Duration::from_secs(parse_u64(ENV_POLL_INTERVAL_SECS, &raw)?);
        }
        if let Some(raw) = read(ENV_KEEPALIVE_SECS, None) {
            config.keepalive_interval = Duration::from_secs(parse_u64(ENV_KEEPALIVE_SECS, &raw)?);
        }

        validate_service(&config)?;
        info!(
            tenants = config.tenants.len(),
            poll_interval_secs = config.poll_interval.as_secs(),
            "service configuration loaded"
        );
        Ok(config)
    }
}

/// Read the tenants YAML document at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn read_tenants_file(path: &Path) -> ConfigResult<Vec<TenantConfig>> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "tenants_file.read",
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&text, Some(path.to_path_buf()))
}

/// Parse a tenants YAML document of the form `tenants: [...]`.
///
/// # Errors
///
/// Returns an error when the document does not match the tenant schema.
pub fn parse_tenants(text: &str) -> ConfigResult<Vec<TenantConfig>> {
    parse_document(text, None)
}

fn parse_document(text: &str, path: Option<PathBuf>) -> ConfigResult<Vec<TenantConfig>> {
    serde_yaml::from_str::<TenantsDocument>(text)
        .map(|document| document.tenants)
        .map_err(|source| ConfigError::Yaml { path, source })
}

fn parse_u64(name: &'static str, raw: &str) -> ConfigResult<u64> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: raw.to_string(),
        reason: "expected a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r"
tenants:
  - tenant_id: acme
    host: sftp.acme.test
    user: acme
    password: pw
    path: /drop/acme
    secret: acme-secret
  - project_id: 42
    sftp_host: sftp.globex.test
    sftp_port: 2222
    sftp_user: globex
    sftp_pass: pw
    path: drops/globex
    secret: globex-secret
    input_dir: incoming
";

    #[test]
    fn parses_native_and_legacy_field_names() -> anyhow::Result<()> {
        let tenants = parse_tenants(DOCUMENT)?;
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].tenant_id, "acme");
        assert_eq!(tenants[0].port, 22);
        assert_eq!(tenants[1].tenant_id, "42");
        assert_eq!(tenants[1].port, 2222);
        assert_eq!(tenants[1].input_dir.as_deref(), Some("incoming"));
        Ok(())
    }

    #[test]
    fn malformed_document_reports_yaml_error() {
        let err = parse_tenants("tenants: [ { host: 1 ");
        assert!(matches!(err, Err(ConfigError::Yaml { path: None, .. })));
    }

    #[test]
    fn from_lookup_applies_overrides_and_legacy_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("tenants.yaml");
        fs::write(&file, DOCUMENT)?;
        let file_name = file.display().to_string();

        let config = ServiceConfig::from_lookup(|name| match name {
            LEGACY_API_URL => Some("https://api.example.net/batch".to_string()),
            ENV_TENANTS_FILE => Some(file_name.clone()),
            LEGACY_INPUT_DIR => Some("inbox".to_string()),
            ENV_PROFILE_CODE => Some("MORTGAGE".to_string()),
            ENV_POLL_INTERVAL_SECS => Some("15".to_string()),
            ENV_FILE_EXTENSION => Some(".tif".to_string()),
            _ => None,
        })?;

        assert_eq!(config.pipeline.api_url, "https://api.example.net/batch");
        assert_eq!(config.pipeline.input_dir, "inbox");
        assert_eq!(config.pipeline.in_progress_dir, "in_progress");
        assert_eq!(config.pipeline.profile_code, "MORTGAGE");
        assert_eq!(config.pipeline.file_extension, "tif");
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.tenants.len(), 2);
        Ok(())
    }

    #[test]
    fn from_lookup_requires_api_url() {
        let err = ServiceConfig::from_lookup(|_| None);
        assert!(matches!(
            err,
            Err(ConfigError::MissingEnv {
                name: ENV_API_URL
            })
        ));
    }

    #[test]
    fn from_lookup_rejects_unparseable_interval() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("tenants.yaml");
        fs::write(&file, "tenants: []\n")?;
        let file_name = file.display().to_string();

        let err = ServiceConfig::from_lookup(|name| match name {
            ENV_API_URL => Some("https://api.example.net".to_string()),
            ENV_TENANTS_FILE => Some(file_name.clone()),
            ENV_POLL_INTERVAL_SECS => Some("soon".to_string()),
            _ => None,
        });
        assert!(matches!(
            err,
            Err(ConfigError::InvalidEnv {
                name: ENV_POLL_INTERVAL_SECS,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn missing_tenants_file_is_an_io_error() {
        let err = read_tenants_file(Path::new("/definitely/missing/tenants.yaml"));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
