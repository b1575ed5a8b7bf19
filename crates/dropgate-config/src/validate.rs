//! Fail-fast validation for configuration documents.
//!
//! Every check runs before any remote file is touched, so a broken tenant or
//! pipeline entry never results in a half-processed drop folder.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{PipelineConfig, ServiceConfig, TenantConfig};

const PIPELINE: &str = "pipeline";
const TENANT: &str = "tenant";
const SERVICE: &str = "service";

/// Validate the whole service configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered.
pub fn validate_service(config: &ServiceConfig) -> ConfigResult<()> {
    validate_pipeline(&config.pipeline)?;
    if config.poll_interval.is_zero() {
        return Err(ConfigError::invalid(
            SERVICE,
            "poll_interval",
            None,
            "must be greater than zero",
        ));
    }

    let mut seen = HashSet::new();
    for tenant in &config.tenants {
        validate_tenant(tenant)?;
        if !seen.insert(tenant.tenant_id.as_str()) {
            return Err(ConfigError::DuplicateTenant {
                tenant_id: tenant.tenant_id.clone(),
            });
        }
    }
    Ok(())
}

/// Validate pipeline-wide settings.
///
/// # Errors
///
/// Returns an error when the API URL is missing or not http(s), when a
/// directory name is empty, or when the batch/retry sizes are zero.
pub fn validate_pipeline(pipeline: &PipelineConfig) -> ConfigResult<()> {
    validate_api_url(&pipeline.api_url)?;
    ensure_segment(PIPELINE, "input_dir", &pipeline.input_dir)?;
    ensure_segment(PIPELINE, "in_progress_dir", &pipeline.in_progress_dir)?;
    if pipeline.file_extension.trim().is_empty() {
        return Err(ConfigError::invalid(
            PIPELINE,
            "file_extension",
            None,
            "must not be empty",
        ));
    }
    if pipeline.batch_capacity == 0 {
        return Err(ConfigError::invalid(
            PIPELINE,
            "batch_capacity",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }
    if pipeline.delivery.max_attempts == 0 {
        return Err(ConfigError::invalid(
            PIPELINE,
            "delivery.max_attempts",
            Some("0".to_string()),
            "must be greater than zero",
        ));
    }
    Ok(())
}

/// Validate a single tenant entry.
///
/// # Errors
///
/// Returns an error when an identity, connection or signing field is unusable.
pub fn validate_tenant(tenant: &TenantConfig) -> ConfigResult<()> {
    if tenant.tenant_id.trim().is_empty() {
        return Err(ConfigError::invalid(
            TENANT,
            "tenant_id",
            None,
            "must not be empty",
        ));
    }
    if tenant.host.trim().is_empty() {
        return Err(ConfigError::invalid(
            TENANT,
            "host",
            Some(tenant.tenant_id.clone()),
            "must not be empty",
        ));
    }
    if tenant.port == 0 {
        return Err(ConfigError::invalid(
            TENANT,
            "port",
            Some(tenant.tenant_id.clone()),
            "must be between 1 and 65535",
        ));
    }
    if tenant.user.trim().is_empty() {
        return Err(ConfigError::invalid(
            TENANT,
            "user",
            Some(tenant.tenant_id.clone()),
            "must not be empty",
        ));
    }
    if tenant.secret.is_empty() {
        return Err(ConfigError::invalid(
            TENANT,
            "secret",
            Some(tenant.tenant_id.clone()),
            "signing secret is required",
        ));
    }
    if let Some(dir) = &tenant.input_dir {
        ensure_segment(TENANT, "input_dir", dir)?;
    }
    if let Some(dir) = &tenant.in_progress_dir {
        ensure_segment(TENANT, "in_progress_dir", dir)?;
    }
    Ok(())
}

/// Validate that `value` is an absolute http(s) URL with a host.
///
/// # Errors
///
/// Returns an error when the URL is empty or uses another scheme.
pub fn validate_api_url(value: &str) -> ConfigResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(
            PIPELINE,
            "api_url",
            None,
            "must not be empty",
        ));
    }
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| {
            ConfigError::invalid(
                PIPELINE,
                "api_url",
                Some(trimmed.to_string()),
                "must use http or https",
            )
        })?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::invalid(
            PIPELINE,
            "api_url",
            Some(trimmed.to_string()),
            "must include a host",
        ));
    }
    Ok(())
}

fn ensure_segment(section: &'static str, field: &'static str, value: &str) -> ConfigResult<()> {
    let trimmed = value.trim_matches('/');
    if trimmed.trim().is_empty() {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "must not be empty",
        ));
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "must not traverse upwards",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantConfig {
        TenantConfig {
            tenant_id: id.to_string(),
            host: "sftp.example.net".to_string(),
            port: 22,
            user: "drop".to_string(),
            password: "pw".to_string(),
            path: "/drop".to_string(),
            secret: "secret".to_string(),
            input_dir: None,
            in_progress_dir: None,
        }
    }

    fn service(tenants: Vec<TenantConfig>) -> ServiceConfig {
        ServiceConfig::new(PipelineConfig::new("https://api.example.net/batch"), tenants)
    }

    #[test]
    fn accepts_well_formed_service() {
        assert!(validate_service(&service(vec![tenant("a"), tenant("b")])).is_ok());
    }

    #[test]
    fn rejects_duplicate_tenants() {
        let err = validate_service(&service(vec![tenant("a"), tenant("a")]));
        assert!(matches!(err, Err(ConfigError::DuplicateTenant { tenant_id }) if tenant_id == "a"));
    }

    #[test]
    fn rejects_missing_secret() {
        let mut broken = tenant("a");
        broken.secret.clear();
        let err = validate_tenant(&broken);
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField { field: "secret", .. })
        ));
    }

    #[test]
    fn rejects_zero_port_and_blank_host() {
        let mut broken = tenant("a");
        broken.port = 0;
        assert!(matches!(
            validate_tenant(&broken),
            Err(ConfigError::InvalidField { field: "port", .. })
        ));

        let mut broken = tenant("a");
        broken.host = "  ".to_string();
        assert!(matches!(
            validate_tenant(&broken),
            Err(ConfigError::InvalidField { field: "host", .. })
        ));
    }

    #[test]
    fn api_url_requires_http_scheme_and_host() {
        assert!(validate_api_url("https://api.example.net/v1/batch").is_ok());
        assert!(validate_api_url("http://127.0.0.1:8080").is_ok());
        assert!(validate_api_url("").is_err());
        assert!(validate_api_url("ftp://api.example.net").is_err());
        assert!(validate_api_url("https:///path-only").is_err());
    }

    #[test]
    fn directory_overrides_cannot_escape_base() {
        let mut broken = tenant("a");
        broken.input_dir = Some("../elsewhere".to_string());
        assert!(matches!(
            validate_tenant(&broken),
            Err(ConfigError::InvalidField {
                field: "input_dir",
                ..
            })
        ));
    }

    #[test]
    fn zero_batch_capacity_is_rejected() {
        let mut pipeline = PipelineConfig::new("https://api.example.net/batch");
        pipeline.batch_capacity = 0;
        assert!(validate_pipeline(&pipeline).is_err());
    }
}
