//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// An environment variable held a value that could not be parsed.
    #[error("invalid environment configuration")]
    InvalidEnv {
        /// Name of the offending environment variable.
        name: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation (`pipeline`, `tenant`, `service`).
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available and safe to record.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Two tenants share the same identifier.
    #[error("duplicate tenant identifier")]
    DuplicateTenant {
        /// Identifier that appeared more than once.
        tenant_id: String,
    },
    /// Reading the tenants file failed.
    #[error("configuration file io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path of the file being read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The tenants document was not valid YAML for the expected schema.
    #[error("invalid tenants document")]
    Yaml {
        /// Source path when the document came from disk.
        path: Option<PathBuf>,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub(crate) const fn invalid(
        section: &'static str,
        field: &'static str,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value,
            reason,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
