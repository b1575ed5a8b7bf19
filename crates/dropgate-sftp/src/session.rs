//! Remote session seams.
//!
//! # Design
//! - `RemoteSession` is the narrow set of file-transfer operations the pipeline consumes.
//! - `Connector` opens sessions so the pool can be exercised without a network.
//! - Probes return an explicit tri-state instead of signalling absence through errors.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dropgate_config::TenantConfig;
use dropgate_config::defaults::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_SESSION_TIMEOUT};

use crate::error::{SftpError, SftpResult};

/// Attributes reported by a status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    /// Reported size in bytes.
    pub size: u64,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// Outcome of probing a remote path.
#[derive(Debug)]
pub enum Probe {
    /// The path exists.
    Exists(RemoteStat),
    /// The server reported that the path does not exist.
    Absent,
    /// The probe failed for another reason.
    Error(SftpError),
}

impl Probe {
    /// Fold a status result into a probe outcome.
    #[must_use]
    pub fn from_result(result: SftpResult<RemoteStat>) -> Self {
        match result {
            Ok(stat) => Self::Exists(stat),
            Err(err) if err.is_not_found() => Self::Absent,
            Err(err) => Self::Error(err),
        }
    }
}

/// One entry returned from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name without the directory prefix.
    pub filename: String,
    /// Attributes reported alongside the entry.
    pub stat: RemoteStat,
}

/// Operations consumed from an authenticated file-transfer session.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Report the attributes of `path`.
    async fn stat(&self, path: &str) -> SftpResult<RemoteStat>;

    /// Probe `path`, separating absence from other failures.
    async fn probe(&self, path: &str) -> Probe {
        Probe::from_result(self.stat(path).await)
    }

    /// Create a single directory; the parent must already exist.
    async fn mkdir(&self, path: &str, mode: i32) -> SftpResult<()>;

    /// List the entries of a directory, excluding `.` and `..`.
    async fn list_dir(&self, path: &str) -> SftpResult<Vec<RemoteEntry>>;

    /// Rename `from` to `to`.
    async fn rename(&self, from: &str, to: &str) -> SftpResult<()>;

    /// Delete the file at `path`.
    async fn remove(&self, path: &str) -> SftpResult<()>;

    /// Copy the remote file at `remote` into `local`, returning the byte count.
    async fn get(&self, remote: &str, local: &Path) -> SftpResult<u64>;

    /// Copy the local file at `local` to `remote`, returning the byte count.
    async fn put(&self, local: &Path, remote: &str) -> SftpResult<u64>;

    /// Whether the session still answers keep-alives.
    async fn is_alive(&self) -> bool;

    /// Close the session. Closing twice is a no-op.
    async fn close(&self);
}

/// Login details for one remote endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login name.
    pub user: String,
    /// Login password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl From<&TenantConfig> for Credentials {
    fn from(tenant: &TenantConfig) -> Self {
        Self {
            host: tenant.host.clone(),
            port: tenant.port,
            user: tenant.user.clone(),
            password: tenant.password.clone(),
        }
    }
}

/// Session tuning applied when a connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between transport keep-alives.
    pub keepalive_interval: Duration,
    /// Bound on the TCP connect and on every blocking session call.
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate with `credentials`, applying `options`.
    async fn connect(
        &self,
        credentials: &Credentials,
        options: &SessionOptions,
    ) -> SftpResult<Arc<dyn RemoteSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_password() {
        let credentials = Credentials {
            host: "sftp.acme.test".to_string(),
            port: 22,
            user: "acme".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("sftp.acme.test"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn probe_from_result_separates_absence() {
        let absent = Probe::from_result(Err(SftpError::NotFound {
            operation: "sftp.stat",
            path: "/x".to_string(),
        }));
        assert!(matches!(absent, Probe::Absent));

        let failed = Probe::from_result(Err(SftpError::Probe {
            operation: "sftp.stat",
            path: "/x".to_string(),
            detail: "permission denied".to_string(),
        }));
        assert!(matches!(failed, Probe::Error(SftpError::Probe { .. })));

        let exists = Probe::from_result(Ok(RemoteStat {
            size: 4,
            is_dir: false,
        }));
        assert!(matches!(exists, Probe::Exists(RemoteStat { size: 4, .. })));
    }
}
