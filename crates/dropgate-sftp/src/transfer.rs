//! One-off file transfers against a tenant's remote, using pooled sessions.
//!
//! Every operation logs its failure and reports a plain outcome. Transport
//! failures also invalidate the tenant's pooled session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dropgate_config::TenantConfig;
use tracing::{error, info};

use crate::bootstrap::DirectoryBootstrapper;
use crate::claim::remote_join;
use crate::error::{SftpError, SftpResult};
use crate::pool::SessionPool;
use crate::session::Credentials;

/// Upload, download, and removal helpers for a tenant's remote.
pub struct RemoteFiles {
    pool: Arc<SessionPool>,
    bootstrapper: DirectoryBootstrapper,
}

impl RemoteFiles {
    /// Build helpers that draw sessions from `pool`.
    #[must_use]
    pub const fn new(pool: Arc<SessionPool>, bootstrapper: DirectoryBootstrapper) -> Self {
        Self { pool, bootstrapper }
    }

    /// Put `local_file` at `remote_dir/<basename>`, creating `remote_dir` when missing.
    pub async fn upload(&self, tenant: &TenantConfig, remote_dir: &str, local_file: &Path) -> bool {
        let result = self.try_upload(tenant, remote_dir, local_file).await;
        self.report(tenant, "upload", remote_dir, result).await.is_some()
    }

    /// Fetch `remote_path` into a fresh temporary directory and return the local path.
    pub async fn download(&self, tenant: &TenantConfig, remote_path: &str) -> Option<PathBuf> {
        let result = self.try_download(tenant, remote_path).await;
        self.report(tenant, "download", remote_path, result).await
    }

    /// Delete the file at `remote_path`.
    pub async fn remove(&self, tenant: &TenantConfig, remote_path: &str) -> bool {
        let result = async {
            let session = self
                .pool
                .acquire(&tenant.tenant_id, &Credentials::from(tenant))
                .await?;
            session.remove(remote_path).await
        }
        .await;
        self.report(tenant, "remove", remote_path, result)
            .await
            .is_some()
    }

    async fn try_upload(
        &self,
        tenant: &TenantConfig,
        remote_dir: &str,
        local_file: &Path,
    ) -> SftpResult<()> {
        let filename = local_file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SftpError::LocalIo {
                operation: "upload.basename",
                path: local_file.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "file name is not valid utf-8",
                ),
            })?;
        let session = self
            .pool
            .acquire(&tenant.tenant_id, &Credentials::from(tenant))
            .await?;
        self.bootstrapper.ensure(session.as_ref(), remote_dir).await?;
        session
            .put(local_file, &remote_join(remote_dir, filename))
            .await
            .map(|_| ())
    }

    async fn try_download(&self, tenant: &TenantConfig, remote_path: &str) -> SftpResult<PathBuf> {
        let filename = remote_path
            .rsplit_once('/')
            .map_or(remote_path, |(_, name)| name);
        let session = self
            .pool
            .acquire(&tenant.tenant_id, &Credentials::from(tenant))
            .await?;
        let dir = tempfile::tempdir().map_err(|source| SftpError::LocalIo {
            operation: "download.tempdir",
            path: std::env::temp_dir(),
            source,
        })?;
        let local = dir.path().join(filename);
        session.get(remote_path, &local).await?;
        let _ = dir.keep();
        Ok(local)
    }

    async fn report<T>(
        &self,
        tenant: &TenantConfig,
        operation: &'static str,
        path: &str,
        result: SftpResult<T>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                info!(tenant_id = %tenant.tenant_id, operation, path, "remote transfer finished");
                Some(value)
            }
            Err(err) => {
                error!(tenant_id = %tenant.tenant_id, operation, path, error = %err, "remote transfer failed");
                if err.is_transport() {
                    self.pool.invalidate(&tenant.tenant_id).await;
                }
                None
            }
        }
    }
}
