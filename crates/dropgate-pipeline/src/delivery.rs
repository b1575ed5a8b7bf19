//! Seam between the poll cycle and batch delivery.

use async_trait::async_trait;
use dropgate_config::TenantConfig;
use dropgate_delivery::DeliveryClient;
use dropgate_sftp::FileRecord;

/// Delivers one batch and reports whether it was acknowledged.
#[async_trait]
pub trait BatchDelivery: Send + Sync {
    /// Send `batch` on behalf of `tenant`. Failures are logged, never raised.
    async fn send(
        &self,
        tenant: &TenantConfig,
        batch: &[FileRecord],
        uploaded_by: &str,
        source: &str,
    ) -> bool;
}

#[async_trait]
impl BatchDelivery for DeliveryClient {
    async fn send(
        &self,
        tenant: &TenantConfig,
        batch: &[FileRecord],
        uploaded_by: &str,
        source: &str,
    ) -> bool {
        Self::send(self, tenant, batch, uploaded_by, source).await
    }
}
