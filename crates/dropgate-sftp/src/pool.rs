//! Per-tenant session cache.
//!
//! # Design
//! - One slot per tenant, each behind its own async mutex, so the liveness
//!   check, reconnect, and insert are atomic per tenant while tenants never
//!   contend with each other.
//! - A stale or failed entry is closed and evicted before reconnecting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dropgate_telemetry::Metrics;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::SftpResult;
use crate::session::{Connector, Credentials, RemoteSession, SessionOptions};

type Slot = Arc<AsyncMutex<Option<Arc<dyn RemoteSession>>>>;

/// Cache of one authenticated session per tenant.
pub struct SessionPool {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    slots: Mutex<HashMap<String, Slot>>,
    live: AtomicUsize,
    metrics: Metrics,
}

impl SessionPool {
    /// Build an empty pool that opens sessions through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, options: SessionOptions, metrics: Metrics) -> Self {
        Self {
            connector,
            options,
            slots: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            metrics,
        }
    }

    fn slot(&self, tenant_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
        )
    }

    fn all_slots(&self) -> Vec<(String, Slot)> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(tenant_id, slot)| (tenant_id.clone(), Arc::clone(slot)))
            .collect()
    }

    fn record_insert(&self) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_pooled_sessions(live);
    }

    fn record_evict(&self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.metrics.set_pooled_sessions(live);
    }

    /// Return the cached session for `tenant_id`, reconnecting when it is no longer alive.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SftpError::Connection`] when a new session cannot be
    /// opened; the tenant's slot is left empty so the next call retries cleanly.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        credentials: &Credentials,
    ) -> SftpResult<Arc<dyn RemoteSession>> {
        let slot = self.slot(tenant_id);
        let mut guard = slot.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_alive().await {
                return Ok(Arc::clone(session));
            }
            debug!(tenant_id, "pooled session is stale; reconnecting");
        }
        if let Some(stale) = guard.take() {
            stale.close().await;
            self.record_evict();
        }

        match self.connector.connect(credentials, &self.options).await {
            Ok(session) => {
                *guard = Some(Arc::clone(&session));
                self.record_insert();
                info!(tenant_id, host = %credentials.host, "remote session opened");
                Ok(session)
            }
            Err(err) => {
                warn!(tenant_id, host = %credentials.host, error = %err, "remote session could not be opened");
                Err(err)
            }
        }
    }

    /// Close and drop the cached session for `tenant_id`, if any.
    pub async fn invalidate(&self, tenant_id: &str) {
        let slot = self.slot(tenant_id);
        let mut guard = slot.lock().await;
        if let Some(session) = guard.take() {
            session.close().await;
            self.record_evict();
            debug!(tenant_id, "pooled session invalidated");
        }
    }

    /// Close every cached session and empty the pool.
    pub async fn close_all(&self) {
        let mut closed = 0_usize;
        for (tenant_id, slot) in self.all_slots() {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.take() {
                session.close().await;
                self.record_evict();
                closed += 1;
                debug!(tenant_id = %tenant_id, "pooled session closed");
            }
        }
        info!(closed, "session pool drained");
    }

    /// Open a session that is not cached; the caller owns closing it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SftpError::Connection`] when the session cannot be opened.
    pub async fn connect_unpooled(
        &self,
        credentials: &Credentials,
    ) -> SftpResult<Arc<dyn RemoteSession>> {
        self.connector.connect(credentials, &self.options).await
    }

    /// Number of sessions currently cached.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}
