//! Per-tenant poll workers.
//!
//! # Design
//! - One task per tenant runs a cycle every poll interval; ticks missed while a
//!   cycle is running are skipped rather than queued.
//! - Shutdown cancels every worker, waits for in-flight cycles to stop between
//!   files, then drains the session pool.

use std::sync::Arc;
use std::time::Duration;

use dropgate_config::TenantConfig;
use dropgate_pipeline::{CycleOutcome, PollCycle};
use dropgate_sftp::SessionPool;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running set of tenant poll workers.
pub struct TenantScheduler {
    pool: Arc<SessionPool>,
    cancel: CancellationToken,
    workers: JoinSet<usize>,
}

impl TenantScheduler {
    /// Spawn one worker per tenant.
    #[must_use]
    pub fn start(
        cycle: Arc<PollCycle>,
        pool: Arc<SessionPool>,
        tenants: Vec<TenantConfig>,
        poll_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        for tenant in tenants {
            let cycle = Arc::clone(&cycle);
            let cancel = cancel.clone();
            workers.spawn(run_worker(cycle, tenant, poll_interval, cancel));
        }
        info!(workers = workers.len(), poll_interval_secs = poll_interval.as_secs_f64(), "poll workers started");
        Self {
            pool,
            cancel,
            workers,
        }
    }

    /// Token observed by every worker.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every worker and close pooled sessions.
    ///
    /// Returns the number of cycles run across all workers.
    pub async fn shutdown(mut self) -> usize {
        self.cancel.cancel();
        let mut cycles = 0;
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(count) => cycles += count,
                Err(err) => warn!(error = %err, "poll worker join failed"),
            }
        }
        self.pool.close_all().await;
        info!(cycles, "poll workers stopped");
        cycles
    }
}

async fn run_worker(
    cycle: Arc<PollCycle>,
    tenant: TenantConfig,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let report = cycle.run(&tenant, &cancel).await;
        cycles += 1;
        if report.outcome == CycleOutcome::Cancelled {
            break;
        }
        debug!(
            tenant_id = %tenant.tenant_id,
            cycle_id = %report.cycle_id,
            claimed = report.claimed,
            "poll cycle complete"
        );
    }
    debug!(tenant_id = %tenant.tenant_id, cycles, "poll worker exiting");
    cycles
}
