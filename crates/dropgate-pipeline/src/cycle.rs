//! One poll pass over one tenant's input directory.
//!
//! # Design
//! - Work inside a cycle is strictly sequential: list once, then check, claim,
//!   and accumulate each candidate in listing order.
//! - A file is claimed before it is counted toward a batch; claimed files are
//!   always flushed, even when the cycle aborts or is cancelled.
//! - Cancellation is observed between files, never mid-claim.
//! - A tenant without a signing secret is rejected before any file is touched.
//! - Connection failures abort the cycle; transport failures after connecting
//!   also drain the session pool so the next cycle starts clean.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use dropgate_config::{PipelineConfig, TenantConfig};
use dropgate_sftp::{
    ClaimStore, Credentials, DirectoryBootstrapper, FileRecord, ReadinessDetector, RemoteEntry,
    RemoteSession, SessionPool, SftpError, remote_join,
};
use dropgate_telemetry::{CycleOutcomeLabel, DeferReason, Metrics};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::batch::BatchAccumulator;
use crate::delivery::BatchDelivery;

/// Format of the dated backup directory name.
pub const BACKUP_DATE_FORMAT: &str = "%m%d%Y";

/// Stage a cycle was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    /// Checking the tenant's delivery settings before touching any file.
    Validating,
    /// Acquiring a session.
    Connecting,
    /// Ensuring the base, input, and backup directories.
    Bootstrapping,
    /// Listing the input directory.
    Listing,
    /// Checking a candidate's readiness.
    Checking,
    /// Moving a candidate into the backup directory.
    Claiming,
    /// Delivering a batch.
    Flushing,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Connecting => "connecting",
            Self::Bootstrapping => "bootstrapping",
            Self::Listing => "listing",
            Self::Checking => "checking",
            Self::Claiming => "claiming",
            Self::Flushing => "flushing",
        };
        f.write_str(name)
    }
}

/// Terminal state of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every listed candidate was inspected.
    Done,
    /// A connection-level failure ended the cycle early.
    Aborted {
        /// Stage that failed.
        stage: CycleStage,
        /// Failure description.
        reason: String,
    },
    /// Shutdown was requested before every candidate was inspected.
    Cancelled,
}

impl CycleOutcome {
    const fn label(&self) -> CycleOutcomeLabel {
        match self {
            Self::Done => CycleOutcomeLabel::Completed,
            Self::Aborted { .. } => CycleOutcomeLabel::Aborted,
            Self::Cancelled => CycleOutcomeLabel::Cancelled,
        }
    }
}

/// Remote paths used by one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLayout {
    /// Tenant base directory.
    pub base: String,
    /// Directory scanned for new files.
    pub input_dir: String,
    /// Dated directory claimed files are moved into.
    pub backup_dir: String,
}

impl CycleLayout {
    /// Resolve the layout for `tenant` on `date`.
    #[must_use]
    pub fn new(tenant: &TenantConfig, pipeline: &PipelineConfig, date: NaiveDate) -> Self {
        let base = tenant.path.trim_end_matches('/').to_string();
        let input_dir = remote_join(&base, tenant.input_dir_name(pipeline));
        let in_progress = remote_join(&base, tenant.in_progress_dir_name(pipeline));
        let backup_dir = remote_join(&in_progress, &date.format(BACKUP_DATE_FORMAT).to_string());
        Self {
            base,
            input_dir,
            backup_dir,
        }
    }

    fn directories(&self) -> Vec<&str> {
        [
            self.base.as_str(),
            self.input_dir.as_str(),
            self.backup_dir.as_str(),
        ]
        .into_iter()
        .filter(|path| !path.is_empty())
        .collect()
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Tenant the cycle ran for.
    pub tenant_id: String,
    /// Identifier correlating the cycle's log lines.
    pub cycle_id: Uuid,
    /// Terminal state.
    pub outcome: CycleOutcome,
    /// Backup directory used, once resolved.
    pub backup_dir: Option<String>,
    /// Entries returned by the listing.
    pub listed: usize,
    /// Entries skipped for not matching the extension filter.
    pub skipped: usize,
    /// Candidates left behind because they were still growing.
    pub deferred_not_ready: usize,
    /// Candidates left behind because the claim rename failed.
    pub claim_conflicts: usize,
    /// Files moved into the backup directory.
    pub claimed: usize,
    /// Size of every batch flushed, in order.
    pub batch_sizes: Vec<usize>,
    /// Batches acknowledged downstream.
    pub batches_delivered: usize,
    /// Batches whose delivery attempts were exhausted.
    pub batches_lost: usize,
    /// Files in lost batches; they remain in the backup directory.
    pub lost_files: Vec<FileRecord>,
}

impl CycleReport {
    fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            cycle_id: Uuid::new_v4(),
            outcome: CycleOutcome::Done,
            backup_dir: None,
            listed: 0,
            skipped: 0,
            deferred_not_ready: 0,
            claim_conflicts: 0,
            claimed: 0,
            batch_sizes: Vec::new(),
            batches_delivered: 0,
            batches_lost: 0,
            lost_files: Vec::new(),
        }
    }
}

struct Abort {
    stage: CycleStage,
    error: SftpError,
}

impl Abort {
    fn at(stage: CycleStage) -> impl FnOnce(SftpError) -> Self {
        move |error| Self { stage, error }
    }
}

enum Progress {
    Finished,
    Cancelled,
}

/// Runs poll cycles for tenants.
pub struct PollCycle {
    pool: Arc<SessionPool>,
    delivery: Arc<dyn BatchDelivery>,
    pipeline: PipelineConfig,
    bootstrapper: DirectoryBootstrapper,
    readiness: ReadinessDetector,
    claims: ClaimStore,
    metrics: Metrics,
}

impl PollCycle {
    /// Build a cycle runner from explicit configuration.
    #[must_use]
    pub fn new(
        pool: Arc<SessionPool>,
        delivery: Arc<dyn BatchDelivery>,
        pipeline: PipelineConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            pool,
            delivery,
            readiness: ReadinessDetector::new(pipeline.settle_delay),
            bootstrapper: DirectoryBootstrapper::default(),
            claims: ClaimStore::new(metrics.clone()),
            pipeline,
            metrics,
        }
    }

    /// Pipeline configuration this runner was built with.
    #[must_use]
    pub const fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Run one cycle for `tenant` using its pooled session.
    pub async fn run(&self, tenant: &TenantConfig, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::new(&tenant.tenant_id);
        let span = info_span!("poll_cycle", tenant_id = %tenant.tenant_id, cycle_id = %report.cycle_id);
        async {
            if let Err(reason) = self.preflight(tenant) {
                self.abort_before_start(&mut report, CycleStage::Validating, reason);
                return;
            }
            match self
                .pool
                .acquire(&tenant.tenant_id, &Credentials::from(tenant))
                .await
            {
                Ok(session) => self.execute(tenant, &*session, cancel, &mut report).await,
                Err(err) => {
                    self.abort_before_start(&mut report, CycleStage::Connecting, err.to_string());
                }
            }
        }
        .instrument(span)
        .await;
        report
    }

    /// Run one cycle for `tenant` against a session supplied by the caller.
    pub async fn run_with_session(
        &self,
        tenant: &TenantConfig,
        session: &dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let mut report = CycleReport::new(&tenant.tenant_id);
        let span = info_span!("poll_cycle", tenant_id = %tenant.tenant_id, cycle_id = %report.cycle_id);
        async {
            if let Err(reason) = self.preflight(tenant) {
                self.abort_before_start(&mut report, CycleStage::Validating, reason);
                return;
            }
            self.execute(tenant, session, cancel, &mut report).await;
        }
        .instrument(span)
        .await;
        report
    }

    fn preflight(&self, tenant: &TenantConfig) -> Result<(), String> {
        if self.pipeline.api_url.trim().is_empty() {
            return Err("delivery api url is not configured".to_string());
        }
        if tenant.secret.trim().is_empty() {
            return Err("tenant has no signing secret".to_string());
        }
        Ok(())
    }

    fn abort_before_start(&self, report: &mut CycleReport, stage: CycleStage, reason: String) {
        report.outcome = CycleOutcome::Aborted { stage, reason };
        self.finish(report);
    }

    async fn execute(
        &self,
        tenant: &TenantConfig,
        session: &dyn RemoteSession,
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) {
        let layout = CycleLayout::new(tenant, &self.pipeline, Local::now().date_naive());
        report.backup_dir = Some(layout.backup_dir.clone());

        report.outcome = match self.drive(tenant, session, cancel, &layout, report).await {
            Ok(Progress::Finished) => CycleOutcome::Done,
            Ok(Progress::Cancelled) => CycleOutcome::Cancelled,
            Err(abort) => {
                if abort.error.is_transport() {
                    warn!(stage = %abort.stage, "transport failure; closing pooled sessions");
                    self.pool.close_all().await;
                }
                CycleOutcome::Aborted {
                    stage: abort.stage,
                    reason: abort.error.to_string(),
                }
            }
        };
        self.finish(report);
    }

    async fn drive(
        &self,
        tenant: &TenantConfig,
        session: &dyn RemoteSession,
        cancel: &CancellationToken,
        layout: &CycleLayout,
        report: &mut CycleReport,
    ) -> Result<Progress, Abort> {
        self.bootstrapper
            .ensure_all(session, &layout.directories())
            .await
            .map_err(Abort::at(CycleStage::Bootstrapping))?;

        let entries = session
            .list_dir(&layout.input_dir)
            .await
            .map_err(Abort::at(CycleStage::Listing))?;
        report.listed = entries.len();
        debug!(input_dir = %layout.input_dir, entries = entries.len(), "input directory listed");

        let mut batch = BatchAccumulator::new(self.pipeline.batch_capacity);
        let progress = self
            .process(tenant, session, cancel, layout, entries, &mut batch, report)
            .await;

        batch
            .flush_remainder(|records| self.flush(tenant, records, report))
            .await;
        progress
    }

    #[allow(clippy::too_many_arguments)]
    async fn process(
        &self,
        tenant: &TenantConfig,
        session: &dyn RemoteSession,
        cancel: &CancellationToken,
        layout: &CycleLayout,
        entries: Vec<RemoteEntry>,
        batch: &mut BatchAccumulator,
        report: &mut CycleReport,
    ) -> Result<Progress, Abort> {
        let total = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(remaining = total - index, "cancellation requested; stopping before next file");
                return Ok(Progress::Cancelled);
            }
            if entry.stat.is_dir || !self.pipeline.matches_extension(&entry.filename) {
                report.skipped += 1;
                continue;
            }

            let source_path = remote_join(&layout.input_dir, &entry.filename);
            if !self.readiness.is_ready(session, &source_path).await {
                Self::ensure_alive(session, CycleStage::Checking).await?;
                report.deferred_not_ready += 1;
                self.metrics.inc_file_deferred(DeferReason::NotReady);
                debug!(filename = %entry.filename, "file not ready; deferring");
                continue;
            }

            match self
                .claims
                .claim(session, &source_path, &layout.backup_dir, &entry.filename)
                .await
            {
                Ok(record) => {
                    report.claimed += 1;
                    batch.add(record);
                }
                Err(SftpError::ClaimConflict { .. }) => {
                    Self::ensure_alive(session, CycleStage::Claiming).await?;
                    report.claim_conflicts += 1;
                    continue;
                }
                Err(error) => {
                    return Err(Abort {
                        stage: CycleStage::Claiming,
                        error,
                    });
                }
            }

            batch
                .flush_if_full(|records| self.flush(tenant, records, report))
                .await;
        }
        Ok(Progress::Finished)
    }

    async fn ensure_alive(session: &dyn RemoteSession, stage: CycleStage) -> Result<(), Abort> {
        if session.is_alive().await {
            return Ok(());
        }
        Err(Abort {
            stage,
            error: SftpError::Transport {
                operation: "session.keepalive",
                detail: "session stopped responding".to_string(),
            },
        })
    }

    async fn flush(
        &self,
        tenant: &TenantConfig,
        records: Vec<FileRecord>,
        report: &mut CycleReport,
    ) -> bool {
        let batch_size = records.len();
        debug!(stage = %CycleStage::Flushing, batch_size, "flushing batch");
        let delivered = self
            .delivery
            .send(
                tenant,
                &records,
                &self.pipeline.uploaded_by,
                &self.pipeline.source,
            )
            .await;
        self.metrics.inc_batch(delivered);
        report.batch_sizes.push(batch_size);

        if delivered {
            report.batches_delivered += 1;
        } else {
            let backup_paths: Vec<&str> = records
                .iter()
                .map(|record| record.backup_path.as_str())
                .collect();
            error!(
                batch_size,
                backup_paths = ?backup_paths,
                "batch lost after exhausting delivery attempts; files remain in the backup directory"
            );
            report.batches_lost += 1;
            report.lost_files.extend(records);
        }
        delivered
    }

    fn finish(&self, report: &CycleReport) {
        self.metrics.inc_poll_cycle(report.outcome.label());
        match &report.outcome {
            CycleOutcome::Aborted { stage, reason } => warn!(
                stage = %stage,
                reason = %reason,
                claimed = report.claimed,
                "poll cycle aborted"
            ),
            outcome => info!(
                outcome = ?outcome,
                listed = report.listed,
                claimed = report.claimed,
                not_ready = report.deferred_not_ready,
                conflicts = report.claim_conflicts,
                batches_delivered = report.batches_delivered,
                batches_lost = report.batches_lost,
                "poll cycle finished"
            ),
        }
    }
}
