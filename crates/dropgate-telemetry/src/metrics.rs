//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges observed by the poll pipeline.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Outcome label for a finished poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcomeLabel {
    /// Every candidate was inspected.
    Completed,
    /// A connection or transport failure ended the cycle early.
    Aborted,
    /// Shutdown interrupted the cycle.
    Cancelled,
}

impl CycleOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Reason a candidate file was left in the input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The file was still growing between samples.
    NotReady,
    /// The claim rename did not succeed.
    ClaimConflict,
}

impl DeferReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::ClaimConflict => "claim_conflict",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    poll_cycles_total: IntCounterVec,
    files_claimed_total: IntCounter,
    files_deferred_total: IntCounterVec,
    delivery_attempts_total: IntCounter,
    batches_total: IntCounterVec,
    pooled_sessions: IntGauge,
}

/// Snapshot of selected gauges and counters for shutdown reporting.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Cycles that inspected every candidate.
    pub cycles_completed: u64,
    /// Cycles ended early by connection or transport failures.
    pub cycles_aborted: u64,
    /// Cycles interrupted by shutdown.
    pub cycles_cancelled: u64,
    /// Files moved into a backup directory.
    pub files_claimed: u64,
    /// Files left behind because they were still growing.
    pub files_not_ready: u64,
    /// Files left behind because the claim rename failed.
    pub claim_conflicts: u64,
    /// HTTP delivery attempts, including retries.
    pub delivery_attempts: u64,
    /// Batches acknowledged by the downstream service.
    pub batches_delivered: u64,
    /// Batches whose delivery attempts were exhausted.
    pub batches_lost: u64,
    /// Sessions currently cached in the pool.
    pub pooled_sessions: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let poll_cycles_total = counter_vec(
            "dropgate_poll_cycles_total",
            "Poll cycles finished by outcome",
            &["outcome"],
        )?;
        let files_claimed_total = counter(
            "dropgate_files_claimed_total",
            "Files moved from the input directory into a backup directory",
        )?;
        let files_deferred_total = counter_vec(
            "dropgate_files_deferred_total",
            "Candidate files left in the input directory by reason",
            &["reason"],
        )?;
        let delivery_attempts_total = counter(
            "dropgate_delivery_attempts_total",
            "HTTP delivery attempts including retries",
        )?;
        let batches_total = counter_vec(
            "dropgate_batches_total",
            "Batches flushed by delivery outcome",
            &["outcome"],
        )?;
        let pooled_sessions = IntGauge::with_opts(Opts::new(
            "dropgate_pooled_sessions",
            "Remote sessions currently cached in the pool",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "dropgate_pooled_sessions",
            source,
        })?;

        register(&registry, "dropgate_poll_cycles_total", &poll_cycles_total)?;
        register(&registry, "dropgate_files_claimed_total", &files_claimed_total)?;
        register(
            &registry,
            "dropgate_files_deferred_total",
            &files_deferred_total,
        )?;
        register(
            &registry,
            "dropgate_delivery_attempts_total",
            &delivery_attempts_total,
        )?;
        register(&registry, "dropgate_batches_total", &batches_total)?;
        register(&registry, "dropgate_pooled_sessions", &pooled_sessions)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                poll_cycles_total,
                files_claimed_total,
                files_deferred_total,
                delivery_attempts_total,
                batches_total,
                pooled_sessions,
            }),
        })
    }

    /// Count a finished poll cycle.
    pub fn inc_poll_cycle(&self, outcome: CycleOutcomeLabel) {
        self.inner
            .poll_cycles_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Count a file moved into a backup directory.
    pub fn inc_file_claimed(&self) {
        self.inner.files_claimed_total.inc();
    }

    /// Count a candidate left in the input directory.
    pub fn inc_file_deferred(&self, reason: DeferReason) {
        self.inner
            .files_deferred_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Count one HTTP delivery attempt.
    pub fn inc_delivery_attempt(&self) {
        self.inner.delivery_attempts_total.inc();
    }

    /// Count a flushed batch by whether it was acknowledged.
    pub fn inc_batch(&self, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "lost" };
        self.inner
            .batches_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Set the pooled session gauge.
    pub fn set_pooled_sessions(&self, count: usize) {
        self.inner
            .pooled_sessions
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the pipeline counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let cycles = |label: CycleOutcomeLabel| {
            inner
                .poll_cycles_total
                .with_label_values(&[label.as_str()])
                .get()
        };
        let deferred = |reason: DeferReason| {
            inner
                .files_deferred_total
                .with_label_values(&[reason.as_str()])
                .get()
        };
        MetricsSnapshot {
            cycles_completed: cycles(CycleOutcomeLabel::Completed),
            cycles_aborted: cycles(CycleOutcomeLabel::Aborted),
            cycles_cancelled: cycles(CycleOutcomeLabel::Cancelled),
            files_claimed: inner.files_claimed_total.get(),
            files_not_ready: deferred(DeferReason::NotReady),
            claim_conflicts: deferred(DeferReason::ClaimConflict),
            delivery_attempts: inner.delivery_attempts_total.get(),
            batches_delivered: inner.batches_total.with_label_values(&["delivered"]).get(),
            batches_lost: inner.batches_total.with_label_values(&["lost"]).get(),
            pooled_sessions: inner.pooled_sessions.get(),
        }
    }
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
