use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use dropgate_config::{PipelineConfig, TenantConfig};
use dropgate_delivery::{DeliveryClient, HEADER_PROJECT_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use dropgate_pipeline::{
    BACKUP_DATE_FORMAT, BatchDelivery, CycleOutcome, CycleReport, CycleStage, PollCycle,
};
use dropgate_sftp::{
    Connector, Credentials, FileRecord, MemoryRemote, SessionOptions, SessionPool,
};
use dropgate_telemetry::Metrics;
use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;

const BASE: &str = "/drop/acme";
const INPUT: &str = "/drop/acme/input";

struct RecordingDelivery {
    outcome: bool,
    batches: Mutex<Vec<Vec<FileRecord>>>,
    cancel_on_send: Option<CancellationToken>,
}

impl RecordingDelivery {
    fn new(outcome: bool) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            batches: Mutex::new(Vec::new()),
            cancel_on_send: None,
        })
    }

    fn cancelling(token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            outcome: true,
            batches: Mutex::new(Vec::new()),
            cancel_on_send: Some(token),
        })
    }

    fn batches(&self) -> Vec<Vec<FileRecord>> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BatchDelivery for RecordingDelivery {
    async fn send(
        &self,
        _tenant: &TenantConfig,
        batch: &[FileRecord],
        _uploaded_by: &str,
        _source: &str,
    ) -> bool {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch.to_vec());
        }
        if let Some(token) = &self.cancel_on_send {
            token.cancel();
        }
        self.outcome
    }
}

struct Harness {
    remote: MemoryRemote,
    pool: Arc<SessionPool>,
    metrics: Metrics,
    cycle: PollCycle,
}

impl Harness {
    fn new(delivery: Arc<dyn BatchDelivery>) -> anyhow::Result<Self> {
        Self::with_pipeline(delivery, PipelineConfig::new("https://api.example.net/batch"))
    }

    fn with_pipeline(
        delivery: Arc<dyn BatchDelivery>,
        pipeline: PipelineConfig,
    ) -> anyhow::Result<Self> {
        let remote = MemoryRemote::new();
        let metrics = Metrics::new()?;
        let pool = Arc::new(SessionPool::new(
            Arc::new(remote.clone()),
            SessionOptions::default(),
            metrics.clone(),
        ));
        let cycle = PollCycle::new(Arc::clone(&pool), delivery, pipeline, metrics.clone());
        Ok(Self {
            remote,
            pool,
            metrics,
            cycle,
        })
    }

    fn seed(&self, names: &[&str]) {
        for name in names {
            self.remote
                .add_file(&format!("{INPUT}/{name}"), name.as_bytes());
        }
    }

    async fn run(&self) -> CycleReport {
        self.cycle.run(&tenant(), &CancellationToken::new()).await
    }
}

fn tenant() -> TenantConfig {
    TenantConfig {
        tenant_id: "acme".to_string(),
        host: "sftp.acme.test".to_string(),
        port: 22,
        user: "acme".to_string(),
        password: "pw".to_string(),
        path: BASE.to_string(),
        secret: "s3cret".to_string(),
        input_dir: None,
        in_progress_dir: None,
    }
}

fn backup_dir() -> String {
    format!(
        "{BASE}/in_progress/{}",
        Local::now().date_naive().format(BACKUP_DATE_FORMAT)
    )
}

fn pdfs(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("doc{index:02}.pdf")).collect()
}

fn names(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

#[tokio::test(start_paused = true)]
async fn claims_ready_files_in_batches_of_five() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    let files = pdfs(12);
    harness.seed(&names(&files));
    harness.seed(&["notes.txt"]);

    let report = harness.run().await;

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.listed, 13);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.claimed, 12);
    assert_eq!(report.batch_sizes, vec![5, 5, 2]);
    assert_eq!(report.batches_delivered, 3);
    assert_eq!(report.backup_dir.as_deref(), Some(backup_dir().as_str()));

    let delivered: Vec<String> = delivery
        .batches()
        .into_iter()
        .flatten()
        .map(|record| record.backup_path)
        .collect();
    let expected: Vec<String> = files
        .iter()
        .map(|name| format!("{}/{name}", backup_dir()))
        .collect();
    assert_eq!(delivered, expected);

    assert_eq!(harness.remote.file_names(INPUT), vec!["notes.txt"]);
    assert_eq!(harness.remote.file_names(&backup_dir()), files);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.cycles_completed, 1);
    assert_eq!(snapshot.files_claimed, 12);
    assert_eq!(snapshot.batches_delivered, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bootstraps_missing_directories() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;

    let report = harness.run().await;

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.listed, 0);
    assert!(report.batch_sizes.is_empty());
    assert!(harness.remote.has_dir(INPUT));
    assert!(harness.remote.has_dir(&backup_dir()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn growing_file_is_left_in_place() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;
    harness.seed(&["done.pdf"]);
    harness
        .remote
        .add_growing_file(&format!("{INPUT}/partial.pdf"), b"%PDF", 512);

    let report = harness.run().await;

    assert_eq!(report.claimed, 1);
    assert_eq!(report.deferred_not_ready, 1);
    assert!(harness.remote.has_file(&format!("{INPUT}/partial.pdf")));
    assert!(!harness.remote.has_file(&format!("{}/partial.pdf", backup_dir())));
    assert_eq!(harness.metrics.snapshot().files_not_ready, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lost_batches_stay_in_backup_and_cycle_continues() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(false);
    let harness = Harness::new(delivery.clone())?;
    let files = pdfs(11);
    harness.seed(&names(&files));

    let report = harness.run().await;

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.batch_sizes, vec![5, 5, 1]);
    assert_eq!(report.batches_lost, 3);
    assert_eq!(report.batches_delivered, 0);
    assert_eq!(report.lost_files.len(), 11);
    assert_eq!(delivery.batches().len(), 3);
    assert!(harness.remote.file_names(INPUT).is_empty());
    assert_eq!(harness.remote.file_names(&backup_dir()), files);
    assert_eq!(harness.metrics.snapshot().batches_lost, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_cycle_finds_nothing_to_claim() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    harness.seed(&names(&pdfs(3)));

    let first = harness.run().await;
    let second = harness.run().await;

    assert_eq!(first.claimed, 3);
    assert_eq!(second.outcome, CycleOutcome::Done);
    assert_eq!(second.claimed, 0);
    assert!(second.batch_sizes.is_empty());
    assert_eq!(delivery.batches().len(), 1);
    assert_eq!(harness.remote.connect_count(), 1);
    assert_ne!(first.cycle_id, second.cycle_id);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refused_connection_aborts_before_listing() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    harness.seed(&["a.pdf"]);
    harness.remote.refuse_connections(true);

    let report = harness.run().await;

    assert!(matches!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: CycleStage::Connecting,
            ..
        }
    ));
    assert_eq!(report.listed, 0);
    assert!(report.backup_dir.is_none());
    assert!(delivery.batches().is_empty());
    assert!(harness.remote.has_file(&format!("{INPUT}/a.pdf")));
    assert_eq!(harness.metrics.snapshot().cycles_aborted, 1);

    harness.remote.refuse_connections(false);
    let retry = harness.run().await;
    assert_eq!(retry.claimed, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_secret_aborts_before_touching_files() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    harness.seed(&["a.pdf"]);
    let mut tenant = tenant();
    tenant.secret = String::new();

    let report = harness.cycle.run(&tenant, &CancellationToken::new()).await;

    assert!(matches!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: CycleStage::Validating,
            ..
        }
    ));
    assert_eq!(harness.remote.connect_count(), 0);
    assert!(harness.remote.has_file(&format!("{INPUT}/a.pdf")));
    assert!(delivery.batches().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transport_drop_aborts_flushes_claimed_and_drains_pool() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    let files = pdfs(9);
    harness.seed(&names(&files));
    harness
        .remote
        .drop_transport_on_rename(&format!("{INPUT}/doc06.pdf"));

    let report = harness.run().await;

    assert!(matches!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: CycleStage::Claiming,
            ..
        }
    ));
    assert_eq!(report.claimed, 6);
    assert_eq!(report.batch_sizes, vec![5, 1]);
    assert_eq!(delivery.batches().len(), 2);
    assert_eq!(harness.pool.pooled_count(), 0);
    assert_eq!(
        harness.remote.file_names(INPUT),
        vec!["doc06.pdf", "doc07.pdf", "doc08.pdf"]
    );
    assert_eq!(harness.metrics.snapshot().pooled_sessions, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rename_conflict_leaves_file_for_later() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;
    harness.seed(&["a.pdf", "b.pdf", "c.pdf"]);
    harness.remote.fail_rename(&format!("{INPUT}/b.pdf"));

    let report = harness.run().await;

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.claimed, 2);
    assert_eq!(report.claim_conflicts, 1);
    assert_eq!(report.batch_sizes, vec![2]);
    assert_eq!(harness.remote.file_names(INPUT), vec!["b.pdf"]);
    assert_eq!(harness.metrics.snapshot().claim_conflicts, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn leftover_backup_copy_is_replaced() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;
    harness.remote.add_file(&format!("{INPUT}/a.pdf"), b"fresh");
    harness
        .remote
        .add_file(&format!("{}/a.pdf", backup_dir()), b"stale");

    let report = harness.run().await;

    assert_eq!(report.claimed, 1);
    assert_eq!(
        harness.remote.read(&format!("{}/a.pdf", backup_dir())),
        Some(b"fresh".to_vec())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_claims_nothing() -> anyhow::Result<()> {
    let delivery = RecordingDelivery::new(true);
    let harness = Harness::new(delivery.clone())?;
    harness.seed(&names(&pdfs(3)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness.cycle.run(&tenant(), &cancel).await;

    assert_eq!(report.outcome, CycleOutcome::Cancelled);
    assert_eq!(report.claimed, 0);
    assert!(delivery.batches().is_empty());
    assert_eq!(harness.remote.file_names(INPUT).len(), 3);
    assert_eq!(harness.metrics.snapshot().cycles_cancelled, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_files() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let delivery = RecordingDelivery::cancelling(cancel.clone());
    let harness = Harness::new(delivery.clone())?;
    harness.seed(&names(&pdfs(8)));

    let report = harness.cycle.run(&tenant(), &cancel).await;

    assert_eq!(report.outcome, CycleOutcome::Cancelled);
    assert_eq!(report.claimed, 5);
    assert_eq!(report.batch_sizes, vec![5]);
    assert_eq!(harness.remote.file_names(INPUT).len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_with_session_uses_caller_session() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;
    harness.seed(&["a.pdf"]);
    let credentials = Credentials::from(&tenant());
    let session = harness.pool.connect_unpooled(&credentials).await?;

    let report = harness
        .cycle
        .run_with_session(&tenant(), &*session, &CancellationToken::new())
        .await;
    session.close().await;

    assert_eq!(report.claimed, 1);
    assert_eq!(harness.pool.pooled_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dead_session_is_replaced_between_cycles() -> anyhow::Result<()> {
    let harness = Harness::new(RecordingDelivery::new(true))?;
    harness.seed(&["a.pdf"]);
    assert_eq!(harness.run().await.claimed, 1);

    harness.remote.kill_sessions();
    harness.seed(&["b.pdf"]);
    let report = harness.run().await;

    assert_eq!(report.claimed, 1);
    assert_eq!(harness.remote.connect_count(), 2);
    Ok(())
}

#[tokio::test]
async fn delivers_signed_batches_end_to_end() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/batch")
            .header(HEADER_PROJECT_ID, "acme")
            .header_exists(HEADER_TIMESTAMP)
            .header_exists(HEADER_SIGNATURE);
        then.status(200);
    });

    let mut pipeline = PipelineConfig::new(server.url("/batch"));
    pipeline.profile_code = "MORTGAGE".to_string();
    pipeline.settle_delay = Duration::from_millis(5);
    pipeline.delivery.retry_delay = Duration::from_millis(5);
    let metrics = Metrics::new()?;
    let delivery: Arc<dyn BatchDelivery> =
        Arc::new(DeliveryClient::new(&pipeline, metrics.clone())?);

    let remote = MemoryRemote::new();
    let connector: Arc<dyn Connector> = Arc::new(remote.clone());
    let pool = Arc::new(SessionPool::new(
        connector,
        SessionOptions::default(),
        metrics.clone(),
    ));
    let cycle = PollCycle::new(pool, delivery, pipeline, metrics.clone());
    for name in pdfs(7) {
        remote.add_file(&format!("{INPUT}/{name}"), b"%PDF-1.7");
    }

    let report = cycle.run(&tenant(), &CancellationToken::new()).await;

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.batch_sizes, vec![5, 2]);
    assert_eq!(report.batches_delivered, 2);
    mock.assert_calls(2);
    assert_eq!(metrics.snapshot().delivery_attempts, 2);
    Ok(())
}
