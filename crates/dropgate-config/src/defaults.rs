//! Default values and fixed design constants for the pipeline.
//!
//! # Design
//! - Centralize defaults so the loader, models and tests agree on them.
//! - Keep time-based defaults explicit for auditability.

use std::time::Duration;

/// Default SSH port for remote file-transfer endpoints.
pub const DEFAULT_SFTP_PORT: u16 = 22;
/// Input directory name beneath a tenant's base path.
pub const DEFAULT_INPUT_DIR: &str = "input";
/// In-progress (backup) directory name beneath a tenant's base path.
pub const DEFAULT_IN_PROGRESS_DIR: &str = "in_progress";
/// Uploader recorded on every delivery envelope.
pub const DEFAULT_UPLOADED_BY: &str = "Scheduler";
/// Source label recorded on every delivery envelope.
pub const DEFAULT_SOURCE: &str = "SFTP DROP";
/// File extension picked up from the input directory.
pub const DEFAULT_FILE_EXTENSION: &str = "pdf";
/// Number of claimed files grouped into one delivery.
pub const BATCH_CAPACITY: usize = 5;
/// Delay between the two size samples of the readiness check.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1_200);
/// Total delivery attempts per batch, including the first.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;
/// Fixed pause between delivery attempts.
pub const DELIVERY_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Connect timeout for the delivery HTTP call.
pub const DELIVERY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for the delivery HTTP call.
pub const DELIVERY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Interval between scheduled poll cycles for a tenant.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Keep-alive interval configured on every remote session.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Connect and per-operation timeout applied to remote file-transfer sessions.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);
