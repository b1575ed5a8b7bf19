//! Upload completion heuristic.

use std::time::Duration;

use dropgate_config::defaults::DEFAULT_SETTLE_DELAY;
use tracing::{debug, warn};

use crate::session::{Probe, RemoteSession};

/// Decides whether an upload has finished by sampling its size twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessDetector {
    settle_delay: Duration,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl ReadinessDetector {
    /// Build a detector that waits `settle_delay` between samples.
    #[must_use]
    pub const fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// True only when two size samples `settle_delay` apart both succeed and match.
    pub async fn is_ready(&self, session: &dyn RemoteSession, path: &str) -> bool {
        let Some(first) = Self::sample(session, path).await else {
            return false;
        };
        tokio::time::sleep(self.settle_delay).await;
        let Some(second) = Self::sample(session, path).await else {
            return false;
        };
        if first != second {
            debug!(path, first, second, "file still growing");
        }
        first == second
    }

    async fn sample(session: &dyn RemoteSession, path: &str) -> Option<u64> {
        match session.probe(path).await {
            Probe::Exists(stat) if !stat.is_dir => Some(stat.size),
            Probe::Exists(_) => {
                debug!(path, "candidate is a directory");
                None
            }
            Probe::Absent => {
                debug!(path, "candidate vanished before readiness check");
                None
            }
            Probe::Error(err) => {
                warn!(path, error = %err, "readiness probe failed");
                None
            }
        }
    }
}
