//! Claiming files by relocating them into the backup area.
//!
//! The rename is the ownership boundary: once it succeeds exactly one poll
//! cycle owns the file, and the original input path is never read again.

use dropgate_telemetry::{DeferReason, Metrics};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SftpError, SftpResult};
use crate::session::{Probe, RemoteSession};

/// A claimed file, produced once the rename into the backup area succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// File name as listed in the input directory.
    pub filename: String,
    /// Remote path the file now lives at.
    pub backup_path: String,
}

/// Join a remote directory and an entry name with a single `/`.
#[must_use]
pub fn remote_join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Moves ready files from the input directory into a backup directory.
#[derive(Clone)]
pub struct ClaimStore {
    metrics: Metrics,
}

impl ClaimStore {
    /// Build a claim store reporting into `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Relocate `source_path` to `backup_dir/filename`, replacing any leftover there.
    ///
    /// # Errors
    ///
    /// Returns [`SftpError::ClaimConflict`] when the rename fails; the file stays
    /// in the input directory for a later cycle. Transport failures are returned
    /// unchanged so the caller can abort.
    pub async fn claim(
        &self,
        session: &dyn RemoteSession,
        source_path: &str,
        backup_dir: &str,
        filename: &str,
    ) -> SftpResult<FileRecord> {
        let destination = remote_join(backup_dir, filename);

        match session.probe(&destination).await {
            Probe::Exists(_) => match session.remove(&destination).await {
                Ok(()) => debug!(path = %destination, "removed leftover backup copy"),
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => warn!(path = %destination, error = %err, "leftover backup copy could not be removed"),
            },
            Probe::Absent => {}
            Probe::Error(err) if err.is_transport() => return Err(err),
            Probe::Error(err) => {
                debug!(path = %destination, error = %err, "backup destination probe failed");
            }
        }

        match session.rename(source_path, &destination).await {
            Ok(()) => {
                self.metrics.inc_file_claimed();
                info!(filename, backup_path = %destination, "file claimed");
                Ok(FileRecord {
                    filename: filename.to_string(),
                    backup_path: destination,
                })
            }
            Err(err) if err.is_transport() => Err(err),
            Err(err) => {
                self.metrics.inc_file_deferred(DeferReason::ClaimConflict);
                warn!(filename, source_path, error = %err, "claim failed; file left for a later cycle");
                Err(SftpError::ClaimConflict {
                    source_path: source_path.to_string(),
                    destination,
                    source: Box::new(err),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Connector, Credentials, SessionOptions};
    use crate::stub::MemoryRemote;
    use std::sync::Arc;

    async fn session(remote: &MemoryRemote) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let credentials = Credentials {
            host: "memory".to_string(),
            port: 22,
            user: "tester".to_string(),
            password: String::new(),
        };
        Ok(remote
            .connect(&credentials, &SessionOptions::default())
            .await?)
    }

    #[test]
    fn remote_join_uses_single_separator() {
        assert_eq!(remote_join("/drop/in", "a.pdf"), "/drop/in/a.pdf");
        assert_eq!(remote_join("/drop/in/", "a.pdf"), "/drop/in/a.pdf");
        assert_eq!(remote_join("", "a.pdf"), "a.pdf");
    }

    #[tokio::test]
    async fn claim_moves_file_into_backup() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("/drop/input/a.pdf", b"doc");
        remote.add_dir("/drop/in_progress/01022025");
        let session = session(&remote).await?;
        let metrics = Metrics::new()?;

        let record = ClaimStore::new(metrics.clone())
            .claim(
                session.as_ref(),
                "/drop/input/a.pdf",
                "/drop/in_progress/01022025",
                "a.pdf",
            )
            .await?;
        assert_eq!(record.backup_path, "/drop/in_progress/01022025/a.pdf");
        assert!(!remote.has_file("/drop/input/a.pdf"));
        assert_eq!(remote.read(&record.backup_path), Some(b"doc".to_vec()));
        assert_eq!(metrics.snapshot().files_claimed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn claim_replaces_leftover_destination() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("/drop/input/a.pdf", b"fresh");
        remote.add_file("/drop/backup/a.pdf", b"stale");
        let session = session(&remote).await?;

        ClaimStore::new(Metrics::new()?)
            .claim(session.as_ref(), "/drop/input/a.pdf", "/drop/backup", "a.pdf")
            .await?;
        assert_eq!(remote.read("/drop/backup/a.pdf"), Some(b"fresh".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_rename_is_a_conflict_and_leaves_file() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("/drop/input/a.pdf", b"doc");
        remote.add_dir("/drop/backup");
        remote.fail_rename("/drop/input/a.pdf");
        let session = session(&remote).await?;
        let metrics = Metrics::new()?;

        let err = ClaimStore::new(metrics.clone())
            .claim(session.as_ref(), "/drop/input/a.pdf", "/drop/backup", "a.pdf")
            .await;
        assert!(matches!(err, Err(SftpError::ClaimConflict { .. })));
        assert!(remote.has_file("/drop/input/a.pdf"));
        assert_eq!(metrics.snapshot().claim_conflicts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn vanished_source_is_a_conflict() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_dir("/drop/backup");
        let session = session(&remote).await?;

        let err = ClaimStore::new(Metrics::new()?)
            .claim(session.as_ref(), "/drop/input/a.pdf", "/drop/backup", "a.pdf")
            .await;
        assert!(matches!(err, Err(SftpError::ClaimConflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_passes_through() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("/drop/input/a.pdf", b"doc");
        remote.add_dir("/drop/backup");
        remote.drop_transport_on_rename("/drop/input/a.pdf");
        let session = session(&remote).await?;

        let err = ClaimStore::new(Metrics::new()?)
            .claim(session.as_ref(), "/drop/input/a.pdf", "/drop/backup", "a.pdf")
            .await;
        assert!(matches!(err, Err(SftpError::Transport { .. })));
        assert!(!session.is_alive().await);
        Ok(())
    }
}
