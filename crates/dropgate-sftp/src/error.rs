//! # Design
//!
//! - Keep error messages constant; store operational context in fields.
//! - Separate "absent" from other failures so callers can branch on a tri-state probe.
//! - Mark session-level failures as transport errors so a cycle can abort cleanly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by remote file-transfer operations.
#[derive(Debug, Error)]
pub enum SftpError {
    /// Opening or authenticating a session failed.
    #[error("failed to open remote session")]
    Connection {
        /// Remote host that was contacted.
        host: String,
        /// Remote port that was contacted.
        port: u16,
        /// Underlying failure description.
        detail: String,
    },
    /// The remote path does not exist.
    #[error("remote path not found")]
    NotFound {
        /// Operation that observed the missing path.
        operation: &'static str,
        /// Remote path involved.
        path: String,
    },
    /// A status or listing probe failed for a reason other than absence.
    #[error("remote probe failed")]
    Probe {
        /// Operation that issued the probe.
        operation: &'static str,
        /// Remote path involved.
        path: String,
        /// Server-reported failure description.
        detail: String,
    },
    /// A mutating remote operation was rejected by the server.
    #[error("remote operation rejected")]
    Remote {
        /// Operation that was rejected.
        operation: &'static str,
        /// Remote path involved.
        path: String,
        /// Server-reported failure description.
        detail: String,
    },
    /// The session itself failed; further operations on it will not succeed.
    #[error("remote session transport failed")]
    Transport {
        /// Operation in flight when the transport failed.
        operation: &'static str,
        /// Underlying failure description.
        detail: String,
    },
    /// Relocating a file into the backup area failed.
    #[error("file claim failed")]
    ClaimConflict {
        /// Path the file was expected at.
        source_path: String,
        /// Backup path the file was being moved to.
        destination: String,
        /// Failure reported by the rename.
        #[source]
        source: Box<SftpError>,
    },
    /// A path expected to be a directory is a regular file.
    #[error("remote path is not a directory")]
    NotADirectory {
        /// Remote path involved.
        path: String,
    },
    /// A local filesystem operation failed while transferring a file.
    #[error("local filesystem operation failed")]
    LocalIo {
        /// Operation that failed.
        operation: &'static str,
        /// Local path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A blocking session task could not be joined.
    #[error("remote session task failed")]
    Join {
        /// Operation that was running on the blocking pool.
        operation: &'static str,
        /// Underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl SftpError {
    /// True when the error reports a missing remote path.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the session can no longer be used.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Connection { .. } | Self::Join { .. }
        )
    }
}

/// Convenience alias for remote file-transfer results.
pub type SftpResult<T> = Result<T, SftpError>;
