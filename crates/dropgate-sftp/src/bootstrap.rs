//! Remote directory bootstrapping.

use tracing::debug;

use crate::error::{SftpError, SftpResult};
use crate::session::{Probe, RemoteSession};

/// Permission bits applied to created directories.
pub const DEFAULT_DIRECTORY_MODE: i32 = 0o755;

/// Creates missing remote directories segment by segment.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryBootstrapper {
    mode: i32,
}

impl Default for DirectoryBootstrapper {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTORY_MODE)
    }
}

impl DirectoryBootstrapper {
    /// Build a bootstrapper that creates directories with `mode`.
    #[must_use]
    pub const fn new(mode: i32) -> Self {
        Self { mode }
    }

    /// Ensure `path` exists as a directory, creating missing segments parent first.
    ///
    /// # Errors
    ///
    /// Returns the probe error for any failure other than absence, or
    /// [`SftpError::NotADirectory`] when a segment is a regular file.
    pub async fn ensure(&self, session: &dyn RemoteSession, path: &str) -> SftpResult<()> {
        match session.probe(path).await {
            Probe::Exists(stat) if stat.is_dir => return Ok(()),
            Probe::Exists(_) => {
                return Err(SftpError::NotADirectory {
                    path: path.to_string(),
                });
            }
            Probe::Error(err) => return Err(err),
            Probe::Absent => {}
        }
        for segment in segment_prefixes(path) {
            self.ensure_segment(session, &segment).await?;
        }
        Ok(())
    }

    /// Ensure each path in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub async fn ensure_all(&self, session: &dyn RemoteSession, paths: &[&str]) -> SftpResult<()> {
        for path in paths {
            self.ensure(session, path).await?;
        }
        Ok(())
    }

    async fn ensure_segment(&self, session: &dyn RemoteSession, segment: &str) -> SftpResult<()> {
        match session.probe(segment).await {
            Probe::Exists(stat) if stat.is_dir => Ok(()),
            Probe::Exists(_) => Err(SftpError::NotADirectory {
                path: segment.to_string(),
            }),
            Probe::Error(err) => Err(err),
            Probe::Absent => match session.mkdir(segment, self.mode).await {
                Ok(()) => {
                    debug!(path = segment, "created remote directory");
                    Ok(())
                }
                // Another writer may have created it between probe and mkdir.
                Err(err) => match session.probe(segment).await {
                    Probe::Exists(stat) if stat.is_dir => Ok(()),
                    _ => Err(err),
                },
            },
        }
    }
}

/// Cumulative prefixes of `path`, parent first. A leading `/` is preserved.
#[must_use]
pub fn segment_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if absolute || !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            current.clone()
        })
        .collect()
}
