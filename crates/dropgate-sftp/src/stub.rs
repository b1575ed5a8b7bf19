//! In-memory remote used by tests.
//!
//! `MemoryRemote` is both the shared remote filesystem and the `Connector`
//! handing out sessions onto it. Scripted faults (growing files, failing
//! renames, dropped transports, refused connections) are set on the remote and
//! observed by every session.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{SftpError, SftpResult};
use crate::session::{Connector, Credentials, RemoteEntry, RemoteSession, RemoteStat, SessionOptions};

#[derive(Default)]
struct MemoryFile {
    contents: Vec<u8>,
    growth: u64,
}

#[derive(Default)]
struct RemoteState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, MemoryFile>,
    failing_renames: HashSet<String>,
    transport_kills: HashSet<String>,
    failing_probes: HashSet<String>,
    refuse_connections: bool,
    epoch: u64,
    connects: usize,
    created_dirs: Vec<String>,
}

impl RemoteState {
    fn dir_exists(&self, path: &str) -> bool {
        path.is_empty() || path == "/" || self.dirs.contains(path)
    }

    fn parent_exists(&self, path: &str) -> bool {
        parent_of(path).is_none_or(|parent| self.dirs.contains(parent))
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) | None => None,
        Some((parent, _)) => Some(parent),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Shared in-memory remote filesystem and session factory.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    /// Create an empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `path` and every missing parent without recording them as created.
    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let absolute = path.starts_with('/');
        let mut state = self.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            if absolute || !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            state.dirs.insert(current.clone());
        }
    }

    /// Place a stable file at `path`, creating parent directories.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.add_growing_file(path, contents, 0);
    }

    /// Place a file whose size grows by `growth` bytes on every status probe.
    pub fn add_growing_file(&self, path: &str, contents: &[u8], growth: u64) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(parent);
        }
        self.lock().files.insert(
            path,
            MemoryFile {
                contents: contents.to_vec(),
                growth,
            },
        );
    }

    /// Make renames of `source` fail with a server rejection.
    pub fn fail_rename(&self, source: &str) {
        self.lock().failing_renames.insert(normalize(source));
    }

    /// Make renames of `source` drop every open session.
    pub fn drop_transport_on_rename(&self, source: &str) {
        self.lock().transport_kills.insert(normalize(source));
    }

    /// Make status probes of `path` fail with a non-absence error.
    pub fn fail_probe(&self, path: &str) {
        self.lock().failing_probes.insert(normalize(path));
    }

    /// Refuse or accept new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Invalidate every session handed out so far.
    pub fn kill_sessions(&self) {
        self.lock().epoch += 1;
    }

    /// Number of successful connections made.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Whether a file exists at `path`.
    #[must_use]
    pub fn has_file(&self, path: &str) -> bool {
        self.lock().files.contains_key(&normalize(path))
    }

    /// Whether a directory exists at `path`.
    #[must_use]
    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(&normalize(path))
    }

    /// Contents of the file at `path`.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .files
            .get(&normalize(path))
            .map(|file| file.contents.clone())
    }

    /// Sorted names of files directly inside `dir`.
    #[must_use]
    pub fn file_names(&self, dir: &str) -> Vec<String> {
        let dir = normalize(dir);
        self.lock()
            .files
            .keys()
            .filter(|path| parent_of(path) == Some(dir.as_str()))
            .map(|path| name_of(path).to_string())
            .collect()
    }

    /// Directories created through sessions, in creation order.
    #[must_use]
    pub fn created_dirs(&self) -> Vec<String> {
        self.lock().created_dirs.clone()
    }
}

#[async_trait]
impl Connector for MemoryRemote {
    async fn connect(
        &self,
        credentials: &Credentials,
        _options: &SessionOptions,
    ) -> SftpResult<Arc<dyn RemoteSession>> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(SftpError::Connection {
                host: credentials.host.clone(),
                port: credentials.port,
                detail: "connection refused".to_string(),
            });
        }
        state.connects += 1;
        Ok(Arc::new(MemorySession {
            remote: self.clone(),
            epoch: state.epoch,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session onto a [`MemoryRemote`].
pub struct MemorySession {
    remote: MemoryRemote,
    epoch: u64,
    closed: AtomicBool,
}

impl MemorySession {
    fn open(&self, operation: &'static str) -> SftpResult<MutexGuard<'_, RemoteState>> {
        let state = self.remote.lock();
        if self.closed.load(Ordering::SeqCst) || state.epoch != self.epoch {
            return Err(SftpError::Transport {
                operation,
                detail: "session is not connected".to_string(),
            });
        }
        Ok(state)
    }
}

fn not_found(operation: &'static str, path: &str) -> SftpError {
    SftpError::NotFound {
        operation,
        path: path.to_string(),
    }
}

fn rejected(operation: &'static str, path: &str, detail: &str) -> SftpError {
    SftpError::Remote {
        operation,
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn stat(&self, path: &str) -> SftpResult<RemoteStat> {
        let path = normalize(path);
        let mut state = self.open("sftp.stat")?;
        if state.failing_probes.contains(&path) {
            return Err(SftpError::Probe {
                operation: "sftp.stat",
                path,
                detail: "permission denied".to_string(),
            });
        }
        if state.dir_exists(&path) {
            return Ok(RemoteStat {
                size: 0,
                is_dir: true,
            });
        }
        let file = state
            .files
            .get_mut(&path)
            .ok_or_else(|| not_found("sftp.stat", &path))?;
        let size = file.contents.len() as u64;
        if file.growth > 0 {
            let grown = file.contents.len() + usize::try_from(file.growth).unwrap_or(0);
            file.contents.resize(grown, 0);
        }
        Ok(RemoteStat {
            size,
            is_dir: false,
        })
    }

    async fn mkdir(&self, path: &str, _mode: i32) -> SftpResult<()> {
        let path = normalize(path);
        let mut state = self.open("sftp.mkdir")?;
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(rejected("sftp.mkdir", &path, "file already exists"));
        }
        if !state.parent_exists(&path) {
            return Err(not_found("sftp.mkdir", &path));
        }
        state.dirs.insert(path.clone());
        state.created_dirs.push(path);
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> SftpResult<Vec<RemoteEntry>> {
        let path = normalize(path);
        let state = self.open("sftp.readdir")?;
        if !state.dirs.contains(&path) {
            return Err(not_found("sftp.readdir", &path));
        }
        let dirs = state
            .dirs
            .iter()
            .filter(|dir| parent_of(dir) == Some(path.as_str()))
            .map(|dir| RemoteEntry {
                filename: name_of(dir).to_string(),
                stat: RemoteStat {
                    size: 0,
                    is_dir: true,
                },
            });
        let files = state
            .files
            .iter()
            .filter(|(file, _)| parent_of(file) == Some(path.as_str()))
            .map(|(file, contents)| RemoteEntry {
                filename: name_of(file).to_string(),
                stat: RemoteStat {
                    size: contents.contents.len() as u64,
                    is_dir: false,
                },
            });
        Ok(dirs.chain(files).collect())
    }

    async fn rename(&self, from: &str, to: &str) -> SftpResult<()> {
        let (from, to) = (normalize(from), normalize(to));
        let mut state = self.open("sftp.rename")?;
        if state.transport_kills.contains(&from) {
            state.epoch += 1;
            return Err(SftpError::Transport {
                operation: "sftp.rename",
                detail: "connection reset by peer".to_string(),
            });
        }
        if state.failing_renames.contains(&from) {
            return Err(rejected("sftp.rename", &from, "permission denied"));
        }
        if !state.files.contains_key(&from) {
            return Err(not_found("sftp.rename", &from));
        }
        if state.files.contains_key(&to) || state.dirs.contains(&to) {
            return Err(rejected("sftp.rename", &from, "destination exists"));
        }
        if !state.parent_exists(&to) {
            return Err(not_found("sftp.rename", &to));
        }
        if let Some(file) = state.files.remove(&from) {
            state.files.insert(to, file);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> SftpResult<()> {
        let path = normalize(path);
        let mut state = self.open("sftp.unlink")?;
        state
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| not_found("sftp.unlink", &path))
    }

    async fn get(&self, remote: &str, local: &Path) -> SftpResult<u64> {
        let remote = normalize(remote);
        let contents = {
            let state = self.open("sftp.get")?;
            state
                .files
                .get(&remote)
                .map(|file| file.contents.clone())
                .ok_or_else(|| not_found("sftp.get", &remote))?
        };
        std::fs::write(local, &contents).map_err(|source| SftpError::LocalIo {
            operation: "sftp.get.write",
            path: local.to_path_buf(),
            source,
        })?;
        Ok(contents.len() as u64)
    }

    async fn put(&self, local: &Path, remote: &str) -> SftpResult<u64> {
        let remote = normalize(remote);
        let contents = std::fs::read(local).map_err(|source| SftpError::LocalIo {
            operation: "sftp.put.read",
            path: local.to_path_buf(),
            source,
        })?;
        let mut state = self.open("sftp.put")?;
        if !state.parent_exists(&remote) {
            return Err(not_found("sftp.put", &remote));
        }
        let written = contents.len() as u64;
        state.files.insert(
            remote,
            MemoryFile {
                contents,
                growth: 0,
            },
        );
        Ok(written)
    }

    async fn is_alive(&self) -> bool {
        self.open("session.keepalive").is_ok()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            host: "memory".to_string(),
            port: 22,
            user: "tester".to_string(),
            password: String::new(),
        }
    }

    #[tokio::test]
    async fn growing_file_reports_new_size_per_probe() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_growing_file("/drop/input/a.pdf", b"abc", 2);
        let session = remote.connect(&credentials(), &SessionOptions::default()).await?;

        assert_eq!(session.stat("/drop/input/a.pdf").await?.size, 3);
        assert_eq!(session.stat("/drop/input/a.pdf").await?.size, 5);
        Ok(())
    }

    #[tokio::test]
    async fn mkdir_requires_existing_parent() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        let session = remote.connect(&credentials(), &SessionOptions::default()).await?;

        assert!(session.mkdir("/a/b", 0o755).await.is_err());
        session.mkdir("/a", 0o755).await?;
        session.mkdir("/a/b", 0o755).await?;
        assert_eq!(remote.created_dirs(), vec!["/a".to_string(), "/a/b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn relative_paths_resolve_from_the_login_directory() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("drops/acme/input/a.pdf", b"x");
        let session = remote.connect(&credentials(), &SessionOptions::default()).await?;

        assert!(remote.has_dir("drops/acme/input"));
        let entries = session.list_dir("drops/acme/input").await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "a.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn killed_sessions_report_transport_errors() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_dir("/drop");
        let session = remote.connect(&credentials(), &SessionOptions::default()).await?;
        assert!(session.is_alive().await);

        remote.kill_sessions();
        assert!(!session.is_alive().await);
        let err = session.list_dir("/drop").await;
        assert!(matches!(err, Err(SftpError::Transport { .. })));

        let fresh = remote.connect(&credentials(), &SessionOptions::default()).await?;
        assert!(fresh.is_alive().await);
        assert_eq!(remote.connect_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn rename_refuses_existing_destination() -> anyhow::Result<()> {
        let remote = MemoryRemote::new();
        remote.add_file("/in/a.pdf", b"new");
        remote.add_file("/out/a.pdf", b"old");
        let session = remote.connect(&credentials(), &SessionOptions::default()).await?;

        let err = session.rename("/in/a.pdf", "/out/a.pdf").await;
        assert!(matches!(err, Err(SftpError::Remote { .. })));
        Ok(())
    }
}
