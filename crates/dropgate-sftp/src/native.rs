//! ssh2-backed session adapter.
//!
//! libssh2 calls block, so every operation runs on the blocking pool while the
//! session handle sits behind a mutex shared with those tasks.

use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};
use tracing::debug;

use crate::error::{SftpError, SftpResult};
use crate::session::{Connector, Credentials, RemoteEntry, RemoteSession, RemoteStat, SessionOptions};

const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

/// Opens sessions over TCP using libssh2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

#[async_trait]
impl Connector for Ssh2Connector {
    async fn connect(
        &self,
        credentials: &Credentials,
        options: &SessionOptions,
    ) -> SftpResult<Arc<dyn RemoteSession>> {
        let credentials = credentials.clone();
        let options = *options;
        let session = tokio::task::spawn_blocking(move || open(&credentials, &options))
            .await
            .map_err(|source| SftpError::Join {
                operation: "session.connect",
                source,
            })??;
        Ok(Arc::new(session))
    }
}

struct Connection {
    session: Session,
    sftp: Sftp,
}

/// Live ssh2 session with its SFTP channel.
pub struct Ssh2Session {
    inner: Arc<Mutex<Option<Connection>>>,
}

fn open(credentials: &Credentials, options: &SessionOptions) -> SftpResult<Ssh2Session> {
    let failed = |detail: String| SftpError::Connection {
        host: credentials.host.clone(),
        port: credentials.port,
        detail,
    };

    let tcp = connect_tcp(&credentials.host, credentials.port, options.timeout)
        .map_err(|err| failed(err.to_string()))?;
    let mut session = Session::new().map_err(|err| failed(err.to_string()))?;
    session.set_timeout(millis(options.timeout));
    session.set_compress(false);
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|err| failed(err.to_string()))?;
    session
        .userauth_password(&credentials.user, &credentials.password)
        .map_err(|err| failed(err.to_string()))?;
    if !session.authenticated() {
        return Err(failed("authentication rejected".to_string()));
    }
    session.set_keepalive(
        true,
        u32::try_from(options.keepalive_interval.as_secs()).unwrap_or(u32::MAX),
    );
    let sftp = session.sftp().map_err(|err| failed(err.to_string()))?;

    debug!(host = %credentials.host, port = credentials.port, "ssh session established");
    Ok(Ssh2Session {
        inner: Arc::new(Mutex::new(Some(Connection { session, sftp }))),
    })
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last = Some(err),
        }
    }
    Err(last.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

impl Ssh2Session {
    async fn run<T, F>(&self, operation: &'static str, task: F) -> SftpResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> SftpResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner.lock().map_err(|_| SftpError::Transport {
                operation,
                detail: "session lock poisoned".to_string(),
            })?;
            let connection = guard.as_ref().ok_or_else(|| SftpError::Transport {
                operation,
                detail: "session closed".to_string(),
            })?;
            task(connection)
        })
        .await
        .map_err(|source| SftpError::Join { operation, source })?
    }
}

fn classify(operation: &'static str, path: &str, err: &ssh2::Error, probe: bool) -> SftpError {
    match err.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE | SFTP_NO_SUCH_PATH) => SftpError::NotFound {
            operation,
            path: path.to_string(),
        },
        ErrorCode::SFTP(_) if probe => SftpError::Probe {
            operation,
            path: path.to_string(),
            detail: err.message().to_string(),
        },
        ErrorCode::SFTP(_) => SftpError::Remote {
            operation,
            path: path.to_string(),
            detail: err.message().to_string(),
        },
        ErrorCode::Session(_) => SftpError::Transport {
            operation,
            detail: err.message().to_string(),
        },
    }
}

fn stat_of(stat: &ssh2::FileStat) -> RemoteStat {
    RemoteStat {
        size: stat.size.unwrap_or(0),
        is_dir: stat.is_dir(),
    }
}

fn entry_name(path: &Path) -> Option<String> {
    let name = path.to_str()?.rsplit('/').next()?;
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

#[async_trait]
impl RemoteSession for Ssh2Session {
    async fn stat(&self, path: &str) -> SftpResult<RemoteStat> {
        let path = path.to_string();
        self.run("sftp.stat", move |conn| {
            conn.sftp
                .stat(Path::new(&path))
                .map(|stat| stat_of(&stat))
                .map_err(|err| classify("sftp.stat", &path, &err, true))
        })
        .await
    }

    async fn mkdir(&self, path: &str, mode: i32) -> SftpResult<()> {
        let path = path.to_string();
        self.run("sftp.mkdir", move |conn| {
            conn.sftp
                .mkdir(Path::new(&path), mode)
                .map_err(|err| classify("sftp.mkdir", &path, &err, false))
        })
        .await
    }

    async fn list_dir(&self, path: &str) -> SftpResult<Vec<RemoteEntry>> {
        let path = path.to_string();
        self.run("sftp.readdir", move |conn| {
            let entries = conn
                .sftp
                .readdir(Path::new(&path))
                .map_err(|err| classify("sftp.readdir", &path, &err, true))?;
            Ok(entries
                .into_iter()
                .filter_map(|(entry, stat)| {
                    entry_name(&entry).map(|filename| RemoteEntry {
                        filename,
                        stat: stat_of(&stat),
                    })
                })
                .collect())
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> SftpResult<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.run("sftp.rename", move |conn| {
            conn.sftp
                .rename(Path::new(&from), Path::new(&to), None)
                .map_err(|err| classify("sftp.rename", &from, &err, false))
        })
        .await
    }

    async fn remove(&self, path: &str) -> SftpResult<()> {
        let path = path.to_string();
        self.run("sftp.unlink", move |conn| {
            conn.sftp
                .unlink(Path::new(&path))
                .map_err(|err| classify("sftp.unlink", &path, &err, false))
        })
        .await
    }

    async fn get(&self, remote: &str, local: &Path) -> SftpResult<u64> {
        let remote = remote.to_string();
        let local: PathBuf = local.to_path_buf();
        self.run("sftp.get", move |conn| {
            let mut source = conn
                .sftp
                .open(Path::new(&remote))
                .map_err(|err| classify("sftp.get", &remote, &err, false))?;
            let mut target = File::create(&local).map_err(|source| SftpError::LocalIo {
                operation: "sftp.get.create",
                path: local.clone(),
                source,
            })?;
            io::copy(&mut source, &mut target).map_err(|err| SftpError::Remote {
                operation: "sftp.get",
                path: remote.clone(),
                detail: err.to_string(),
            })
        })
        .await
    }

    async fn put(&self, local: &Path, remote: &str) -> SftpResult<u64> {
        let remote = remote.to_string();
        let local: PathBuf = local.to_path_buf();
        self.run("sftp.put", move |conn| {
            let mut source = File::open(&local).map_err(|source| SftpError::LocalIo {
                operation: "sftp.put.open",
                path: local.clone(),
                source,
            })?;
            let mut target = conn
                .sftp
                .create(Path::new(&remote))
                .map_err(|err| classify("sftp.put", &remote, &err, false))?;
            io::copy(&mut source, &mut target).map_err(|err| SftpError::Remote {
                operation: "sftp.put",
                path: remote.clone(),
                detail: err.to_string(),
            })
        })
        .await
    }

    async fn is_alive(&self) -> bool {
        self.run("session.keepalive", |conn| {
            conn.session
                .keepalive_send()
                .map(|_| ())
                .map_err(|err| SftpError::Transport {
                    operation: "session.keepalive",
                    detail: err.message().to_string(),
                })
        })
        .await
        .is_ok()
    }

    async fn close(&self) {
        let inner = Arc::clone(&self.inner);
        let closed = tokio::task::spawn_blocking(move || {
            let taken = inner.lock().ok().and_then(|mut guard| guard.take());
            if let Some(connection) = taken {
                drop(connection.sftp);
                let _ = connection
                    .session
                    .disconnect(None, "closing session", None);
            }
        })
        .await;
        if let Err(err) = closed {
            debug!(error = %err, "session close task failed");
        }
    }
}
