#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Remote file-transfer layer for the drop-folder pipeline.
//!
//! Layout: `session.rs` (session and connector seams), `native.rs` (ssh2
//! adapter), `stub.rs` (in-memory remote for tests), `pool.rs` (per-tenant
//! session cache), `bootstrap.rs`, `readiness.rs`, `claim.rs` (pipeline steps),
//! `transfer.rs` (one-off uploads and downloads), `error.rs`.

pub mod bootstrap;
pub mod claim;
pub mod error;
pub mod native;
pub mod pool;
pub mod readiness;
pub mod session;
#[cfg(any(test, feature = "stub"))]
pub mod stub;
pub mod transfer;

pub use bootstrap::DirectoryBootstrapper;
pub use claim::{ClaimStore, FileRecord, remote_join};
pub use error::{SftpError, SftpResult};
pub use native::Ssh2Connector;
pub use pool::SessionPool;
pub use readiness::ReadinessDetector;
pub use session::{Connector, Credentials, Probe, RemoteEntry, RemoteSession, RemoteStat, SessionOptions};
#[cfg(any(test, feature = "stub"))]
pub use stub::MemoryRemote;
pub use transfer::RemoteFiles;
