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

//! Drop-folder service bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `orchestrator.rs` (per-tenant poll
//! workers), `error.rs`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application error types.
pub mod error;
/// Per-tenant poll scheduling.
pub mod orchestrator;

pub use bootstrap::{LOG_FORMAT_ENV, run_app, run_app_with};
pub use error::{AppError, AppResult};
pub use orchestrator::TenantScheduler;
