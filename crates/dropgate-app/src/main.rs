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

//! Binary entrypoint that polls every configured drop folder until Ctrl-C.

use dropgate_app::run_app;

/// Bootstraps the service and blocks until shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_app().await?;
    Ok(())
}
