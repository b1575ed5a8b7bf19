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

//! Explicit configuration for the drop-folder ingestion pipeline.
//!
//! Layout: `model.rs` (tenant, pipeline and service models), `defaults.rs`
//! (design constants), `validate.rs` (fail-fast checks), `loader.rs`
//! (environment and tenant file loading).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{parse_tenants, read_tenants_file};
pub use model::{DeliveryPolicy, PipelineConfig, ServiceConfig, TenantConfig};
