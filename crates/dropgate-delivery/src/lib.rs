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

//! Signed batch delivery to the downstream processing API.
//!
//! Layout: `envelope.rs` (request body and signed payload), `signing.rs`
//! (HMAC-SHA256), `client.rs` (HTTP client with bounded retry), `error.rs`.

pub mod client;
pub mod envelope;
pub mod error;
pub mod signing;

pub use client::{
    DeliveryClient, DeliveryReceipt, HEADER_PROJECT_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
pub use envelope::{BatchItem, DeliveryEnvelope, SignedPayload};
pub use error::{DeliveryError, DeliveryResult};
pub use signing::{hmac_sha256_hex, sign};
