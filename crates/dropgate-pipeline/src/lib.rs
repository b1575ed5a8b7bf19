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

//! Poll-cycle orchestration for the drop-folder pipeline.
//!
//! Layout: `cycle.rs` (one pass over a tenant's input directory), `batch.rs`
//! (fixed-capacity batching), `delivery.rs` (seam onto the delivery client).

pub mod batch;
pub mod cycle;
pub mod delivery;

pub use batch::BatchAccumulator;
pub use cycle::{BACKUP_DATE_FORMAT, CycleLayout, CycleOutcome, CycleReport, CycleStage, PollCycle};
pub use delivery::BatchDelivery;
