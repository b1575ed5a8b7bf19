//! Fixed-capacity batching of claimed files.

use std::future::Future;
use std::mem;

use dropgate_sftp::FileRecord;

/// Buffers claimed files until a batch is full or the listing ends.
///
/// Every record is handed to exactly one delivery, and an empty batch is never
/// delivered.
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    records: Vec<FileRecord>,
}

impl BatchAccumulator {
    /// Build an accumulator that flushes at `capacity` records (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Append a claimed file.
    pub fn add(&mut self, record: FileRecord) {
        self.records.push(record);
    }

    /// Records currently buffered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the buffer has reached capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Deliver and clear the buffer if it has reached capacity.
    ///
    /// Returns the delivery outcome, or `None` when nothing was delivered.
    pub async fn flush_if_full<F, Fut>(&mut self, deliver: F) -> Option<bool>
    where
        F: FnOnce(Vec<FileRecord>) -> Fut,
        Fut: Future<Output = bool>,
    {
        if !self.is_full() {
            return None;
        }
        Some(deliver(self.take()).await)
    }

    /// Deliver and clear whatever is buffered.
    ///
    /// Returns the delivery outcome, or `None` when the buffer was empty.
    pub async fn flush_remainder<F, Fut>(&mut self, deliver: F) -> Option<bool>
    where
        F: FnOnce(Vec<FileRecord>) -> Fut,
        Fut: Future<Output = bool>,
    {
        if self.is_empty() {
            return None;
        }
        Some(deliver(self.take()).await)
    }

    fn take(&mut self) -> Vec<FileRecord> {
        mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }
}
