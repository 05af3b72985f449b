//! Pooled columnar event batches.
//!
//! A batch stores events as parallel columns. Punctuation and low-watermark
//! rows use the sentinel encoding from [`crate::model::event`]: a punctuation
//! row carries its partition key, a low-watermark row carries none.

use crate::model::event::PUNCTUATION_OTHER_TIME;

/// Columnar batch of ordered events handed to the downstream observer.
///
/// Unpartitioned pipes instantiate this with `K = ()` and never populate the
/// key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch<K, P> {
    sync_times: Vec<i64>,
    other_times: Vec<i64>,
    keys: Vec<Option<K>>,
    payloads: Vec<Option<P>>,
    capacity: usize,
    sealed: bool,
}

impl<K, P> EventBatch<K, P> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sync_times: Vec::with_capacity(capacity),
            other_times: Vec::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            payloads: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        }
    }

    /// Append a data row. Returns `true` when this append filled the batch.
    pub fn add(&mut self, sync_time: i64, other_time: i64, key: Option<K>, payload: P) -> bool {
        debug_assert!(!self.sealed, "append to a sealed batch");
        self.sync_times.push(sync_time);
        self.other_times.push(other_time);
        self.keys.push(key);
        self.payloads.push(Some(payload));
        self.len() >= self.capacity
    }

    /// Append a punctuation row scoped to `key` (or globally when `None`).
    pub fn add_punctuation(&mut self, key: Option<K>, time: i64) -> bool {
        debug_assert!(!self.sealed, "append to a sealed batch");
        self.sync_times.push(time);
        self.other_times.push(PUNCTUATION_OTHER_TIME);
        self.keys.push(key);
        self.payloads.push(None);
        self.len() >= self.capacity
    }

    /// Append a low-watermark row bounding every partition.
    pub fn add_low_watermark(&mut self, time: i64) -> bool {
        self.add_punctuation(None, time)
    }

    /// Freeze the batch before handing it downstream.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.sync_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sync_times.is_empty()
    }

    pub fn sync_times(&self) -> &[i64] {
        &self.sync_times
    }

    pub fn other_times(&self) -> &[i64] {
        &self.other_times
    }

    pub fn keys(&self) -> &[Option<K>] {
        &self.keys
    }

    pub fn payloads(&self) -> &[Option<P>] {
        &self.payloads
    }

    /// Whether the row at `index` is a punctuation or low-watermark marker.
    pub fn is_marker(&self, index: usize) -> bool {
        self.payloads[index].is_none() && self.other_times[index] == PUNCTUATION_OTHER_TIME
    }

    /// Wipe all rows so the batch can be reused by its pool.
    pub(crate) fn reset(&mut self) {
        self.sync_times.clear();
        self.other_times.clear();
        self.keys.clear();
        self.payloads.clear();
        self.sealed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_reports_fill_at_capacity() {
        let mut batch: EventBatch<(), u64> = EventBatch::with_capacity(2);
        assert!(!batch.add(1, 10, None, 7));
        assert!(batch.add(2, 20, None, 8));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn marker_rows_use_sentinel_encoding() {
        let mut batch: EventBatch<u32, u64> = EventBatch::with_capacity(8);
        batch.add(5, 9, Some(1), 42);
        batch.add_punctuation(Some(1), 6);
        batch.add_low_watermark(7);
        assert!(!batch.is_marker(0));
        assert!(batch.is_marker(1));
        assert!(batch.is_marker(2));
        assert_eq!(batch.keys()[1], Some(1));
        assert_eq!(batch.keys()[2], None);
    }

    #[test]
    fn reset_clears_rows_and_seal() {
        let mut batch: EventBatch<(), u64> = EventBatch::with_capacity(4);
        batch.add(1, 2, None, 3);
        batch.seal();
        batch.reset();
        assert!(batch.is_empty());
        assert!(!batch.is_sealed());
    }
}
