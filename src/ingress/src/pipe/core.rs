//! Batching and punctuation bookkeeping shared by every pipe kind.
//!
//! The pipes differ in how they order events; once ordered, everything funnels
//! through [`BatchingCore`] (pooled batch assembly, flush policy) and a
//! [`PunctuationTracker`] (cadence, quantization, monotonic advance). The
//! partitioned pipe keeps one tracker per partition.

use crate::error::IngressError;
use crate::model::{BatchPool, EventBatch, MIN_SYNC_TIME};
use crate::observer::IngressObserver;
use crate::policy::{FlushPolicy, PunctuationPolicy};

/// Left-align `time` to a `period` boundary.
pub(crate) fn snap_to_left_boundary(time: i64, period: i64) -> i64 {
    if period <= 1 {
        return time;
    }
    time.div_euclid(period) * period
}

/// Tracks when a synthesized punctuation is due and never lets the
/// punctuation time regress.
#[derive(Debug, Clone)]
pub(crate) struct PunctuationTracker {
    policy: PunctuationPolicy,
    last_time: i64,
    events_since: u64,
}

impl PunctuationTracker {
    pub(crate) fn new(policy: PunctuationPolicy) -> Self {
        Self {
            policy,
            last_time: MIN_SYNC_TIME,
            events_since: 0,
        }
    }

    /// A tracker whose floor starts at an already-established boundary
    /// (partitions discovered after the low watermark advanced).
    pub(crate) fn with_floor(policy: PunctuationPolicy, floor: i64) -> Self {
        let mut tracker = Self::new(policy);
        tracker.last_time = floor;
        tracker
    }

    /// Boundary punctuation due before appending a data event at `sync_time`.
    pub(crate) fn before_append(&mut self, sync_time: i64) -> Option<i64> {
        match self.policy {
            PunctuationPolicy::Time { period } => {
                let boundary = snap_to_left_boundary(sync_time, period);
                if boundary > self.last_time {
                    self.last_time = boundary;
                    Some(boundary)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Count-based punctuation due after appending a data event at
    /// `sync_time`. At most one punctuation is generated per distinct time.
    pub(crate) fn after_append(&mut self, sync_time: i64) -> Option<i64> {
        match self.policy {
            PunctuationPolicy::Count { n } => {
                self.events_since += 1;
                if self.events_since < n {
                    return None;
                }
                self.events_since = 0;
                if sync_time > self.last_time {
                    self.last_time = sync_time;
                    Some(sync_time)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Fold an explicit punctuation into the bookkeeping: the quantized time
    /// advances the floor used to suppress later boundary punctuations.
    /// Returns the floor after the advance.
    pub(crate) fn note_external(&mut self, time: i64) -> i64 {
        let quantized = match self.policy {
            PunctuationPolicy::Time { period } => snap_to_left_boundary(time, period),
            _ => time,
        };
        if quantized > self.last_time {
            self.last_time = quantized;
        }
        self.last_time
    }

    pub(crate) fn last_time(&self) -> i64 {
        self.last_time
    }
}

/// Pooled batch assembly plus the downstream observer handle.
pub(crate) struct BatchingCore<K, P> {
    pool: BatchPool<K, P>,
    batch: Option<EventBatch<K, P>>,
    flush_policy: FlushPolicy,
    observer: Box<dyn IngressObserver<K, P>>,
}

impl<K, P> BatchingCore<K, P> {
    pub(crate) fn new(
        batch_size: usize,
        flush_policy: FlushPolicy,
        observer: Box<dyn IngressObserver<K, P>>,
    ) -> Self {
        let mut pool = BatchPool::new(batch_size);
        let batch = Some(pool.acquire());
        Self {
            pool,
            batch,
            flush_policy,
            observer,
        }
    }

    fn batch_mut(&mut self) -> &mut EventBatch<K, P> {
        self.batch.as_mut().expect("batch present until disposal")
    }

    /// Append one ordered data row; flushes when the batch fills.
    pub(crate) fn append_data(&mut self, sync_time: i64, other_time: i64, key: Option<K>, payload: P) {
        if self.batch_mut().add(sync_time, other_time, key, payload) {
            self.flush_contents();
        }
    }

    /// Append a punctuation row and apply the flush policy.
    pub(crate) fn append_punctuation(&mut self, key: Option<K>, time: i64) {
        let filled = self.batch_mut().add_punctuation(key, time);
        if filled || self.flush_policy == FlushPolicy::OnPunctuation {
            self.flush_contents();
        }
    }

    /// Append a low-watermark row and apply the flush policy.
    pub(crate) fn append_low_watermark(&mut self, time: i64) {
        let filled = self.batch_mut().add_low_watermark(time);
        if filled || self.flush_policy == FlushPolicy::OnLowWatermark {
            self.flush_contents();
        }
    }

    /// Seal the current batch (if non-empty) and hand it downstream.
    pub(crate) fn flush_contents(&mut self) {
        if self.batch_mut().is_empty() {
            return;
        }
        let mut sealed = self
            .batch
            .replace(self.pool.acquire())
            .expect("batch present until disposal");
        sealed.seal();
        self.pool.transfer();
        self.observer.on_batch(sealed);
    }

    /// Explicit flush request: seal and propagate the flush signal.
    pub(crate) fn signal_flush(&mut self) {
        self.flush_contents();
        self.observer.on_flush();
    }

    pub(crate) fn complete(&mut self) {
        self.observer.on_completed();
    }

    pub(crate) fn error(&mut self, error: IngressError) {
        self.observer.on_error(error);
    }

    /// Release the working batch back to its pool.
    pub(crate) fn dispose(&mut self) {
        if let Some(batch) = self.batch.take() {
            self.pool.release(batch);
        }
    }

    pub(crate) fn pooled_leases(&self) -> usize {
        self.pool.leased()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::CollectingObserver;

    #[test]
    fn snap_left_handles_negative_times() {
        assert_eq!(snap_to_left_boundary(250, 100), 200);
        assert_eq!(snap_to_left_boundary(-1, 100), -100);
        assert_eq!(snap_to_left_boundary(0, 100), 0);
        assert_eq!(snap_to_left_boundary(7, 1), 7);
    }

    #[test]
    fn time_tracker_fires_once_per_boundary() {
        let mut tracker = PunctuationTracker::new(PunctuationPolicy::Time { period: 100 });
        assert_eq!(tracker.before_append(50), Some(0));
        assert_eq!(tracker.before_append(70), None);
        assert_eq!(tracker.before_append(140), Some(100));
        assert_eq!(tracker.before_append(260), Some(200));
        assert_eq!(tracker.last_time(), 200);
    }

    #[test]
    fn count_tracker_fires_every_n_events() {
        let mut tracker = PunctuationTracker::new(PunctuationPolicy::Count { n: 2 });
        assert_eq!(tracker.after_append(10), None);
        assert_eq!(tracker.after_append(11), Some(11));
        assert_eq!(tracker.after_append(11), None);
        // Second punctuation at the same time is suppressed.
        assert_eq!(tracker.after_append(11), None);
        assert_eq!(tracker.after_append(12), None);
        assert_eq!(tracker.after_append(13), Some(13));
    }

    #[test]
    fn external_punctuation_never_regresses() {
        let mut tracker = PunctuationTracker::new(PunctuationPolicy::Time { period: 10 });
        assert_eq!(tracker.note_external(25), 20);
        assert_eq!(tracker.note_external(12), 20);
        assert_eq!(tracker.note_external(41), 40);
    }

    #[test]
    fn core_flushes_on_fill_and_releases_on_dispose() {
        let observer = CollectingObserver::<(), u64>::new();
        let collected = observer.handle();
        let mut core = BatchingCore::new(2, FlushPolicy::OnBatchBoundary, Box::new(observer));
        core.append_data(1, 2, None, 10);
        core.append_data(2, 3, None, 11);
        core.append_data(3, 4, None, 12);
        core.dispose();
        let collected = collected.lock().unwrap();
        assert_eq!(collected.batches.len(), 1);
        assert!(collected.batches[0].is_sealed());
        assert_eq!(collected.batches[0].len(), 2);
        assert_eq!(core.pooled_leases(), 0);
    }
}
