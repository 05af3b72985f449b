//! Partitioned ingress state machine.
//!
//! Current time, punctuation and watermark bookkeeping become per-partition
//! maps, and a global low watermark bounds every partition jointly. The
//! inverted index from high watermark to partition keys makes the minimum
//! high watermark available without scanning all partitions on every event:
//! only the partition whose watermark moved has its index entry relocated.

use crate::diagnostics::{DiagnosticSink, OutOfOrderEvent};
use crate::error::IngressError;
use crate::model::{
    EventKind, PartitionTarget, PartitionedStreamEvent, StreamEvent, INFINITY_SYNC_TIME,
    MIN_SYNC_TIME,
};
use crate::observer::IngressObserver;
use crate::pipe::core::{snap_to_left_boundary, BatchingCore, PunctuationTracker};
use crate::pipe::{AdjustInfo, PipeState};
use crate::policy::{
    DisorderPolicy, IngressConfig, LowWatermarkPolicy, OnCompletedPolicy, PunctuationPolicy,
};
use crate::sorter::PartitionedReorderBuffer;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

/// Raw low watermark plus its two quantized projections: one on the
/// low-watermark generation cadence, one on the punctuation cadence.
#[derive(Debug, Clone, Copy)]
struct LowWatermarkState {
    raw: i64,
    quantized_generation: i64,
    quantized_punctuation: i64,
}

pub struct PartitionedIngressPipe<K, P>
where
    K: Hash + Eq + Clone + Send + 'static,
    P: Clone + Eq + Hash + Send + 'static,
{
    disorder: DisorderPolicy,
    reorder_latency: i64,
    on_completed_policy: OnCompletedPolicy,
    punctuation_policy: PunctuationPolicy,
    low_watermark_policy: LowWatermarkPolicy,
    core: BatchingCore<K, P>,
    sorter: PartitionedReorderBuffer<K, StreamEvent<P>>,
    diagnostics: Box<dyn DiagnosticSink<PartitionedStreamEvent<K, P>> + Send>,
    current_times: HashMap<K, i64>,
    trackers: HashMap<K, PunctuationTracker>,
    high_watermarks: HashMap<K, i64>,
    /// Inverted index: which partitions sit at which high watermark, sorted,
    /// so the global minimum is the first entry.
    watermark_index: BTreeMap<i64, HashSet<K>>,
    low_watermark: LowWatermarkState,
    adjust_table: HashMap<(K, i64, P), AdjustInfo>,
    drained: Vec<StreamEvent<P>>,
    state: PipeState,
}

impl<K, P> PartitionedIngressPipe<K, P>
where
    K: Hash + Eq + Clone + Send + 'static,
    P: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(
        config: IngressConfig,
        observer: Box<dyn IngressObserver<K, P>>,
        diagnostics: Box<dyn DiagnosticSink<PartitionedStreamEvent<K, P>> + Send>,
    ) -> Result<Self, IngressError> {
        config.validate()?;
        Ok(Self {
            disorder: config.disorder,
            reorder_latency: config.disorder.reorder_latency(),
            on_completed_policy: config.on_completed,
            punctuation_policy: config.punctuation,
            low_watermark_policy: config.low_watermark,
            core: BatchingCore::new(config.batch_size, config.flush, observer),
            sorter: PartitionedReorderBuffer::new(config.sort_technique),
            diagnostics,
            current_times: HashMap::new(),
            trackers: HashMap::new(),
            high_watermarks: HashMap::new(),
            watermark_index: BTreeMap::new(),
            low_watermark: LowWatermarkState {
                raw: MIN_SYNC_TIME,
                quantized_generation: MIN_SYNC_TIME,
                quantized_punctuation: MIN_SYNC_TIME,
            },
            adjust_table: HashMap::new(),
            drained: Vec::new(),
            state: PipeState::Created,
        })
    }

    pub fn enable(&mut self) -> Result<(), IngressError> {
        match self.state {
            PipeState::Created => {
                self.state = PipeState::Enabled;
                Ok(())
            }
            PipeState::Enabled => Err(IngressError::AlreadyEnabled),
            PipeState::Completed | PipeState::Disposed => Err(IngressError::Disposed),
        }
    }

    fn ensure_live(&self) -> Result<(), IngressError> {
        match self.state {
            PipeState::Enabled => Ok(()),
            PipeState::Created => Err(IngressError::NotEnabled),
            PipeState::Completed | PipeState::Disposed => Err(IngressError::Disposed),
        }
    }

    /// Push one raw partitioned event.
    pub fn on_next(&mut self, event: PartitionedStreamEvent<K, P>) -> Result<(), IngressError> {
        self.ensure_live()?;
        match (event.target, event.event) {
            (PartitionTarget::All, marker) => self.update_low_watermark(marker.sync_time),
            (PartitionTarget::Key(key), event) if event.kind() == EventKind::Punctuation => {
                self.on_partition_punctuation(key, event.sync_time)
            }
            (PartitionTarget::Key(key), event) => self.on_data(key, event),
        }
    }

    /// The boundary a partition's events must not regress behind: its own
    /// current time, floored by the global low watermark.
    fn partition_floor(&self, key: &K) -> i64 {
        self.current_times
            .get(key)
            .copied()
            .unwrap_or(MIN_SYNC_TIME)
            .max(self.low_watermark.raw)
    }

    fn on_data(&mut self, key: K, event: StreamEvent<P>) -> Result<(), IngressError> {
        let mut event = event;
        if matches!(self.disorder, DisorderPolicy::Adjust { .. })
            && event.kind() == EventKind::EndEdge
        {
            match self.rewrite_retraction(&key, event) {
                Some(rewritten) => event = rewritten,
                None => return Ok(()),
            }
        }
        let floor = self.partition_floor(&key);
        if event.sync_time < floor {
            match self.disorder {
                DisorderPolicy::Throw => {
                    let error = IngressError::OutOfOrder {
                        sync_time: event.sync_time,
                        current_time: floor,
                    };
                    self.core.error(error.clone());
                    self.dispose();
                    return Err(error);
                }
                DisorderPolicy::Drop { .. } => {
                    self.diagnostics.on_out_of_order(OutOfOrderEvent {
                        event: PartitionedStreamEvent::data(key, event),
                        time_adjustment: None,
                    });
                    return Ok(());
                }
                DisorderPolicy::Adjust { .. } => {
                    let delta = floor - event.sync_time;
                    let original = PartitionedStreamEvent::data(key.clone(), event.clone());
                    match event.kind() {
                        EventKind::Interval if event.other_time <= floor => {
                            self.diagnostics.on_out_of_order(OutOfOrderEvent {
                                event: original,
                                time_adjustment: Some(delta),
                            });
                            return Ok(());
                        }
                        EventKind::StartEdge => {
                            let payload = event
                                .payload
                                .clone()
                                .expect("start edges carry payloads");
                            let entry = self
                                .adjust_table
                                .entry((key.clone(), event.sync_time, payload))
                                .or_insert(AdjustInfo {
                                    modified_start_time: floor,
                                    occurrences: 0,
                                });
                            entry.modified_start_time = floor;
                            entry.occurrences += 1;
                        }
                        _ => {}
                    }
                    event.sync_time = floor;
                    self.diagnostics.on_out_of_order(OutOfOrderEvent {
                        event: original,
                        time_adjustment: Some(delta),
                    });
                }
            }
        }
        let time = event.sync_time;
        self.sorter.enqueue(key.clone(), event);
        self.raise_high_watermark(&key, time);
        let safe = time.saturating_sub(self.reorder_latency);
        if safe > self.partition_floor(&key) {
            self.drain_partition_to(&key, safe);
        }
        self.maybe_generate_low_watermark();
        Ok(())
    }

    fn rewrite_retraction(&mut self, key: &K, mut event: StreamEvent<P>) -> Option<StreamEvent<P>> {
        let payload = event.payload.clone().expect("end edges carry payloads");
        let table_key = (key.clone(), event.other_time, payload);
        // No entry: the start edge was never adjusted, pass through as-is.
        let Some(info) = self.adjust_table.get_mut(&table_key) else {
            return Some(event);
        };
        let modified = info.modified_start_time;
        info.occurrences -= 1;
        let emptied = info.occurrences == 0;
        if emptied {
            self.adjust_table.remove(&table_key);
        }
        if modified >= event.sync_time {
            let delta = modified - event.other_time;
            self.diagnostics.on_out_of_order(OutOfOrderEvent {
                event: PartitionedStreamEvent::data(key.clone(), event),
                time_adjustment: Some(delta),
            });
            return None;
        }
        event.other_time = modified;
        Some(event)
    }

    /// Move `key`'s entry in the inverted index when its watermark rises.
    fn raise_high_watermark(&mut self, key: &K, time: i64) {
        let previous = self.high_watermarks.get(key).copied();
        match previous {
            Some(previous) if previous >= time => return,
            Some(previous) => {
                if let Some(keys) = self.watermark_index.get_mut(&previous) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.watermark_index.remove(&previous);
                    }
                }
            }
            None => {}
        }
        self.high_watermarks.insert(key.clone(), time);
        self.watermark_index
            .entry(time)
            .or_default()
            .insert(key.clone());
    }

    fn drain_partition_to(&mut self, key: &K, time: i64) {
        let mut drained = std::mem::take(&mut self.drained);
        self.sorter.drain_partition_until(key, time, &mut drained);
        for event in drained.drain(..) {
            self.append_ordered(key.clone(), event);
        }
        self.drained = drained;
    }

    fn append_ordered(&mut self, key: K, event: StreamEvent<P>) {
        let time = event.sync_time;
        let current = self
            .current_times
            .entry(key.clone())
            .or_insert(MIN_SYNC_TIME);
        if time > *current {
            *current = time;
        }
        let policy = self.punctuation_policy;
        let floor = self.low_watermark.quantized_punctuation;
        let tracker = self
            .trackers
            .entry(key.clone())
            .or_insert_with(|| PunctuationTracker::with_floor(policy, floor));
        if let Some(boundary) = tracker.before_append(time) {
            self.core.append_punctuation(Some(key.clone()), boundary);
        }
        let payload = event.payload.expect("only data events enter the sorter");
        self.core
            .append_data(time, event.other_time, Some(key.clone()), payload);
        let tracker = self
            .trackers
            .get_mut(&key)
            .expect("tracker created above");
        if let Some(due) = tracker.after_append(time) {
            self.core.append_punctuation(Some(key), due);
        }
    }

    fn on_partition_punctuation(&mut self, key: K, time: i64) -> Result<(), IngressError> {
        self.drain_partition_to(&key, time);
        let current = self
            .current_times
            .entry(key.clone())
            .or_insert(MIN_SYNC_TIME);
        if time > *current {
            *current = time;
        }
        self.raise_high_watermark(&key, time);
        let policy = self.punctuation_policy;
        let floor = self.low_watermark.quantized_punctuation;
        let tracker = self
            .trackers
            .entry(key.clone())
            .or_insert_with(|| PunctuationTracker::with_floor(policy, floor));
        tracker.note_external(time);
        self.core.append_punctuation(Some(key), time);
        self.maybe_generate_low_watermark();
        Ok(())
    }

    /// Generate a low watermark once the minimum partition high watermark,
    /// less the configured lag, crosses a fresh period boundary.
    fn maybe_generate_low_watermark(&mut self) {
        let LowWatermarkPolicy::Time { period, lag } = self.low_watermark_policy else {
            return;
        };
        let Some((&min_high, _)) = self.watermark_index.first_key_value() else {
            return;
        };
        let quantized = snap_to_left_boundary(min_high.saturating_sub(lag), period);
        if quantized > self.low_watermark.quantized_generation && quantized > MIN_SYNC_TIME {
            // Best effort: a failed advance cannot happen here since the
            // candidate is above the raw value by construction.
            let _ = self.update_low_watermark(quantized);
        }
    }

    /// Advance the global low watermark: drain every partition up to `time`,
    /// bound all per-partition clocks, refresh the quantized projections and
    /// append the marker row.
    pub fn update_low_watermark(&mut self, time: i64) -> Result<(), IngressError> {
        self.ensure_live()?;
        if time <= self.low_watermark.raw {
            return Ok(());
        }
        let drained = self.sorter.dequeue_until(time);
        for (key, events) in drained {
            for event in events {
                self.append_ordered(key.clone(), event);
            }
        }
        for current in self.current_times.values_mut() {
            if *current < time {
                *current = time;
            }
        }
        // Partitions whose high watermark sits below the new bound are
        // effectively at the bound now; keep the index in step.
        loop {
            let Some((&high, _)) = self.watermark_index.first_key_value() else {
                break;
            };
            if high >= time {
                break;
            }
            let keys = self
                .watermark_index
                .remove(&high)
                .expect("first entry exists");
            for key in keys {
                self.high_watermarks.insert(key.clone(), time);
                self.watermark_index
                    .entry(time)
                    .or_default()
                    .insert(key);
            }
        }
        self.low_watermark.raw = time;
        self.low_watermark.quantized_generation = match self.low_watermark_policy {
            LowWatermarkPolicy::Time { period, .. } => snap_to_left_boundary(time, period),
            LowWatermarkPolicy::None => time,
        };
        self.low_watermark.quantized_punctuation = match self.punctuation_policy {
            PunctuationPolicy::Time { period } => snap_to_left_boundary(time, period),
            _ => time,
        };
        self.core.append_low_watermark(time);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.core.signal_flush();
        Ok(())
    }

    pub fn on_completed(&mut self) -> Result<(), IngressError> {
        self.ensure_live()?;
        match self.on_completed_policy {
            OnCompletedPolicy::None => self.drain_all_to(INFINITY_SYNC_TIME),
            OnCompletedPolicy::Flush => {
                let target = self
                    .current_times
                    .values()
                    .copied()
                    .max()
                    .unwrap_or(MIN_SYNC_TIME);
                self.drain_all_to(target);
                self.core.flush_contents();
            }
            OnCompletedPolicy::EndOfStream => {
                self.drain_all_to(INFINITY_SYNC_TIME);
                self.core.append_low_watermark(INFINITY_SYNC_TIME);
                self.core.flush_contents();
            }
        }
        self.core.complete();
        self.state = PipeState::Completed;
        Ok(())
    }

    fn drain_all_to(&mut self, time: i64) {
        let drained = self.sorter.dequeue_until(time);
        for (key, events) in drained {
            for event in events {
                self.append_ordered(key.clone(), event);
            }
        }
    }

    /// Tear down and release pooled storage. Idempotent, legal in any phase.
    pub fn dispose(&mut self) {
        if self.state == PipeState::Disposed {
            return;
        }
        self.state = PipeState::Disposed;
        self.sorter.reset();
        self.core.dispose();
        self.adjust_table.clear();
    }

    pub fn current_time(&self, key: &K) -> Option<i64> {
        self.current_times.get(key).copied()
    }

    pub fn low_watermark(&self) -> i64 {
        self.low_watermark.raw
    }

    /// Minimum high watermark across partitions: the safe global drain point.
    pub fn min_high_watermark(&self) -> Option<i64> {
        self.watermark_index.first_key_value().map(|(&time, _)| time)
    }

    pub fn buffered_len(&self) -> usize {
        self.sorter.len()
    }

    pub fn pooled_leases(&self) -> usize {
        self.sorter.pooled_leases() + self.core.pooled_leases()
    }
}

impl<K, P> Drop for PartitionedIngressPipe<K, P>
where
    K: Hash + Eq + Clone + Send + 'static,
    P: Clone + Eq + Hash + Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}
