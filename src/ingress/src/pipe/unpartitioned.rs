//! Unpartitioned ingress state machine.
//!
//! Accepts a possibly disordered push stream, applies the disorder policy
//! against the current-time boundary, reorders the rest through the configured
//! reorder buffer, and assembles the drained, now-ordered events into pooled
//! batches with synthesized punctuations.

use crate::diagnostics::{DiagnosticSink, OutOfOrderEvent};
use crate::error::IngressError;
use crate::model::{EventKind, StreamEvent, INFINITY_SYNC_TIME, MIN_SYNC_TIME};
use crate::observer::IngressObserver;
use crate::pipe::core::{BatchingCore, PunctuationTracker};
use crate::pipe::{AdjustInfo, PipeState};
use crate::policy::{
    DisorderPolicy, FlushPolicy, IngressConfig, LowWatermarkPolicy, OnCompletedPolicy,
};
use crate::sorter::{build_reorder_buffer, ReorderBuffer};
use std::collections::HashMap;
use std::hash::Hash;

pub struct IngressPipe<P>
where
    P: Clone + Eq + Hash + Send + 'static,
{
    disorder: DisorderPolicy,
    reorder_latency: i64,
    on_completed_policy: OnCompletedPolicy,
    core: BatchingCore<(), P>,
    tracker: PunctuationTracker,
    sorter: Box<dyn ReorderBuffer<StreamEvent<P>> + Send>,
    diagnostics: Box<dyn DiagnosticSink<StreamEvent<P>> + Send>,
    /// Largest sync time appended to the output so far; the disorder boundary.
    current_time: i64,
    /// Largest sync time ever accepted; drains run at `high - latency`.
    high_watermark: i64,
    /// Start-edge shifts recorded under the adjust policy, keyed by the
    /// original start time and payload, so matching end edges retract the
    /// shifted start rather than the original one.
    adjust_table: HashMap<(i64, P), AdjustInfo>,
    /// Scratch space reused across drains.
    drained: Vec<StreamEvent<P>>,
    state: PipeState,
}

impl<P> IngressPipe<P>
where
    P: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(
        config: IngressConfig,
        observer: Box<dyn IngressObserver<(), P>>,
        diagnostics: Box<dyn DiagnosticSink<StreamEvent<P>> + Send>,
    ) -> Result<Self, IngressError> {
        config.validate()?;
        if config.flush == FlushPolicy::OnLowWatermark {
            return Err(IngressError::PolicyMisconfiguration(
                "flush on low watermark requires a partitioned pipe".into(),
            ));
        }
        if config.low_watermark != LowWatermarkPolicy::None {
            return Err(IngressError::PolicyMisconfiguration(
                "low watermark generation requires a partitioned pipe".into(),
            ));
        }
        Ok(Self {
            disorder: config.disorder,
            reorder_latency: config.disorder.reorder_latency(),
            on_completed_policy: config.on_completed,
            core: BatchingCore::new(config.batch_size, config.flush, observer),
            tracker: PunctuationTracker::new(config.punctuation),
            sorter: build_reorder_buffer(config.sort_technique),
            diagnostics,
            current_time: MIN_SYNC_TIME,
            high_watermark: MIN_SYNC_TIME,
            adjust_table: HashMap::new(),
            drained: Vec::new(),
            state: PipeState::Created,
        })
    }

    /// Attach to live data. Must be called exactly once, after any state
    /// restore and before the first `on_next`.
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

    /// Push one raw event. Punctuations route to [`Self::on_punctuation`];
    /// data events go through disorder handling and the reorder buffer.
    pub fn on_next(&mut self, event: StreamEvent<P>) -> Result<(), IngressError> {
        self.ensure_live()?;
        if event.kind() == EventKind::Punctuation {
            return self.on_punctuation(event.sync_time);
        }
        let Some(event) = self.admit(event)? else {
            return Ok(());
        };
        let time = event.sync_time;
        self.sorter.enqueue(event);
        if time > self.high_watermark {
            self.high_watermark = time;
            let safe = time.saturating_sub(self.reorder_latency);
            if safe > self.current_time {
                self.drain_to(safe);
            }
        }
        Ok(())
    }

    /// Apply retraction rewriting and the disorder policy. Returns the event
    /// to enqueue, or `None` when it was consumed (dropped or vanished).
    fn admit(&mut self, mut event: StreamEvent<P>) -> Result<Option<StreamEvent<P>>, IngressError> {
        let adjusting = matches!(self.disorder, DisorderPolicy::Adjust { .. });
        if adjusting && event.kind() == EventKind::EndEdge {
            match self.rewrite_retraction(event) {
                Some(rewritten) => event = rewritten,
                None => return Ok(None),
            }
        }
        let time = event.sync_time;
        if time >= self.current_time {
            return Ok(Some(event));
        }
        match self.disorder {
            DisorderPolicy::Throw => {
                let error = IngressError::OutOfOrder {
                    sync_time: time,
                    current_time: self.current_time,
                };
                self.core.error(error.clone());
                self.dispose();
                Err(error)
            }
            DisorderPolicy::Drop { .. } => {
                self.diagnostics.on_out_of_order(OutOfOrderEvent {
                    event,
                    time_adjustment: None,
                });
                Ok(None)
            }
            DisorderPolicy::Adjust { .. } => {
                let delta = self.current_time - time;
                let original = event.clone();
                match event.kind() {
                    EventKind::Interval if event.other_time <= self.current_time => {
                        // The whole interval lies behind the boundary: it
                        // vanishes instead of becoming an empty interval.
                        self.diagnostics.on_out_of_order(OutOfOrderEvent {
                            event: original,
                            time_adjustment: Some(delta),
                        });
                        return Ok(None);
                    }
                    EventKind::StartEdge => {
                        let payload = event
                            .payload
                            .clone()
                            .expect("start edges carry payloads");
                        let entry = self
                            .adjust_table
                            .entry((time, payload))
                            .or_insert(AdjustInfo {
                                modified_start_time: self.current_time,
                                occurrences: 0,
                            });
                        entry.modified_start_time = self.current_time;
                        entry.occurrences += 1;
                    }
                    _ => {}
                }
                event.sync_time = self.current_time;
                self.diagnostics.on_out_of_order(OutOfOrderEvent {
                    event: original,
                    time_adjustment: Some(delta),
                });
                Ok(Some(event))
            }
        }
    }

    /// Point an end edge at the shifted start recorded when its start edge
    /// arrived disordered. Returns `None` when the pair cancelled out.
    fn rewrite_retraction(&mut self, mut event: StreamEvent<P>) -> Option<StreamEvent<P>> {
        let payload = event.payload.clone().expect("end edges carry payloads");
        let key = (event.other_time, payload);
        // No entry: the start edge was never adjusted, pass through as-is.
        let Some(info) = self.adjust_table.get_mut(&key) else {
            return Some(event);
        };
        let modified = info.modified_start_time;
        info.occurrences -= 1;
        let emptied = info.occurrences == 0;
        if emptied {
            self.adjust_table.remove(&key);
        }
        if modified >= event.sync_time {
            // The start was pushed past this end; the edge pair vanishes.
            let delta = modified - event.other_time;
            self.diagnostics.on_out_of_order(OutOfOrderEvent {
                event,
                time_adjustment: Some(delta),
            });
            return None;
        }
        event.other_time = modified;
        Some(event)
    }

    /// Advance the boundary: drain everything at or before `time` out of the
    /// reorder buffer into the batch, punctuating along the way.
    fn drain_to(&mut self, time: i64) {
        let mut drained = std::mem::take(&mut self.drained);
        self.sorter.drain_until(time, &mut drained);
        for event in drained.drain(..) {
            self.append_ordered(event);
        }
        self.drained = drained;
    }

    fn append_ordered(&mut self, event: StreamEvent<P>) {
        let time = event.sync_time;
        debug_assert!(time >= self.current_time, "drained event regressed");
        if time > self.current_time {
            self.current_time = time;
        }
        if let Some(boundary) = self.tracker.before_append(time) {
            self.core.append_punctuation(None, boundary);
        }
        let payload = event.payload.expect("only data events enter the sorter");
        self.core.append_data(time, event.other_time, None, payload);
        if let Some(due) = self.tracker.after_append(time) {
            self.core.append_punctuation(None, due);
        }
    }

    /// Explicit punctuation: no more data at or before `time`.
    pub fn on_punctuation(&mut self, time: i64) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.drain_to(time);
        if time > self.current_time {
            self.current_time = time;
        }
        if time > self.high_watermark {
            self.high_watermark = time;
        }
        // The marker row carries the asserted time; the quantized value only
        // feeds the cadence bookkeeping so boundary punctuations stay
        // monotone.
        self.tracker.note_external(time);
        self.core.append_punctuation(None, time);
        Ok(())
    }

    /// Seal and push the current batch, then signal a flush downstream.
    pub fn flush(&mut self) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.core.signal_flush();
        Ok(())
    }

    /// Apply the completion policy and propagate completion.
    pub fn on_completed(&mut self) -> Result<(), IngressError> {
        self.ensure_live()?;
        match self.on_completed_policy {
            OnCompletedPolicy::None => {
                self.drain_to(INFINITY_SYNC_TIME);
            }
            OnCompletedPolicy::Flush => {
                self.drain_to(self.current_time);
                self.core.flush_contents();
            }
            OnCompletedPolicy::EndOfStream => {
                self.drain_to(INFINITY_SYNC_TIME);
                self.core.append_punctuation(None, INFINITY_SYNC_TIME);
                self.core.flush_contents();
            }
        }
        self.core.complete();
        self.state = PipeState::Completed;
        Ok(())
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

    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    /// The last punctuation time appended or accounted for; never regresses.
    pub fn last_punctuation_time(&self) -> i64 {
        self.tracker.last_time()
    }

    pub fn buffered_len(&self) -> usize {
        self.sorter.len()
    }

    /// Pool containers on loan across the sorter and the batch pool.
    pub fn pooled_leases(&self) -> usize {
        self.sorter.pooled_leases() + self.core.pooled_leases()
    }
}

impl<P> Drop for IngressPipe<P>
where
    P: Clone + Eq + Hash + Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}
