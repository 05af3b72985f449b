//! Pre-ordered ingress.
//!
//! For callers that guarantee global order themselves: no reorder buffer, no
//! drop/adjust fallback. Any monotonicity violation fails fast. The pipe
//! still batches through the pool, honors the flush and punctuation policies,
//! and follows the same enable/dispose lifecycle as the reordering pipes.

use crate::error::IngressError;
use crate::model::{StreamEvent, INFINITY_SYNC_TIME, MIN_SYNC_TIME};
use crate::observer::IngressObserver;
use crate::pipe::core::{BatchingCore, PunctuationTracker};
use crate::pipe::PipeState;
use crate::policy::{FlushPolicy, IngressConfig, LowWatermarkPolicy, OnCompletedPolicy};

pub struct OrderedIngressPipe<P> {
    core: BatchingCore<(), P>,
    tracker: PunctuationTracker,
    on_completed_policy: OnCompletedPolicy,
    current_time: i64,
    state: PipeState,
}

impl<P: Send + 'static> OrderedIngressPipe<P> {
    pub fn new(
        config: IngressConfig,
        observer: Box<dyn IngressObserver<(), P>>,
    ) -> Result<Self, IngressError> {
        config.validate()?;
        if config.flush == FlushPolicy::OnLowWatermark
            || config.low_watermark != LowWatermarkPolicy::None
        {
            return Err(IngressError::PolicyMisconfiguration(
                "low watermark policies require a partitioned pipe".into(),
            ));
        }
        Ok(Self {
            core: BatchingCore::new(config.batch_size, config.flush, observer),
            tracker: PunctuationTracker::new(config.punctuation),
            on_completed_policy: config.on_completed,
            current_time: MIN_SYNC_TIME,
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

    /// The caller contract: sync times never regress. Violations are fatal.
    fn advance(&mut self, sync_time: i64) -> Result<(), IngressError> {
        if sync_time < self.current_time {
            let error = IngressError::OutOfOrder {
                sync_time,
                current_time: self.current_time,
            };
            self.core.error(error.clone());
            self.dispose();
            return Err(error);
        }
        self.current_time = sync_time;
        Ok(())
    }

    fn append(&mut self, event: StreamEvent<P>) {
        if let Some(boundary) = self.tracker.before_append(event.sync_time) {
            self.core.append_punctuation(None, boundary);
        }
        let sync_time = event.sync_time;
        let other_time = event.other_time;
        let payload = event.payload.expect("ordered ingress appends data events");
        self.core.append_data(sync_time, other_time, None, payload);
        if let Some(due) = self.tracker.after_append(sync_time) {
            self.core.append_punctuation(None, due);
        }
    }

    pub fn add_interval(&mut self, start: i64, end: i64, payload: P) -> Result<(), IngressError> {
        self.ensure_live()?;
        let event = StreamEvent::interval(start, end, payload)?;
        self.advance(start)?;
        self.append(event);
        Ok(())
    }

    pub fn add_start_edge(&mut self, start: i64, payload: P) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.advance(start)?;
        self.append(StreamEvent::start_edge(start, payload));
        Ok(())
    }

    pub fn add_end_edge(
        &mut self,
        end: i64,
        original_start: i64,
        payload: P,
    ) -> Result<(), IngressError> {
        self.ensure_live()?;
        let event = StreamEvent::end_edge(end, original_start, payload)?;
        self.advance(end)?;
        self.append(event);
        Ok(())
    }

    pub fn add_punctuation(&mut self, time: i64) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.advance(time)?;
        self.tracker.note_external(time);
        self.core.append_punctuation(None, time);
        Ok(())
    }

    /// A global progress marker for callers feeding partitioned consumers.
    pub fn add_low_watermark(&mut self, time: i64) -> Result<(), IngressError> {
        self.ensure_live()?;
        self.advance(time)?;
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
            OnCompletedPolicy::None => {}
            OnCompletedPolicy::Flush => self.core.flush_contents(),
            OnCompletedPolicy::EndOfStream => {
                self.core.append_punctuation(None, INFINITY_SYNC_TIME);
                self.core.flush_contents();
            }
        }
        self.core.complete();
        self.state = PipeState::Completed;
        Ok(())
    }

    pub fn current_time(&self) -> i64 {
        self.current_time
    }
}

impl<P> OrderedIngressPipe<P> {
    /// Tear down and release pooled storage. Idempotent, legal in any phase.
    pub fn dispose(&mut self) {
        if self.state == PipeState::Disposed {
            return;
        }
        self.state = PipeState::Disposed;
        self.core.dispose();
    }

    pub fn pooled_leases(&self) -> usize {
        self.core.pooled_leases()
    }
}

impl<P> Drop for OrderedIngressPipe<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
