//! Downstream observer contract.

use crate::error::IngressError;
use crate::model::EventBatch;
use std::sync::{Arc, Mutex};

/// Receives sealed batches and lifecycle signals from an ingress pipe.
///
/// Calls arrive synchronously on whatever thread drives the pipe; an
/// implementation must not block.
pub trait IngressObserver<K, P>: Send {
    fn on_batch(&mut self, batch: EventBatch<K, P>);

    fn on_flush(&mut self) {}

    fn on_completed(&mut self) {}

    fn on_error(&mut self, error: IngressError) {
        let _ = error;
    }
}

/// Observer that accumulates everything it sees; the workhorse of tests and
/// the demo binary.
#[derive(Debug, Default)]
pub struct CollectingObserver<K, P> {
    inner: Arc<Mutex<CollectedOutput<K, P>>>,
}

/// Snapshot handle into a [`CollectingObserver`]'s state.
#[derive(Debug, Default)]
pub struct CollectedOutput<K, P> {
    pub batches: Vec<EventBatch<K, P>>,
    pub flushes: usize,
    pub completed: bool,
    pub errors: Vec<IngressError>,
}

impl<K, P> CollectingObserver<K, P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CollectedOutput {
                batches: Vec::new(),
                flushes: 0,
                completed: false,
                errors: Vec::new(),
            })),
        }
    }

    /// A second handle onto the same collected output.
    pub fn handle(&self) -> Arc<Mutex<CollectedOutput<K, P>>> {
        Arc::clone(&self.inner)
    }
}

impl<K: Send, P: Send> IngressObserver<K, P> for CollectingObserver<K, P> {
    fn on_batch(&mut self, batch: EventBatch<K, P>) {
        self.inner
            .lock()
            .expect("collected output lock poisoned")
            .batches
            .push(batch);
    }

    fn on_flush(&mut self) {
        self.inner
            .lock()
            .expect("collected output lock poisoned")
            .flushes += 1;
    }

    fn on_completed(&mut self) {
        self.inner
            .lock()
            .expect("collected output lock poisoned")
            .completed = true;
    }

    fn on_error(&mut self, error: IngressError) {
        self.inner
            .lock()
            .expect("collected output lock poisoned")
            .errors
            .push(error);
    }
}
