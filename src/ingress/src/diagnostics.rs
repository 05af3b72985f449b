//! Diagnostic output for recoverable disorder.
//!
//! Events dropped or adjusted under the non-fatal disorder policies are
//! reported here and never on the main pipeline. The stream is best-effort:
//! callers wanting strict correctness choose the throw policy instead.

use std::sync::{Arc, Mutex};

/// A disordered event together with how it was handled.
///
/// `time_adjustment` is `None` when the event was dropped and `Some(delta)`
/// when its sync time was shifted forward by `delta` ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfOrderEvent<E> {
    pub event: E,
    pub time_adjustment: Option<i64>,
}

/// Sink for out-of-order reports. Partitioned pipes report events that carry
/// their partition key.
pub trait DiagnosticSink<E>: Send {
    fn on_out_of_order(&mut self, report: OutOfOrderEvent<E>);
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnostics;

impl<E: Send> DiagnosticSink<E> for NullDiagnostics {
    fn on_out_of_order(&mut self, _report: OutOfOrderEvent<E>) {}
}

/// Retains every report for later inspection.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics<E> {
    inner: Arc<Mutex<Vec<OutOfOrderEvent<E>>>>,
}

impl<E> CollectingDiagnostics<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> Arc<Mutex<Vec<OutOfOrderEvent<E>>>> {
        Arc::clone(&self.inner)
    }
}

impl<E: Send> DiagnosticSink<E> for CollectingDiagnostics<E> {
    fn on_out_of_order(&mut self, report: OutOfOrderEvent<E>) {
        self.inner
            .lock()
            .expect("diagnostic lock poisoned")
            .push(report);
    }
}
