use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Counters shared between an ingress processor and whoever monitors it.
#[derive(Debug, Default)]
pub struct IngressStats {
    events_in: AtomicU64,
    events_out: AtomicU64,
    batches_out: AtomicU64,
    error_count: AtomicU64,
    last_error: RwLock<Option<Arc<str>>>,
}

impl IngressStats {
    pub fn record_in(&self, events: u64) {
        self.events_in.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_batch(&self, rows: u64) {
        self.batches_out.fetch_add(1, Ordering::Relaxed);
        self.events_out.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        let message: String = message.into();
        let mut guard = self
            .last_error
            .write()
            .expect("IngressStats error lock poisoned");
        *guard = Some(Arc::<str>::from(message));
    }

    pub fn snapshot(&self) -> IngressStatsSnapshot {
        let last_error = self
            .last_error
            .read()
            .expect("IngressStats error lock poisoned")
            .as_deref()
            .map(ToString::to_string);
        IngressStatsSnapshot {
            events_in: self.events_in.load(Ordering::Relaxed),
            events_out: self.events_out.load(Ordering::Relaxed),
            batches_out: self.batches_out.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressStatsSnapshot {
    pub events_in: u64,
    pub events_out: u64,
    pub batches_out: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}
