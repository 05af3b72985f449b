//! Ingress state machines.
//!
//! Three pipe kinds share one batching/watermark core: the unpartitioned and
//! partitioned reordering pipes, and the pre-ordered pipe for sources that
//! guarantee order themselves. All of them are single-threaded and
//! push-driven; nothing here blocks or spawns.

pub(crate) mod core;
pub mod ordered;
pub mod partitioned;
pub mod subscription;
pub mod unpartitioned;

pub use ordered::OrderedIngressPipe;
pub use partitioned::PartitionedIngressPipe;
pub use subscription::DelayedSubscription;
pub use unpartitioned::IngressPipe;

/// How a disordered start edge was shifted, so the matching end edge can be
/// retracted consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustInfo {
    pub modified_start_time: i64,
    pub occurrences: u32,
}

/// Lifecycle of a pipe: constructed, attached to live data, then completed or
/// torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipeState {
    Created,
    Enabled,
    Completed,
    Disposed,
}
