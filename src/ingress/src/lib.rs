//! Ingress layer of a temporal stream-processing engine.
//!
//! Accepts a live, possibly out-of-order sequence of timestamped events and
//! produces a strictly time-ordered, batched stream for downstream temporal
//! operators. The core pieces: the reorder buffers (fiber-based impatience
//! sort and a heap-based alternative), the ingress state machines that apply
//! disorder/flush/punctuation policies, and a channel-driven processor
//! adapter for pipeline use.

pub mod diagnostics;
pub mod error;
pub mod model;
pub mod observer;
pub mod pipe;
pub mod policy;
pub mod processor;
pub mod sorter;
pub mod stats;

pub use diagnostics::{CollectingDiagnostics, DiagnosticSink, NullDiagnostics, OutOfOrderEvent};
pub use error::IngressError;
pub use model::{
    EventBatch, EventKind, PartitionTarget, PartitionedStreamEvent, StreamEvent,
    INFINITY_SYNC_TIME, MIN_SYNC_TIME, PUNCTUATION_OTHER_TIME,
};
pub use observer::{CollectedOutput, CollectingObserver, IngressObserver};
pub use pipe::{
    AdjustInfo, DelayedSubscription, IngressPipe, OrderedIngressPipe, PartitionedIngressPipe,
};
pub use policy::{
    DisorderPolicy, FlushPolicy, IngressConfig, LowWatermarkPolicy, OnCompletedPolicy,
    PunctuationPolicy, SortTechnique, DEFAULT_BATCH_SIZE,
};
pub use processor::{
    IngressControl, IngressOutput, IngressProcessor, ProcessorError, DEFAULT_CHANNEL_CAPACITY,
};
pub use sorter::{
    build_reorder_buffer, ImpatienceSorter, PartitionedReorderBuffer, PriorityQueueSorter,
    ReorderBuffer, Timestamped,
};
pub use stats::{IngressStats, IngressStatsSnapshot};
