//! Event, batch and pool model shared by every pipe.

pub mod batch;
pub mod event;
pub mod pool;

pub use batch::EventBatch;
pub use event::{
    EventKind, PartitionTarget, PartitionedStreamEvent, StreamEvent, INFINITY_SYNC_TIME,
    MIN_SYNC_TIME, PUNCTUATION_OTHER_TIME,
};
pub use pool::{BatchPool, BufferPool, ObjectPool, QueuePool, Recyclable};
