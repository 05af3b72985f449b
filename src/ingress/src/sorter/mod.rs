//! Reorder buffers: accept events in arbitrary order, hand them back in
//! non-decreasing sync-time order.
//!
//! Two interchangeable implementations sit behind [`ReorderBuffer`]: the
//! fiber-based [`ImpatienceSorter`] and the heap-based
//! [`PriorityQueueSorter`]. Selection happens once, at construction, via
//! [`SortTechnique`] — never per event.

pub mod impatience;
pub mod partitioned;
pub mod priority_queue;

pub use impatience::ImpatienceSorter;
pub use partitioned::PartitionedReorderBuffer;
pub use priority_queue::PriorityQueueSorter;

use crate::model::{PartitionedStreamEvent, StreamEvent};
use crate::policy::SortTechnique;

/// Anything ordered by a sync time.
pub trait Timestamped {
    fn sync_time(&self) -> i64;
}

impl<P> Timestamped for StreamEvent<P> {
    fn sync_time(&self) -> i64 {
        self.sync_time
    }
}

impl<K, P> Timestamped for PartitionedStreamEvent<K, P> {
    fn sync_time(&self) -> i64 {
        self.event.sync_time
    }
}

impl Timestamped for i64 {
    fn sync_time(&self) -> i64 {
        *self
    }
}

/// The sorting contract shared by both implementations.
///
/// `dequeue_until` is the raw primitive: it may return only part of the
/// eligible events together with `recheck = true`, in which case the caller
/// must invoke it again with the same timestamp. `drain_until` wraps that
/// loop and is what in-repo call sites use.
pub trait ReorderBuffer<E: Timestamped> {
    /// Buffer one event. Never fails; order is arbitrary.
    fn enqueue(&mut self, event: E);

    /// Remove and return events with sync time `<= time`, oldest first.
    ///
    /// Returned buffers come from an internal pool and must be handed back
    /// via [`ReorderBuffer::recycle`] once consumed.
    fn dequeue_until(&mut self, time: i64) -> (Option<Vec<E>>, bool);

    /// Return a drained buffer to the internal pool.
    fn recycle(&mut self, buffer: Vec<E>);

    /// Number of buffered events.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return all internal storage to the pools; the buffer becomes empty.
    fn reset(&mut self);

    /// Pool containers currently on loan (fibers plus drained buffers).
    fn pooled_leases(&self) -> usize;

    /// Drain every eligible event into `out`, looping until exhausted.
    fn drain_until(&mut self, time: i64, out: &mut Vec<E>) {
        loop {
            let (buffer, recheck) = self.dequeue_until(time);
            match buffer {
                Some(mut buffer) => {
                    out.append(&mut buffer);
                    self.recycle(buffer);
                    if !recheck {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

/// Construct the reorder buffer selected by the configuration.
pub fn build_reorder_buffer<E>(technique: SortTechnique) -> Box<dyn ReorderBuffer<E> + Send>
where
    E: Timestamped + Send + 'static,
{
    match technique {
        SortTechnique::ImpatienceSort => Box::new(ImpatienceSorter::new()),
        SortTechnique::PriorityQueue => Box::new(PriorityQueueSorter::new()),
    }
}
