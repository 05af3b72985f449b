//! Heap-based reorder buffer.
//!
//! The alternative strategy behind the same [`ReorderBuffer`] contract:
//! a binary min-heap keyed by sync time with a sequence number to keep ties
//! in arrival order. O(log n) per event either way, against the impatience
//! sorter's near-O(1) insert on near-ordered streams.

use crate::model::BufferPool;
use crate::sorter::{ReorderBuffer, Timestamped};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct HeapEntry<E> {
    sync_time: i64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for HeapEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.sync_time == other.sync_time && self.seq == other.seq
    }
}

impl<E> Eq for HeapEntry<E> {}

impl<E> PartialOrd for HeapEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for HeapEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sync_time
            .cmp(&other.sync_time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

pub struct PriorityQueueSorter<E> {
    heap: BinaryHeap<Reverse<HeapEntry<E>>>,
    seq: u64,
    buffer_pool: BufferPool<E>,
}

impl<E> Default for PriorityQueueSorter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PriorityQueueSorter<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
            buffer_pool: BufferPool::new(),
        }
    }
}

impl<E: Timestamped> ReorderBuffer<E> for PriorityQueueSorter<E> {
    fn enqueue(&mut self, event: E) {
        self.heap.push(Reverse(HeapEntry {
            sync_time: event.sync_time(),
            seq: self.seq,
            event,
        }));
        self.seq = self.seq.wrapping_add(1);
    }

    fn dequeue_until(&mut self, time: i64) -> (Option<Vec<E>>, bool) {
        if !self
            .heap
            .peek()
            .is_some_and(|Reverse(head)| head.sync_time <= time)
        {
            return (None, false);
        }
        let mut buffer = self.buffer_pool.get();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.sync_time > time {
                break;
            }
            let Reverse(entry) = self.heap.pop().expect("peek returned Some, pop must succeed");
            buffer.push(entry.event);
        }
        (Some(buffer), false)
    }

    fn recycle(&mut self, buffer: Vec<E>) {
        self.buffer_pool.put(buffer);
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn reset(&mut self) {
        self.heap.clear();
    }

    fn pooled_leases(&self) -> usize {
        self.buffer_pool.leased()
    }
}
