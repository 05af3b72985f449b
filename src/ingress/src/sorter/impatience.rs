//! Fiber-based reorder buffer ("impatience sort").
//!
//! Events land in a small set of time-disjoint FIFO fibers kept in descending
//! tail order: an event at or past the primary fiber's tail appends in O(1),
//! anything older binary-searches for the first fiber able to absorb it, and
//! an event older than every tail opens a new fiber. Draining merges the
//! eligible fiber prefixes pairwise through pooled buffers, so a near-ordered
//! stream costs almost nothing and a badly disordered one degrades to an
//! n·log k merge.

use crate::model::{BufferPool, QueuePool};
use crate::sorter::{ReorderBuffer, Timestamped};
use std::collections::VecDeque;

pub struct ImpatienceSorter<E> {
    fibers: Vec<VecDeque<E>>,
    /// Max sync time ever enqueued per fiber, parallel to `fibers`,
    /// strictly descending.
    tails: Vec<i64>,
    /// Lower bound on the sync times held by non-primary fibers; drains below
    /// this value never need to scan past fiber 0.
    next_affecting_sync_time: i64,
    queue_pool: QueuePool<E>,
    buffer_pool: BufferPool<E>,
    len: usize,
}

impl<E> Default for ImpatienceSorter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ImpatienceSorter<E> {
    pub fn new() -> Self {
        Self {
            fibers: Vec::new(),
            tails: Vec::new(),
            next_affecting_sync_time: i64::MAX,
            queue_pool: QueuePool::new(),
            buffer_pool: BufferPool::new(),
            len: 0,
        }
    }

    /// Number of live fibers (diagnostic; proportional to observed disorder).
    pub fn fiber_count(&self) -> usize {
        self.fibers.len()
    }
}

impl<E: Timestamped> ImpatienceSorter<E> {
    fn open_fiber(&mut self, event: E, time: i64) {
        let mut fiber = self.queue_pool.get();
        fiber.push_back(event);
        self.fibers.push(fiber);
        self.tails.push(time);
    }

    /// Move the prefix of `fibers[index]` with sync time `<= time` into a
    /// pooled buffer.
    fn split_prefix(&mut self, index: usize, time: i64) -> Vec<E> {
        let mut buffer = self.buffer_pool.get();
        let fiber = &mut self.fibers[index];
        while let Some(head) = fiber.front() {
            if head.sync_time() > time {
                break;
            }
            buffer.push(fiber.pop_front().expect("front checked, pop must succeed"));
        }
        self.len -= buffer.len();
        buffer
    }

    /// Stable two-pointer merge of two drained buffers; ties take the left
    /// (earlier-fiber) side first. Both inputs return to the pool.
    fn merge_pair(&mut self, mut left: Vec<E>, mut right: Vec<E>) -> Vec<E> {
        let mut merged = self.buffer_pool.get();
        merged.reserve(left.len() + right.len());
        {
            let mut l = left.drain(..).peekable();
            let mut r = right.drain(..).peekable();
            loop {
                match (l.peek(), r.peek()) {
                    (Some(a), Some(b)) => {
                        if a.sync_time() <= b.sync_time() {
                            merged.push(l.next().expect("peeked"));
                        } else {
                            merged.push(r.next().expect("peeked"));
                        }
                    }
                    // One side exhausted: bulk-copy the remainder.
                    (Some(_), None) => {
                        merged.extend(l);
                        break;
                    }
                    (None, _) => {
                        merged.extend(r);
                        break;
                    }
                }
            }
        }
        self.buffer_pool.put(left);
        self.buffer_pool.put(right);
        merged
    }

    /// Drop fibers drained empty and refresh the non-primary lower bound from
    /// the remaining heads.
    fn compact(&mut self) {
        let mut index = 0;
        while index < self.fibers.len() {
            if self.fibers[index].is_empty() {
                let fiber = self.fibers.remove(index);
                self.queue_pool.put(fiber);
                self.tails.remove(index);
            } else {
                index += 1;
            }
        }
        self.next_affecting_sync_time = self
            .fibers
            .iter()
            .skip(1)
            .filter_map(|fiber| fiber.front().map(Timestamped::sync_time))
            .min()
            .unwrap_or(i64::MAX);
    }
}

impl<E: Timestamped> ReorderBuffer<E> for ImpatienceSorter<E> {
    fn enqueue(&mut self, event: E) {
        let time = event.sync_time();
        self.len += 1;
        let Some(primary_tail) = self.tails.first().copied() else {
            self.open_fiber(event, time);
            return;
        };
        if time >= primary_tail {
            // Common case: the stream is nearly ordered.
            self.fibers[0].push_back(event);
            self.tails[0] = time;
            return;
        }
        // First fiber (descending tails) whose tail fits under this event.
        let index = self.tails.partition_point(|&tail| tail > time);
        if index < self.fibers.len() {
            self.fibers[index].push_back(event);
            self.tails[index] = time;
        } else {
            self.open_fiber(event, time);
        }
        if time < self.next_affecting_sync_time {
            self.next_affecting_sync_time = time;
        }
    }

    fn dequeue_until(&mut self, time: i64) -> (Option<Vec<E>>, bool) {
        let mut eligible: Vec<usize> = Vec::new();
        if let Some(head) = self.fibers.first().and_then(|fiber| fiber.front()) {
            if head.sync_time() <= time {
                eligible.push(0);
            }
        }
        if time >= self.next_affecting_sync_time {
            for index in 1..self.fibers.len() {
                if let Some(head) = self.fibers[index].front() {
                    if head.sync_time() <= time {
                        eligible.push(index);
                    }
                }
            }
        }
        if eligible.is_empty() {
            return (None, false);
        }

        let result = if eligible.len() == 1 {
            let buffer = self.split_prefix(eligible[0], time);
            (Some(buffer), true)
        } else {
            let mut round: Vec<Vec<E>> = eligible
                .iter()
                .map(|&index| self.split_prefix(index, time))
                .collect();
            while round.len() > 1 {
                let mut merged_round = Vec::with_capacity(round.len().div_ceil(2));
                let mut pending = round.into_iter();
                while let Some(left) = pending.next() {
                    match pending.next() {
                        Some(right) => merged_round.push(self.merge_pair(left, right)),
                        None => merged_round.push(left),
                    }
                }
                round = merged_round;
            }
            (round.pop(), false)
        };
        self.compact();
        result
    }

    fn recycle(&mut self, buffer: Vec<E>) {
        self.buffer_pool.put(buffer);
    }

    fn len(&self) -> usize {
        self.len
    }

    fn reset(&mut self) {
        for fiber in self.fibers.drain(..) {
            self.queue_pool.put(fiber);
        }
        self.tails.clear();
        self.next_affecting_sync_time = i64::MAX;
        self.len = 0;
    }

    fn pooled_leases(&self) -> usize {
        self.queue_pool.leased() + self.buffer_pool.leased()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sorter: &mut ImpatienceSorter<i64>, time: i64) -> Vec<i64> {
        let mut out = Vec::new();
        sorter.drain_until(time, &mut out);
        out
    }

    #[test]
    fn ordered_input_stays_in_one_fiber() {
        let mut sorter = ImpatienceSorter::new();
        for t in [1, 2, 2, 5, 9] {
            sorter.enqueue(t);
        }
        assert_eq!(sorter.fiber_count(), 1);
        assert_eq!(drain(&mut sorter, 9), vec![1, 2, 2, 5, 9]);
        assert!(sorter.is_empty());
    }

    #[test]
    fn disordered_input_opens_fibers_and_merges() {
        let mut sorter = ImpatienceSorter::new();
        for t in [10, 3, 7, 1, 12, 5] {
            sorter.enqueue(t);
        }
        assert!(sorter.fiber_count() > 1);
        assert_eq!(drain(&mut sorter, 12), vec![1, 3, 5, 7, 10, 12]);
    }

    #[test]
    fn drain_never_returns_future_events() {
        let mut sorter = ImpatienceSorter::new();
        for t in [4, 9, 2, 7, 11] {
            sorter.enqueue(t);
        }
        assert_eq!(drain(&mut sorter, 7), vec![2, 4, 7]);
        assert_eq!(sorter.len(), 2);
        assert_eq!(drain(&mut sorter, 100), vec![9, 11]);
    }

    #[test]
    fn recheck_loop_is_idempotent() {
        let mut sorter = ImpatienceSorter::new();
        // Single eligible fiber: the fast path returns it with recheck = true.
        sorter.enqueue(1);
        sorter.enqueue(3);
        let (first, recheck) = sorter.dequeue_until(5);
        assert!(recheck);
        let first = first.expect("events eligible");
        assert_eq!(first, vec![1, 3]);
        sorter.recycle(first);
        // Re-invoking with the same timestamp signals exhaustion.
        let (second, recheck) = sorter.dequeue_until(5);
        assert!(second.is_none());
        assert!(!recheck);
    }

    #[test]
    fn interleaved_drains_preserve_global_order_and_completeness() {
        // Disorder stays within 4 ticks of the high watermark, so draining at
        // high - 4 never strands or regresses an event.
        let inputs = [5, 2, 8, 6, 4, 11, 9, 7, 14, 12, 10, 16];
        let mut sorter = ImpatienceSorter::new();
        let mut emitted = Vec::new();
        let mut high = i64::MIN;
        for (step, &t) in inputs.iter().enumerate() {
            sorter.enqueue(t);
            high = high.max(t);
            if step % 4 == 3 {
                sorter.drain_until(high - 4, &mut emitted);
            }
        }
        sorter.drain_until(i64::MAX, &mut emitted);
        let mut expected = inputs.to_vec();
        expected.sort_unstable();
        assert_eq!(emitted, expected);
        assert!(emitted.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn equal_sync_times_drain_in_enqueue_order() {
        #[derive(Debug, PartialEq, Clone)]
        struct Tagged(i64, u32);
        impl Timestamped for Tagged {
            fn sync_time(&self) -> i64 {
                self.0
            }
        }
        let mut sorter = ImpatienceSorter::new();
        // 7 goes behind the primary tail twice; equal times stay FIFO.
        for event in [Tagged(9, 0), Tagged(7, 1), Tagged(7, 2), Tagged(9, 3)] {
            sorter.enqueue(event);
        }
        let mut out = Vec::new();
        sorter.drain_until(9, &mut out);
        assert_eq!(
            out,
            vec![Tagged(7, 1), Tagged(7, 2), Tagged(9, 0), Tagged(9, 3)]
        );
    }

    #[test]
    fn pool_leases_return_to_zero() {
        let mut sorter = ImpatienceSorter::new();
        for t in [6, 1, 9, 4, 2, 8] {
            sorter.enqueue(t);
        }
        let mut out = Vec::new();
        sorter.drain_until(5, &mut out);
        sorter.reset();
        assert_eq!(sorter.pooled_leases(), 0);
        assert_eq!(sorter.len(), 0);
    }

    #[test]
    fn skips_fiber_scan_below_next_affecting_time() {
        let mut sorter = ImpatienceSorter::new();
        sorter.enqueue(100);
        sorter.enqueue(50); // second fiber
        sorter.enqueue(101);
        // Nothing at or below 10 anywhere.
        let (buffer, recheck) = sorter.dequeue_until(10);
        assert!(buffer.is_none());
        assert!(!recheck);
        assert_eq!(sorter.len(), 3);
    }
}
