//! Per-partition reorder buffering.
//!
//! One independent sorter per partition key, created lazily on first use.
//! No cross-partition ordering is implied: a drain returns each partition's
//! eligible events separately and never interleaves keys.

use crate::policy::SortTechnique;
use crate::sorter::{build_reorder_buffer, ReorderBuffer, Timestamped};
use std::collections::HashMap;
use std::hash::Hash;

pub struct PartitionedReorderBuffer<K, E> {
    partitions: HashMap<K, Box<dyn ReorderBuffer<E> + Send>>,
    technique: SortTechnique,
}

impl<K, E> PartitionedReorderBuffer<K, E>
where
    K: Hash + Eq + Clone,
    E: Timestamped + Send + 'static,
{
    pub fn new(technique: SortTechnique) -> Self {
        Self {
            partitions: HashMap::new(),
            technique,
        }
    }

    /// Buffer one event for `key`, creating the partition's sorter on first
    /// contact.
    pub fn enqueue(&mut self, key: K, event: E) {
        self.partitions
            .entry(key)
            .or_insert_with(|| build_reorder_buffer(self.technique))
            .enqueue(event);
    }

    /// Drain every partition up to `time`; partitions with nothing eligible
    /// are omitted.
    pub fn dequeue_until(&mut self, time: i64) -> Vec<(K, Vec<E>)> {
        let mut drained = Vec::new();
        for (key, sorter) in self.partitions.iter_mut() {
            let mut events = Vec::new();
            sorter.drain_until(time, &mut events);
            if !events.is_empty() {
                drained.push((key.clone(), events));
            }
        }
        drained
    }

    /// Raw single-partition drain; mirrors [`ReorderBuffer::dequeue_until`].
    pub fn dequeue_partition_until(&mut self, key: &K, time: i64) -> (Option<Vec<E>>, bool) {
        match self.partitions.get_mut(key) {
            Some(sorter) => sorter.dequeue_until(time),
            None => (None, false),
        }
    }

    /// Loop-until-exhausted drain of a single partition.
    pub fn drain_partition_until(&mut self, key: &K, time: i64, out: &mut Vec<E>) {
        if let Some(sorter) = self.partitions.get_mut(key) {
            sorter.drain_until(time, out);
        }
    }

    pub fn recycle_partition(&mut self, key: &K, buffer: Vec<E>) {
        if let Some(sorter) = self.partitions.get_mut(key) {
            sorter.recycle(buffer);
        }
    }

    /// Total buffered events across all partitions.
    pub fn len(&self) -> usize {
        self.partitions.values().map(|sorter| sorter.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partition_len(&self, key: &K) -> usize {
        self.partitions.get(key).map_or(0, |sorter| sorter.len())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn reset(&mut self) {
        for sorter in self.partitions.values_mut() {
            sorter.reset();
        }
    }

    pub fn pooled_leases(&self) -> usize {
        self.partitions
            .values()
            .map(|sorter| sorter.pooled_leases())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_sort_independently() {
        let mut buffer = PartitionedReorderBuffer::new(SortTechnique::ImpatienceSort);
        for t in [9, 4, 7] {
            buffer.enqueue("a", t);
        }
        buffer.enqueue("b", 100);
        assert_eq!(buffer.partition_count(), 2);
        assert_eq!(buffer.partition_len(&"a"), 3);

        // Disorder in "a" leaves "b" untouched.
        let mut drained = buffer.dequeue_until(9);
        drained.sort_by_key(|(key, _)| *key);
        assert_eq!(drained, vec![("a", vec![4, 7, 9])]);
        assert_eq!(buffer.partition_len(&"a"), 0);
        assert_eq!(buffer.partition_len(&"b"), 1);
    }

    #[test]
    fn single_partition_drain_leaves_others_buffered() {
        let mut buffer = PartitionedReorderBuffer::new(SortTechnique::PriorityQueue);
        buffer.enqueue(1u32, 5i64);
        buffer.enqueue(2u32, 3i64);
        let mut out = Vec::new();
        buffer.drain_partition_until(&1, 10, &mut out);
        assert_eq!(out, vec![5]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn unknown_partition_drains_nothing() {
        let mut buffer: PartitionedReorderBuffer<u32, i64> =
            PartitionedReorderBuffer::new(SortTechnique::ImpatienceSort);
        let (events, recheck) = buffer.dequeue_partition_until(&7, 10);
        assert!(events.is_none());
        assert!(!recheck);
    }
}
