//! Object pools backing the steady-state hot path.
//!
//! Fibers, merge buffers and batches are recycled rather than reallocated.
//! Pools grow on demand and are owned by a single pipe, so no synchronization
//! is involved. Each pool tracks its leased count so tests (and disposal) can
//! assert that everything borrowed was eventually returned.

use crate::model::batch::EventBatch;
use std::collections::VecDeque;

/// A container that can be wiped and handed out again.
pub trait Recyclable: Default {
    fn reset(&mut self);
}

impl<T> Recyclable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Recyclable for VecDeque<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A grow-on-demand free list of reusable containers.
#[derive(Debug)]
pub struct ObjectPool<C: Recyclable> {
    free: Vec<C>,
    leased: usize,
}

impl<C: Recyclable> Default for ObjectPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Recyclable> ObjectPool<C> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            leased: 0,
        }
    }

    /// Borrow a container, creating one if the free list is empty.
    pub fn get(&mut self) -> C {
        self.leased += 1;
        self.free.pop().unwrap_or_default()
    }

    /// Return a container to the free list.
    pub fn put(&mut self, mut container: C) {
        container.reset();
        self.free.push(container);
        self.leased = self.leased.saturating_sub(1);
    }

    /// Containers currently borrowed and not yet returned.
    pub fn leased(&self) -> usize {
        self.leased
    }
}

/// Pool of contiguous merge buffers.
pub type BufferPool<E> = ObjectPool<Vec<E>>;
/// Pool of FIFO fiber storage.
pub type QueuePool<E> = ObjectPool<VecDeque<E>>;

/// Pool of columnar event batches, all sized to the configured capacity.
#[derive(Debug)]
pub struct BatchPool<K, P> {
    free: Vec<EventBatch<K, P>>,
    leased: usize,
    batch_size: usize,
}

impl<K, P> BatchPool<K, P> {
    pub fn new(batch_size: usize) -> Self {
        Self {
            free: Vec::new(),
            leased: 0,
            batch_size,
        }
    }

    /// Borrow an empty batch of the configured capacity.
    pub fn acquire(&mut self) -> EventBatch<K, P> {
        self.leased += 1;
        match self.free.pop() {
            Some(batch) => batch,
            None => EventBatch::with_capacity(self.batch_size),
        }
    }

    /// Return an unsealed batch; its storage is wiped and reused.
    pub fn release(&mut self, mut batch: EventBatch<K, P>) {
        batch.reset();
        self.free.push(batch);
        self.leased = self.leased.saturating_sub(1);
    }

    /// Account for a sealed batch whose ownership moved downstream.
    pub fn transfer(&mut self) {
        self.leased = self.leased.saturating_sub(1);
    }

    /// Batches currently borrowed and neither returned nor transferred.
    pub fn leased(&self) -> usize {
        self.leased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_round_trip_through_the_pool() {
        let mut pool: BufferPool<i64> = BufferPool::new();
        let mut a = pool.get();
        a.push(1);
        let b: Vec<i64> = pool.get();
        assert_eq!(pool.leased(), 2);
        pool.put(a);
        pool.put(b);
        assert_eq!(pool.leased(), 0);
        // Recycled buffers come back empty.
        let c = pool.get();
        assert!(c.is_empty());
    }

    #[test]
    fn batch_transfer_accounts_for_downstream_ownership() {
        let mut pool: BatchPool<(), u64> = BatchPool::new(4);
        let batch = pool.acquire();
        let working = pool.acquire();
        assert_eq!(pool.leased(), 2);
        drop(batch); // sealed and handed downstream
        pool.transfer();
        pool.release(working);
        assert_eq!(pool.leased(), 0);
    }
}
