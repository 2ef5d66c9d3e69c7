//! Bounded, drop-oldest queue used wherever backpressure must never stall
//! the producer: capture-engine sinks and the live streamer's send queues.
//!
//! A slow consumer (a stalled websocket write, a sink that isn't being
//! drained) must never block the capture pipeline. Once the queue is full,
//! the oldest buffered item is evicted to make room for the new one, and
//! the eviction is reported back to the caller so it can be counted as a
//! dropped frame rather than silently disappearing.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A queue with a fixed capacity that silently drops the oldest entry when
/// full rather than rejecting or blocking the producer.
pub struct BoundedLossyQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedLossyQueue<T> {
    /// Creates a queue that holds at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedLossyQueue capacity must be non-zero");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Pushes an item, evicting the oldest one if the queue is already at
    /// capacity. Returns the evicted item, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut guard = self.inner.lock();
        let evicted = if guard.len() >= self.capacity {
            guard.pop_front()
        } else {
            None
        };
        guard.push_back(item);
        evicted
    }

    /// Pops the oldest item, if any.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Returns the number of items currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured maximum depth.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drains every buffered item, in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_below_capacity_evicts_nothing() {
        let q = BoundedLossyQueue::new(3);
        assert!(q.push(1).is_none());
        assert!(q.push(2).is_none());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn push_at_capacity_evicts_oldest() {
        let q = BoundedLossyQueue::new(2);
        assert!(q.push(1).is_none());
        assert!(q.push(2).is_none());
        let evicted = q.push(3);
        assert_eq!(evicted, Some(1));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _: BoundedLossyQueue<u8> = BoundedLossyQueue::new(0);
    }

    #[test]
    fn drain_returns_fifo_order_and_empties_queue() {
        let q = BoundedLossyQueue::new(4);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.drain(), vec![1, 2, 3]);
        assert!(q.is_empty());
    }
}
