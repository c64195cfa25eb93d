//! Mark Queue - Concurrent Work Queue for Marking
//!
//! Lock-free queue of grey objects. Keep-alive closures running on several
//! workers push into the same queue; whoever calls `complete` drains it.

use crate::object::Oop;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// MarkQueue - multi-producer multi-consumer queue of grey objects
pub struct MarkQueue {
    queue: SegQueue<Oop>,

    enqueued_count: AtomicUsize,
    processed_count: AtomicUsize,
}

impl MarkQueue {
    /// Create new mark queue
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            enqueued_count: AtomicUsize::new(0),
            processed_count: AtomicUsize::new(0),
        }
    }

    /// Push a grey object
    pub fn push(&self, obj: Oop) {
        self.queue.push(obj);
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop a grey object, None if empty
    pub fn pop(&self) -> Option<Oop> {
        let obj = self.queue.pop();
        if obj.is_some() {
            self.processed_count.fetch_add(1, Ordering::Relaxed);
        }
        obj
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Objects ever pushed
    pub fn enqueued_count(&self) -> usize {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    /// Objects ever popped
    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }

    /// Drop pending work and reset counters
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
        self.enqueued_count.store(0, Ordering::Relaxed);
        self.processed_count.store(0, Ordering::Relaxed);
    }
}

impl Default for MarkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let queue = MarkQueue::new();
        queue.push(Oop::from_index(1));
        queue.push(Oop::from_index(2));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(Oop::from_index(1)));
        assert_eq!(queue.pop(), Some(Oop::from_index(2)));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.enqueued_count(), 2);
        assert_eq!(queue.processed_count(), 2);
    }

    #[test]
    fn test_concurrent_push() {
        let queue = MarkQueue::new();
        std::thread::scope(|s| {
            for t in 0..4 {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..100 {
                        queue.push(Oop::from_index(t * 100 + i));
                    }
                });
            }
        });
        assert_eq!(queue.len(), 400);
        queue.clear();
        assert!(queue.is_empty());
    }
}
