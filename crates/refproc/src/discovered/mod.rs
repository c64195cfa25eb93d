//! Discovered Lists
//!
//! A discovered list is a LIFO chain of reference objects threaded through
//! their `discovered` fields. The tail links to itself, so a non-null
//! `discovered` field always means "on some list":
//!
//! ```text
//! head ──► R3 ──► R2 ──► R1 ─┐
//!                       ▲    │
//!                       └────┘   (self-loop terminates)
//! ```
//!
//! Lists are owned by a [`ReferenceProcessor`](crate::ReferenceProcessor),
//! one per (kind, queue). Head and length are atomics so the processor can
//! hand out shared references to disjoint lists across workers. During
//! processing a list is only mutated by the worker that owns its queue;
//! parallel discovery pushes with [`DiscoveredList::cas_head`], so threads
//! sharing a queue do not lose each other's entries.

pub mod iterator;

pub use iterator::DiscoveredListIterator;

use crate::object::Oop;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One discovered list
#[derive(Debug, Default)]
pub struct DiscoveredList {
    head: AtomicUsize,
    length: AtomicUsize,
}

impl DiscoveredList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently discovered reference
    #[inline]
    pub fn head(&self) -> Option<Oop> {
        Oop::decode(self.head.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_head(&self, obj: Option<Oop>) {
        self.head.store(Oop::encode(obj), Ordering::Release);
    }

    /// Push `obj` as the new head
    ///
    /// The caller has already linked `obj.discovered` to the old head (or to
    /// itself if the list was empty).
    #[inline]
    pub fn add_as_head(&self, obj: Oop) {
        self.set_head(Some(obj));
        self.inc_length(1);
    }

    /// Push `obj` as the new head if the head is still `expected`
    ///
    /// On success the length is incremented. The caller has linked
    /// `obj.discovered` to `expected` (or to itself for an empty list).
    pub fn cas_head(&self, expected: Option<Oop>, obj: Oop) -> bool {
        let pushed = self
            .head
            .compare_exchange(
                Oop::encode(expected),
                Oop::encode(Some(obj)),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if pushed {
            self.inc_length(1);
        }
        pushed
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head().is_none()
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Acquire)
    }

    pub fn set_length(&self, len: usize) {
        self.length.store(len, Ordering::Release);
    }

    pub fn inc_length(&self, inc: usize) {
        self.length.fetch_add(inc, Ordering::AcqRel);
    }

    pub fn dec_length(&self, dec: usize) {
        let prev = self.length.fetch_sub(dec, Ordering::AcqRel);
        debug_assert!(prev >= dec, "discovered list length underflow");
    }

    /// Forget the contents; does not touch any object
    pub fn clear(&self) {
        self.set_head(None);
        self.set_length(0);
    }
}
