//! Marker Module - Strong Reachability over the Object Table
//!
//! A small tracing marker that supplies the closures reference processing
//! needs:
//!
//! - [`IsAlive`]: the object's mark bit
//! - [`KeepAlive`]: mark the referent and queue it grey
//! - [`CompleteGc`]: drain the grey queue along strong edges
//!
//! Referents are not strong edges, so tracing never reaches an object only
//! through a reference. [`Marker::trace_discovering`] additionally offers
//! reached reference objects with an unmarked referent to a
//! [`ReferenceProcessor`]; references it declines are traced strongly, the way a collector treats a reference
//! whose referent is already known reachable.

pub mod mark_queue;

pub use mark_queue::MarkQueue;

use crate::closures::{CompleteGc, IsAlive, KeepAlive};
use crate::object::{FieldAddr, ObjectTable, Oop, ReferenceType};
use crate::processor::ReferenceProcessor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Marker - tracing marker over an [`ObjectTable`]
pub struct Marker {
    table: Arc<ObjectTable>,
    queue: MarkQueue,

    /// Objects marked since the last reset
    marked_count: AtomicU64,
}

impl Marker {
    pub fn new(table: Arc<ObjectTable>) -> Self {
        Self {
            table,
            queue: MarkQueue::new(),
            marked_count: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &Arc<ObjectTable> {
        &self.table
    }

    /// Mark `obj` and queue it grey; true if it was unmarked
    pub fn mark_and_push(&self, obj: Oop) -> bool {
        if self.table.mark(obj) {
            self.marked_count.fetch_add(1, Ordering::Relaxed);
            self.queue.push(obj);
            true
        } else {
            false
        }
    }

    /// Mark root objects without tracing
    pub fn mark_roots(&self, roots: impl IntoIterator<Item = Oop>) {
        for root in roots {
            self.mark_and_push(root);
        }
    }

    /// Drain the grey queue along strong edges
    pub fn drain(&self) {
        while let Some(obj) = self.queue.pop() {
            for child in self.table.fields(obj) {
                self.mark_and_push(child);
            }
        }
    }

    /// Mark everything strongly reachable from `roots`
    pub fn mark_from_roots(&self, roots: impl IntoIterator<Item = Oop>) {
        self.mark_roots(roots);
        self.drain();
    }

    /// Drain the grey queue, offering reference objects for discovery
    ///
    /// Only references whose referent is non-null and not yet marked are
    /// offered; the others have nothing to defer and are traced as plain
    /// objects. A reference that `rp` does not discover has its referent
    /// traced like a strong field.
    pub fn trace_discovering(&self, rp: &ReferenceProcessor) {
        while let Some(obj) = self.queue.pop() {
            let kind = self.table.reference_type(obj);
            if kind.is_reference() {
                self.try_discover(rp, obj, kind);
            }
            for child in self.table.fields(obj) {
                self.mark_and_push(child);
            }
        }
    }

    fn try_discover(&self, rp: &ReferenceProcessor, obj: Oop, kind: ReferenceType) {
        // Cleared, or reachable already: includes references still waiting
        // on the pending list, whose discovered field must not be touched.
        let Some(referent) = self.table.referent(obj) else {
            return;
        };
        if self.table.is_marked(referent) {
            return;
        }
        if !rp.discover_reference(obj, kind) {
            self.mark_and_push(referent);
        }
    }

    pub fn is_marked(&self, obj: Oop) -> bool {
        self.table.is_marked(obj)
    }

    pub fn marked_count(&self) -> u64 {
        self.marked_count.load(Ordering::Relaxed)
    }

    /// Objects pushed grey since the last reset
    pub fn grey_count(&self) -> usize {
        self.queue.enqueued_count()
    }

    /// Clear all mark bits and pending work
    pub fn reset(&self) {
        self.table.clear_marks();
        self.queue.clear();
        self.marked_count.store(0, Ordering::Relaxed);
    }
}

impl IsAlive for Marker {
    fn is_alive(&self, obj: Oop) -> bool {
        self.table.is_marked(obj)
    }
}

impl KeepAlive for Marker {
    fn keep_alive(&self, field: FieldAddr) {
        if let Some(obj) = self.table.load_field(field) {
            self.mark_and_push(obj);
        }
    }
}

impl CompleteGc for Marker {
    fn complete(&self) {
        self.drain();
    }
}
