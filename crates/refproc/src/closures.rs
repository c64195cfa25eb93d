//! Closures - Collector Callbacks Consumed by Reference Processing
//!
//! The processor never marks, copies or scans on its own. It asks the
//! collector through these small traits:
//!
//! - [`IsAlive`] - is this object strongly reachable?
//! - [`KeepAlive`] - make the object in this field reachable (may defer)
//! - [`EnqueueDiscoveredField`] - store into a discovered field, with barriers
//! - [`CompleteGc`] - drain deferred keep-alive work
//! - [`YieldCheck`] - should precleaning give up early?
//! - [`DiscoveryScope`] - is this reference in the part of the heap being collected?
//!
//! Single-method traits are implemented for plain closures, so tests can pass
//! `&|obj| ...` directly.

use crate::object::{FieldAddr, Generation, ObjectTable, Oop};
use std::sync::Arc;

/// Strong reachability oracle
pub trait IsAlive: Send + Sync {
    fn is_alive(&self, obj: Oop) -> bool;
}

impl<F> IsAlive for F
where
    F: Fn(Oop) -> bool + Send + Sync,
{
    fn is_alive(&self, obj: Oop) -> bool {
        self(obj)
    }
}

/// Keep-alive visitor
///
/// Called with the address of a referent field. Implementations may push the
/// object on a mark stack and finish later; the work must be complete when
/// the matching [`CompleteGc::complete`] returns.
pub trait KeepAlive {
    fn keep_alive(&self, field: FieldAddr);
}

impl<F> KeepAlive for F
where
    F: Fn(FieldAddr),
{
    fn keep_alive(&self, field: FieldAddr) {
        self(field)
    }
}

/// Store into a discovered field during enqueueing
pub trait EnqueueDiscoveredField {
    fn enqueue(&self, field: FieldAddr, value: Option<Oop>);
}

impl<F> EnqueueDiscoveredField for F
where
    F: Fn(FieldAddr, Option<Oop>),
{
    fn enqueue(&self, field: FieldAddr, value: Option<Oop>) {
        self(field, value)
    }
}

/// Transitive closure step after keep-alive work
pub trait CompleteGc {
    fn complete(&self);
}

impl<F> CompleteGc for F
where
    F: Fn(),
{
    fn complete(&self) {
        self()
    }
}

/// Abort check for precleaning
pub trait YieldCheck {
    /// Checked before each list
    fn should_return(&self) -> bool;

    /// Checked before each reference
    fn should_return_fine_grain(&self) -> bool {
        false
    }
}

impl<F> YieldCheck for F
where
    F: Fn() -> bool,
{
    fn should_return(&self) -> bool {
        self()
    }
}

/// Yield check that never aborts
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverYield;

impl YieldCheck for NeverYield {
    fn should_return(&self) -> bool {
        false
    }
}

/// Span predicate: only references inside the collected region are discovered
pub trait DiscoveryScope: Send + Sync {
    fn is_subject_to_discovery(&self, obj: Oop) -> bool;
}

impl<F> DiscoveryScope for F
where
    F: Fn(Oop) -> bool + Send + Sync,
{
    fn is_subject_to_discovery(&self, obj: Oop) -> bool {
        self(obj)
    }
}

/// Every object is subject to discovery
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeHeap;

impl DiscoveryScope for WholeHeap {
    fn is_subject_to_discovery(&self, _obj: Oop) -> bool {
        true
    }
}

/// Only objects of one generation are subject to discovery
///
/// Young collections use `GenerationScope::new(table, Generation::Young)`.
pub struct GenerationScope {
    table: Arc<ObjectTable>,
    generation: Generation,
}

impl GenerationScope {
    pub fn new(table: Arc<ObjectTable>, generation: Generation) -> Self {
        Self { table, generation }
    }
}

impl DiscoveryScope for GenerationScope {
    fn is_subject_to_discovery(&self, obj: Oop) -> bool {
        self.table.generation(obj) == self.generation
    }
}

/// Plain store into the discovered field
pub struct RawEnqueue<'a> {
    table: &'a ObjectTable,
}

impl<'a> RawEnqueue<'a> {
    pub fn new(table: &'a ObjectTable) -> Self {
        Self { table }
    }
}

impl EnqueueDiscoveredField for RawEnqueue<'_> {
    fn enqueue(&self, field: FieldAddr, value: Option<Oop>) {
        self.table.store_field(field, value);
    }
}

/// Store followed by a post-write barrier hook
///
/// Collectors with remembered sets record the updated field in `post_barrier`.
pub struct BarrierEnqueue<'a, F> {
    table: &'a ObjectTable,
    post_barrier: F,
}

impl<'a, F> BarrierEnqueue<'a, F>
where
    F: Fn(FieldAddr, Option<Oop>),
{
    pub fn new(table: &'a ObjectTable, post_barrier: F) -> Self {
        Self {
            table,
            post_barrier,
        }
    }
}

impl<F> EnqueueDiscoveredField for BarrierEnqueue<'_, F>
where
    F: Fn(FieldAddr, Option<Oop>),
{
    fn enqueue(&self, field: FieldAddr, value: Option<Oop>) {
        self.table.store_field(field, value);
        (self.post_barrier)(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ReferenceType;
    use std::cell::RefCell;

    #[test]
    fn test_closure_impls() {
        let alive = |obj: Oop| obj.index() % 2 == 0;
        assert!(alive.is_alive(Oop::from_index(2)));
        assert!(!alive.is_alive(Oop::from_index(3)));

        let yielding = || true;
        assert!(yielding.should_return());
        assert!(!yielding.should_return_fine_grain());
        assert!(!NeverYield.should_return());
    }

    #[test]
    fn test_barrier_enqueue_records_store() {
        let table = ObjectTable::new();
        let a = table
            .allocate_reference(ReferenceType::Weak, None, Generation::Young)
            .unwrap();
        let b = table
            .allocate_reference(ReferenceType::Weak, None, Generation::Young)
            .unwrap();

        let seen = RefCell::new(Vec::new());
        let enqueue = BarrierEnqueue::new(&table, |field, value| {
            seen.borrow_mut().push((field, value))
        });
        enqueue.enqueue(FieldAddr::discovered(a), Some(b));

        assert_eq!(table.discovered(a), Some(b));
        assert_eq!(*seen.borrow(), vec![(FieldAddr::discovered(a), Some(b))]);
    }

    #[test]
    fn test_generation_scope() {
        let table = Arc::new(ObjectTable::new());
        let young = table
            .allocate_reference(ReferenceType::Weak, None, Generation::Young)
            .unwrap();
        let old = table
            .allocate_reference(ReferenceType::Weak, None, Generation::Old)
            .unwrap();

        let scope = GenerationScope::new(Arc::clone(&table), Generation::Young);
        assert!(scope.is_subject_to_discovery(young));
        assert!(!scope.is_subject_to_discovery(old));
        assert!(WholeHeap.is_subject_to_discovery(old));
    }
}
