//! Test Utilities for the refproc Bug-Finding Test Suite
//!
//! This module provides a fixture wiring an object table, a reference
//! processor and a marker together, plus STRICT structural assertions over
//! discovered lists and the pending list.
//!
//! ============================================================================
//! CRITICAL: These utilities are designed to FIND BUGS, not to have passing tests.
//! ============================================================================

#![allow(dead_code)]

use refproc::{
    ClosureProxyTask, DiscoveredList, Generation, Marker, ObjectTable, Oop, PhaseTimes,
    RawEnqueue, RefProcConfig, ReferenceProcessor, ReferenceProcessorStats, ReferenceType,
    WholeHeap, WorkerThreads,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Maximum test duration before timeout
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ============================================================================
/// REFERENCE PROCESSING FIXTURE
/// ============================================================================

/// Test fixture for reference processing
///
/// Provides a fresh table, processor and marker for each test.
pub struct RefProcFixture {
    pub table: Arc<ObjectTable>,
    pub rp: ReferenceProcessor,
    pub marker: Marker,
    pub phase_times: PhaseTimes,
}

impl RefProcFixture {
    /// Create fixture with single-threaded discovery and processing
    ///
    /// **Bug this finds:** Construction and validation bugs in the serial path
    pub fn serial() -> Self {
        Self::with_config(RefProcConfig::serial())
    }

    /// Create fixture with custom configuration
    ///
    /// **Bug this finds:** Queue sizing bugs for unusual degrees
    pub fn with_config(config: RefProcConfig) -> Self {
        let table = Arc::new(ObjectTable::new());
        let max_workers = config.max_num_queues();
        let rp = ReferenceProcessor::new(Arc::clone(&table), config, WholeHeap)
            .expect("processor construction should succeed with valid config");
        let marker = Marker::new(Arc::clone(&table));

        Self {
            table,
            rp,
            marker,
            phase_times: PhaseTimes::new(max_workers),
        }
    }

    /// Allocate a plain object
    pub fn object(&self) -> Oop {
        self.table
            .allocate(Generation::Young)
            .unwrap_or_else(|e| panic!("object allocation failed: {}", e))
    }

    /// Allocate a reference object of `kind` pointing at `referent`
    pub fn reference(&self, kind: ReferenceType, referent: Option<Oop>) -> Oop {
        self.table
            .allocate_reference(kind, referent, Generation::Young)
            .unwrap_or_else(|e| panic!("reference allocation failed: {}", e))
    }

    /// Allocate a reference of `kind` to a fresh object; returns (reference, referent)
    pub fn reference_to_new(&self, kind: ReferenceType) -> (Oop, Oop) {
        let referent = self.object();
        (self.reference(kind, Some(referent)), referent)
    }

    /// Offer `obj` for discovery under its own kind
    pub fn discover(&self, obj: Oop) -> bool {
        self.rp.discover_reference(obj, self.table.reference_type(obj))
    }

    /// Mark `objs` and everything strongly reachable from them
    pub fn mark_live(&self, objs: &[Oop]) {
        self.marker.mark_from_roots(objs.iter().copied());
    }

    /// Run all phases with the marker as liveness and keep-alive oracle
    ///
    /// **Bug this finds:** Phase ordering bugs, lists left non-empty
    pub fn process(&self, workers: Option<&WorkerThreads>) -> ReferenceProcessorStats {
        let enqueue = RawEnqueue::new(&self.table);
        let mut proxy = ClosureProxyTask::uniform(&self.marker, &enqueue);
        self.rp
            .process_discovered_references(&mut proxy, workers, &self.phase_times)
    }

    /// Detach the pending list
    pub fn pending(&self) -> Vec<Oop> {
        self.table.take_pending_list()
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Walk a discovered list from its head to the self-looped tail
///
/// Panics if the walk exceeds the table size (a cycle not through the tail).
pub fn walk_list(table: &ObjectTable, list: &DiscoveredList) -> Vec<Oop> {
    let mut out = Vec::new();
    let mut cur = list.head();
    while let Some(obj) = cur {
        out.push(obj);
        assert!(
            out.len() <= table.len(),
            "discovered list walk exceeded table size - cycle not through the tail"
        );
        let next = table
            .discovered(obj)
            .unwrap_or_else(|| panic!("{} on a discovered list has a null discovered field", obj));
        cur = if next == obj { None } else { Some(next) };
    }
    out
}

/// Assert that a list is well formed
///
/// **Bug this finds:** Broken splices, wrong lengths, lost self-loops
/// **Tolerance:** ZERO - A malformed list corrupts every later phase
#[track_caller]
pub fn assert_list_well_formed(table: &ObjectTable, list: &DiscoveredList, context: &str) {
    let elems = walk_list(table, list);

    assert_eq!(
        elems.len(),
        list.length(),
        "{}: list holds {} elements but records length {}",
        context,
        elems.len(),
        list.length()
    );

    let unique: HashSet<_> = elems.iter().collect();
    assert_eq!(
        unique.len(),
        elems.len(),
        "{}: element appears twice in one discovered list",
        context
    );

    if let Some(tail) = elems.last() {
        assert_eq!(
            table.discovered(*tail),
            Some(*tail),
            "{}: tail {} does not link to itself",
            context,
            tail
        );
    }
}

/// Assert that every discovered list of every kind is empty
///
/// **Bug this finds:** References left behind after processing or abandoning
#[track_caller]
pub fn assert_all_lists_empty(rp: &ReferenceProcessor, context: &str) {
    for kind in ReferenceType::DISCOVERABLE {
        for (queue, list) in rp.discovered_lists(kind).iter().enumerate() {
            assert!(
                list.is_empty() && list.length() == 0,
                "{}: {} list {} still holds {} references",
                context,
                kind.name(),
                queue,
                list.length()
            );
        }
    }
}

/// Assert that `pending` contains exactly `expected`, each once
///
/// **Bug this finds:** Lost or duplicated references on the pending chain
/// **Tolerance:** ZERO - a duplicate is enqueued twice to user code
#[track_caller]
pub fn assert_pending_exactly(pending: &[Oop], expected: &[Oop], context: &str) {
    let pending_set: HashSet<_> = pending.iter().copied().collect();
    assert_eq!(
        pending_set.len(),
        pending.len(),
        "{}: pending list contains duplicates: {:?}",
        context,
        pending
    );

    let expected_set: HashSet<_> = expected.iter().copied().collect();
    assert_eq!(
        pending_set, expected_set,
        "{}: pending list mismatch",
        context
    );
}

/// Assert that operation completed within timeout
///
/// **Bug this finds:** Deadlock in worker dispatch, livelock in CAS loops
#[track_caller]
pub fn assert_completed_within_timeout<F, R>(operation: F, timeout: Duration, context: &str) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = operation();
    let elapsed = start.elapsed();

    assert!(
        elapsed < timeout,
        "{}: Operation took {:?}, exceeded timeout of {:?} - possible deadlock",
        context,
        elapsed,
        timeout
    );

    result
}
