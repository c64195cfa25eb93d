//! Discovery Tests - Registration of Reference Objects During Marking
//!
//! These tests verify that discovery:
//! - Links each accepted reference exactly once, LIFO, self-loop terminated
//! - Declines references for every documented reason, in order
//! - Chooses queues by worker id, round-robin or queue 0
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC DISCOVERY BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{assert_list_well_formed, walk_list, RefProcFixture};
use refproc::workers::with_worker_id;
use refproc::{
    Generation, GenerationScope, HeapOccupancy, ObjectTable, Oop, RediscoveryPolicy,
    RefProcConfig, ReferenceProcessor, ReferenceType,
};
use std::collections::HashSet;
use std::sync::Arc;

/// ============================================================================
/// SINGLE-THREADED DISCOVERY
/// ============================================================================

/// Test that every accepted reference is on the list exactly once
///
/// **Bug this finds:** Lost head updates, wrong length accounting
/// **Invariant verified:** length == number of `true` returns
#[test]
fn test_serial_discovery_links_each_reference_once() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let mut accepted = Vec::new();
    for _ in 0..25 {
        let (r, _) = fixture.reference_to_new(ReferenceType::Weak);
        if fixture.discover(r) {
            accepted.push(r);
        }
    }

    let list = fixture.rp.discovered_list(ReferenceType::Weak, 0);
    assert_eq!(list.length(), accepted.len());
    assert_list_well_formed(&fixture.table, list, "serial discovery");

    // LIFO: most recent first.
    let mut expected = accepted.clone();
    expected.reverse();
    assert_eq!(walk_list(&fixture.table, list), expected);
}

/// Test that kinds land on their own lists
///
/// **Bug this finds:** Kind-to-list index mixups
#[test]
fn test_kinds_use_separate_lists() {
    let fixture = RefProcFixture::serial();
    fixture.rp.setup_policy(true, &HeapOccupancy::default());
    fixture.rp.enable_discovery();

    for kind in ReferenceType::DISCOVERABLE {
        let (r, _) = fixture.reference_to_new(kind);
        assert!(fixture.discover(r), "{} should be discovered", kind.name());
    }

    for kind in ReferenceType::DISCOVERABLE {
        assert_eq!(
            fixture.rp.total_reference_count(kind),
            1,
            "{} list should hold exactly one reference",
            kind.name()
        );
    }
}

/// Test idempotent re-discovery
///
/// **Bug this finds:** Double linking, which creates a cycle
/// **Invariant verified:** Re-discovery returns true and changes nothing
#[test]
fn test_rediscovery_is_idempotent() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (a, _) = fixture.reference_to_new(ReferenceType::Phantom);
    let (b, _) = fixture.reference_to_new(ReferenceType::Phantom);
    assert!(fixture.discover(a));
    assert!(fixture.discover(b));

    let list = fixture.rp.discovered_list(ReferenceType::Phantom, 0);
    let before = walk_list(&fixture.table, list);

    assert!(fixture.discover(a));
    assert!(fixture.discover(b));

    assert_eq!(walk_list(&fixture.table, list), before);
    assert_eq!(list.length(), 2);
}

/// Test the ignore re-discovery policy
///
/// **Bug this finds:** Policy not consulted
#[test]
fn test_rediscovery_ignore_policy() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        rediscovery: RediscoveryPolicy::Ignore,
        ..RefProcConfig::serial()
    });
    fixture.rp.enable_discovery();

    let (r, _) = fixture.reference_to_new(ReferenceType::Weak);
    assert!(fixture.discover(r));
    assert!(!fixture.discover(r));
    assert_eq!(fixture.rp.total_reference_count(ReferenceType::Weak), 1);
}

/// ============================================================================
/// DECLINED DISCOVERY
/// ============================================================================

/// Test that nothing is discovered while discovery is disabled
///
/// **Bug this finds:** Discovery outside a marking cycle
#[test]
fn test_disabled_discovery_declines() {
    let fixture = RefProcFixture::serial();
    let (r, _) = fixture.reference_to_new(ReferenceType::Weak);

    assert!(!fixture.rp.discovery_enabled());
    assert!(!fixture.discover(r));
    assert_eq!(fixture.table.discovered(r), None);

    fixture.rp.enable_discovery();
    fixture.rp.disable_discovery();
    assert!(!fixture.discover(r));
}

/// Test that an inactive FinalReference is never rediscovered
///
/// **Bug this finds:** Finalizer run twice for one object
#[test]
fn test_inactive_final_declined() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (fin, _) = fixture.reference_to_new(ReferenceType::Final);
    fixture.table.set_next_raw(fin, Some(fin));

    assert!(!fixture.discover(fin));
    assert_eq!(fixture.rp.total_reference_count(ReferenceType::Final), 0);
}

/// Test that references outside the collected generation are declined
///
/// **Bug this finds:** Young collection discovering old references
#[test]
fn test_generation_scope_declines_old() {
    let table = Arc::new(ObjectTable::new());
    let rp = ReferenceProcessor::new(
        Arc::clone(&table),
        RefProcConfig::serial(),
        GenerationScope::new(Arc::clone(&table), Generation::Young),
    )
    .unwrap();

    let target = table.allocate(Generation::Young).unwrap();
    let young = table
        .allocate_reference(ReferenceType::Weak, Some(target), Generation::Young)
        .unwrap();
    let old = table
        .allocate_reference(ReferenceType::Weak, Some(target), Generation::Old)
        .unwrap();

    rp.enable_discovery();
    assert!(rp.discover_reference(young, ReferenceType::Weak));
    assert!(!rp.discover_reference(old, ReferenceType::Weak));
}

/// Test that a referent known reachable skips discovery
///
/// **Bug this finds:** Oracle ignored, extra work in every phase
#[test]
fn test_is_alive_non_header_declines_reachable() {
    let table = Arc::new(ObjectTable::new());
    let live = table.allocate(Generation::Young).unwrap();
    let dead = table.allocate(Generation::Young).unwrap();
    let r_live = table
        .allocate_reference(ReferenceType::Weak, Some(live), Generation::Young)
        .unwrap();
    let r_dead = table
        .allocate_reference(ReferenceType::Weak, Some(dead), Generation::Young)
        .unwrap();
    let r_null = table
        .allocate_reference(ReferenceType::Weak, None, Generation::Young)
        .unwrap();

    let mut rp = ReferenceProcessor::new(Arc::clone(&table), RefProcConfig::serial(), refproc::WholeHeap)
        .unwrap();
    rp.set_is_alive_non_header(Some(Arc::new(move |obj: Oop| obj == live)));
    assert!(rp.is_alive_non_header().is_some());

    rp.enable_discovery();
    assert!(!rp.discover_reference(r_live, ReferenceType::Weak));
    assert!(rp.discover_reference(r_dead, ReferenceType::Weak));
    // A null referent still proceeds to discovery.
    assert!(rp.discover_reference(r_null, ReferenceType::Weak));
}

/// Test the soft reference LRU policy during discovery
///
/// **Bug this finds:** Recently used soft references cleared early
/// **Invariant verified:** clear iff clock - timestamp > max interval
#[test]
fn test_soft_lru_policy() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        soft_ref_policy: refproc::SoftRefPolicyKind::LruCurrentHeap,
        soft_ref_lru_policy_ms_per_mb: 10,
        ..RefProcConfig::serial()
    });
    // 2 MB free: interval 20 ms
    fixture.rp.setup_policy(
        false,
        &HeapOccupancy {
            free_bytes: 2 * 1024 * 1024,
            used_bytes: 0,
            max_bytes: 0,
        },
    );
    fixture.rp.enable_discovery();
    let clock = fixture.rp.soft_ref_timestamp_clock();

    let (fresh, _) = fixture.reference_to_new(ReferenceType::Soft);
    fixture.table.set_soft_timestamp(fresh, clock - 20);
    let (stale, _) = fixture.reference_to_new(ReferenceType::Soft);
    fixture.table.set_soft_timestamp(stale, clock - 21);

    assert!(!fixture.discover(fresh));
    assert!(fixture.discover(stale));
}

/// ============================================================================
/// QUEUE SELECTION
/// ============================================================================

/// Test that MT discovery uses the worker's own queue
///
/// **Bug this finds:** Workers contending on one list
#[test]
fn test_mt_discovery_uses_worker_queue() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        mt_processing_degree: 4,
        mt_discovery_degree: 4,
        ..Default::default()
    });
    assert!(fixture.rp.discovery_is_mt());
    fixture.rp.enable_discovery();

    let (r2, _) = fixture.reference_to_new(ReferenceType::Weak);
    let (r3, _) = fixture.reference_to_new(ReferenceType::Weak);
    let (r0, _) = fixture.reference_to_new(ReferenceType::Weak);

    assert!(with_worker_id(2, || fixture.discover(r2)));
    assert!(with_worker_id(3, || fixture.discover(r3)));
    // Outside any worker the caller acts as worker 0.
    assert!(fixture.discover(r0));

    let heads: HashSet<(usize, Oop)> = fixture
        .rp
        .discovered_lists(ReferenceType::Weak)
        .iter()
        .enumerate()
        .filter_map(|(q, list)| list.head().map(|h| (q, h)))
        .collect();
    assert_eq!(heads, [(0, r0), (2, r2), (3, r3)].into_iter().collect());
}

/// Test round-robin queue selection for serial discovery feeding MT processing
///
/// **Bug this finds:** All work on queue 0, balancing needed every cycle
#[test]
fn test_round_robin_spreads_evenly() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        mt_processing_degree: 4,
        mt_discovery_degree: 1,
        ..Default::default()
    });
    assert!(!fixture.rp.discovery_is_mt());
    assert!(fixture.rp.processing_is_mt());
    fixture.rp.enable_discovery();

    for _ in 0..40 {
        let (r, _) = fixture.reference_to_new(ReferenceType::Final);
        assert!(fixture.discover(r));
    }

    for (q, list) in fixture
        .rp
        .discovered_lists(ReferenceType::Final)
        .iter()
        .enumerate()
    {
        assert_eq!(list.length(), 10, "queue {} unevenly filled", q);
        assert_list_well_formed(&fixture.table, list, "round robin");
    }
}

/// ============================================================================
/// DISCOVERY THROUGH THE MARKER
/// ============================================================================

/// Test that tracing does not offer a reference whose referent is reachable
///
/// **Bug this finds:** Live referents queued for processing, pending
/// references relinked
#[test]
fn test_marker_skips_marked_referent() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (r, referent) = fixture.reference_to_new(ReferenceType::Weak);
    fixture.marker.mark_roots([referent, r]);
    fixture.marker.trace_discovering(&fixture.rp);

    assert_eq!(fixture.rp.total_reference_count(ReferenceType::Weak), 0);
    assert_eq!(fixture.table.discovered(r), None);
    assert!(fixture.marker.is_marked(r));
}

/// Test that tracing discovers a reference with an unmarked referent
///
/// **Bug this finds:** Referent traced strongly, so nothing is ever cleared
#[test]
fn test_marker_discovers_unmarked_referent() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (r, referent) = fixture.reference_to_new(ReferenceType::Weak);
    fixture.marker.mark_roots([r]);
    fixture.marker.trace_discovering(&fixture.rp);

    assert_eq!(fixture.rp.discovered_list(ReferenceType::Weak, 0).head(), Some(r));
    assert!(!fixture.marker.is_marked(referent));
}

/// Test that a reference still on the pending list is left alone
///
/// **Bug this finds:** Rediscovery overwriting the pending link, so the
/// pending chain loops and hands the reference out twice
#[test]
fn test_marker_leaves_pending_reference_alone() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        concurrent_discovery: true,
        ..RefProcConfig::serial()
    });

    let (r, _) = fixture.reference_to_new(ReferenceType::Weak);

    // First cycle: r is cleared and published, nobody drains the pending list.
    fixture.rp.enable_discovery();
    fixture.marker.mark_roots([r]);
    fixture.marker.trace_discovering(&fixture.rp);
    fixture.process(None);
    assert_eq!(fixture.table.referent(r), None);

    // Second cycle reaches r again.
    fixture.marker.reset();
    fixture.rp.enable_discovery();
    fixture.marker.mark_roots([r]);
    fixture.marker.trace_discovering(&fixture.rp);

    assert_eq!(fixture.rp.total_reference_count(ReferenceType::Weak), 0);
    assert_eq!(fixture.pending(), vec![r]);
}

/// ============================================================================
/// MT DISCOVERY OUTSIDE THE WORKER POOL
/// ============================================================================

/// Test that threads without a worker id can share queue 0
///
/// **Bug this finds:** Lost head updates orphaning references that can then
/// never be discovered again
#[test]
fn test_mt_discovery_from_plain_threads() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 500;

    for _ in 0..10 {
        let fixture = RefProcFixture::with_config(RefProcConfig {
            mt_processing_degree: THREADS,
            mt_discovery_degree: THREADS,
            ..Default::default()
        });
        fixture.rp.enable_discovery();

        let batches: Vec<Vec<Oop>> = (0..THREADS)
            .map(|_| {
                (0..PER_THREAD)
                    .map(|_| fixture.reference_to_new(ReferenceType::Weak).0)
                    .collect()
            })
            .collect();

        std::thread::scope(|s| {
            for batch in &batches {
                let fixture = &fixture;
                s.spawn(move || {
                    for &r in batch {
                        assert!(fixture.discover(r));
                    }
                });
            }
        });

        let list = fixture.rp.discovered_list(ReferenceType::Weak, 0);
        assert_list_well_formed(&fixture.table, list, "shared queue 0");
        assert_eq!(list.length(), THREADS * PER_THREAD);
    }
}
