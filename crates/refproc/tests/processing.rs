//! Processing Tests - Phase Semantics of process_discovered_references
//!
//! These tests verify that processing:
//! - Drops cleared and live references and keeps live referents alive
//! - Clears and publishes dead soft, weak and phantom references
//! - Resurrects final referents, marks FinalReferences inactive, publishes them
//! - Leaves every discovered list empty and records statistics
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC PROCESSING BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{assert_all_lists_empty, assert_pending_exactly, RefProcFixture};
use refproc::logging::RefProcEvent;
use refproc::stats::RefProcPhase;
use refproc::{HeapOccupancy, Oop, RefProcConfig, ReferenceHandler, ReferenceType};
use std::sync::Arc;

/// ============================================================================
/// SCENARIOS
/// ============================================================================

/// Ten weak references: four cleared by mutators, three live, three dead
///
/// **Bug this finds:** Cleared referents not tolerated under concurrent
/// discovery, live references enqueued, dead referents not cleared
/// **Invariant verified:** 7 dropped, exactly the 3 dead ones pending
#[test]
fn test_mixed_weak_references() {
    let fixture = RefProcFixture::with_config(RefProcConfig {
        concurrent_discovery: true,
        ..RefProcConfig::serial()
    });
    fixture.rp.enable_discovery();

    let mut cleared = Vec::new();
    let mut live = Vec::new();
    let mut dead = Vec::new();
    for i in 0..10 {
        let (r, referent) = fixture.reference_to_new(ReferenceType::Weak);
        assert!(fixture.discover(r));
        match i % 10 {
            0..=3 => cleared.push(r),
            4..=6 => live.push((r, referent)),
            _ => dead.push((r, referent)),
        }
    }

    // Mutators clear after discovery.
    for &r in &cleared {
        fixture.table.clear_referent(r);
    }
    let live_referents: Vec<Oop> = live.iter().map(|(_, referent)| *referent).collect();
    fixture.mark_live(&live_referents);

    let stats = fixture.process(None);

    assert_eq!(stats.weak_count, 10);
    assert_eq!(fixture.phase_times.ref_dropped(ReferenceType::Weak), 7);

    let dead_refs: Vec<Oop> = dead.iter().map(|(r, _)| *r).collect();
    let pending = fixture.pending();
    assert_pending_exactly(&pending, &dead_refs, "mixed weak references");

    for &(r, referent) in &live {
        assert_eq!(fixture.table.referent(r), Some(referent), "live referent cleared");
        assert!(fixture.marker.is_marked(referent));
        assert_eq!(fixture.table.discovered(r), None);
    }
    for &(r, referent) in &dead {
        assert_eq!(fixture.table.referent(r), None, "dead referent not cleared");
        assert!(!fixture.marker.is_marked(referent));
    }
    for &r in &cleared {
        assert_eq!(fixture.table.discovered(r), None);
    }
    assert_all_lists_empty(&fixture.rp, "after processing");
}

/// A FinalReference with a dead referent
///
/// **Bug this finds:** Finalizable referent cleared or collected before
/// finalize(), FinalReference left active
/// **Invariant verified:** referent intact and kept alive, next self-looped,
/// reference pending
#[test]
fn test_dead_final_reference_resurrected() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (fin, referent) = fixture.reference_to_new(ReferenceType::Final);
    // Something only the finalizable object can reach.
    let inner = fixture.object();
    fixture.table.add_field(referent, inner).unwrap();
    assert!(fixture.discover(fin));

    let stats = fixture.process(None);
    assert_eq!(stats.final_count, 1);

    assert_eq!(fixture.table.referent(fin), Some(referent));
    assert_eq!(fixture.table.next(fin), Some(fin));
    assert!(fixture.marker.is_marked(referent));
    assert!(fixture.marker.is_marked(inner), "keep-alive not transitive");

    let pending = fixture.pending();
    assert_eq!(pending, vec![fin]);

    // Inactive now: the next cycle does not rediscover it.
    fixture.rp.enable_discovery();
    assert!(!fixture.discover(fin));
}

/// A FinalReference with a live referent is dropped
///
/// **Bug this finds:** Finalizer runs for a reachable object
#[test]
fn test_live_final_reference_dropped() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (fin, referent) = fixture.reference_to_new(ReferenceType::Final);
    assert!(fixture.discover(fin));
    fixture.mark_live(&[referent]);

    fixture.process(None);

    assert!(fixture.pending().is_empty());
    assert_eq!(fixture.table.next(fin), None, "live FinalReference made inactive");
    assert_eq!(fixture.phase_times.ref_dropped(ReferenceType::Final), 1);
}

/// ============================================================================
/// ROUND TRIP
/// ============================================================================

/// Every kind, live and dead
///
/// **Bug this finds:** Phase interaction bugs, pending chain splices
/// **Invariant verified:** each dead reference pending exactly once
#[test]
fn test_round_trip_all_kinds() {
    let fixture = RefProcFixture::serial();
    fixture.rp.setup_policy(true, &HeapOccupancy::default());
    fixture.rp.enable_discovery();

    let mut expected_pending = Vec::new();
    let mut live_referents = Vec::new();
    for kind in ReferenceType::DISCOVERABLE {
        for i in 0..6 {
            let (r, referent) = fixture.reference_to_new(kind);
            assert!(fixture.discover(r));
            if i % 2 == 0 {
                live_referents.push(referent);
            } else {
                expected_pending.push(r);
            }
        }
    }
    fixture.mark_live(&live_referents);

    let stats = fixture.process(None);
    assert_eq!(stats.total(), 24);

    let pending = fixture.pending();
    assert_pending_exactly(&pending, &expected_pending, "round trip");

    for r in pending {
        let kind = fixture.table.reference_type(r);
        let referent = fixture.table.referent(r);
        if kind == ReferenceType::Final {
            assert!(referent.is_some(), "final referent cleared");
        } else {
            assert!(referent.is_none(), "{} referent not cleared", kind.name());
        }
    }
    assert_all_lists_empty(&fixture.rp, "round trip");
}

/// A second cycle after the first behaves the same
///
/// **Bug this finds:** State leaking between cycles (lists, next_id, clock)
#[test]
fn test_consecutive_cycles() {
    let fixture = RefProcFixture::serial();

    for cycle in 0..3 {
        fixture.marker.reset();
        fixture.rp.enable_discovery();
        let (r, _) = fixture.reference_to_new(ReferenceType::Phantom);
        assert!(fixture.discover(r));

        let clock_before = fixture.rp.soft_ref_clock().get();
        let stats = fixture.process(None);
        assert!(fixture.rp.soft_ref_clock().get() >= clock_before);

        assert_eq!(stats.phantom_count, 1, "cycle {}", cycle);
        assert_eq!(fixture.pending(), vec![r], "cycle {}", cycle);
        assert!(!fixture.rp.discovery_enabled());
    }
}

/// ============================================================================
/// PHASE BOOKKEEPING
/// ============================================================================

/// Phases with nothing to do are skipped and recorded
///
/// **Bug this finds:** Empty phases dispatched to workers
#[test]
fn test_empty_phases_skipped() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();
    let (r, _) = fixture.reference_to_new(ReferenceType::Weak);
    assert!(fixture.discover(r));

    fixture.process(None);

    assert_eq!(
        fixture.phase_times.skipped_phases(),
        vec![RefProcPhase::KeepAliveFinalRefsPhase, RefProcPhase::PhantomRefsPhase]
    );
    assert!(fixture
        .phase_times
        .phase_time_ms(RefProcPhase::SoftWeakFinalRefsPhase)
        .is_some());

    let skipped = fixture
        .rp
        .logger()
        .events()
        .into_iter()
        .filter(|e| matches!(e, RefProcEvent::PhaseSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}

/// Nothing discovered at all
///
/// **Bug this finds:** Crashes on empty input
#[test]
fn test_nothing_discovered() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let stats = fixture.process(None);

    assert_eq!(stats.total(), 0);
    assert_eq!(fixture.phase_times.skipped_phases().len(), 3);
    assert!(fixture.pending().is_empty());
}

/// The summary serializes for log shipping
///
/// **Bug this finds:** Non-serializable statistics
#[test]
fn test_phase_times_summary_serializes() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();
    for _ in 0..3 {
        let (r, _) = fixture.reference_to_new(ReferenceType::Weak);
        fixture.discover(r);
    }
    let stats = fixture.process(None);

    let summary = serde_json::to_value(fixture.phase_times.summary()).unwrap();
    assert!(summary.is_object());

    let stats_json = serde_json::to_value(stats).unwrap();
    assert_eq!(stats_json["weak_count"], serde_json::json!(3));
    assert_eq!(stats_json["phantom_count"], serde_json::json!(0));
}

/// ============================================================================
/// PENDING LIST CONSUMER
/// ============================================================================

/// The handler finalizes final references and queues the rest
///
/// **Bug this finds:** Pending chain not consumable, kinds mixed up
#[test]
fn test_reference_handler_after_processing() {
    let fixture = RefProcFixture::serial();
    fixture.rp.enable_discovery();

    let (weak, _) = fixture.reference_to_new(ReferenceType::Weak);
    let (fin, fin_referent) = fixture.reference_to_new(ReferenceType::Final);
    assert!(fixture.discover(weak));
    assert!(fixture.discover(fin));
    fixture.process(None);

    let finalized = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&finalized);
    let handler = ReferenceHandler::new(Arc::clone(&fixture.table), move |r, referent| {
        sink.lock().push((r, referent));
    });

    assert_eq!(handler.process_pending(), 2);
    assert_eq!(*finalized.lock(), vec![(fin, Some(fin_referent))]);
    assert_eq!(handler.queue().poll(), Some(weak));
    assert_eq!(fixture.table.referent(fin), None);
}

/// ============================================================================
/// CLEARED BEFORE MARKING
/// ============================================================================

/// A reference cleared before a stop-the-world cycle reaches it
///
/// **Bug this finds:** Null referent discovered under stop-the-world
/// discovery, tripping the referent checks during processing
#[test]
fn test_cleared_reference_not_processed() {
    let fixture = RefProcFixture::serial();
    let r = fixture.reference(ReferenceType::Weak, None);

    fixture.rp.enable_discovery();
    fixture.marker.mark_roots([r]);
    fixture.marker.trace_discovering(&fixture.rp);

    let stats = fixture.process(None);

    assert_eq!(stats.weak_count, 0);
    assert_eq!(fixture.table.discovered(r), None);
    assert!(fixture.pending().is_empty());
}
