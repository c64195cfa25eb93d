//! Phase Times - Per-Cycle Reference Processing Timings and Counts
//!
//! One `PhaseTimes` is filled in by a single
//! [`process_discovered_references`](crate::ReferenceProcessor::process_discovered_references)
//! call. Counters are atomics because workers add dropped counts
//! concurrently; timings go through short `parking_lot` critical sections.

use crate::object::ReferenceType;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Processing phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefProcPhase {
    SoftWeakFinalRefsPhase,
    KeepAliveFinalRefsPhase,
    PhantomRefsPhase,
}

impl RefProcPhase {
    pub const ALL: [RefProcPhase; 3] = [
        RefProcPhase::SoftWeakFinalRefsPhase,
        RefProcPhase::KeepAliveFinalRefsPhase,
        RefProcPhase::PhantomRefsPhase,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RefProcPhase::SoftWeakFinalRefsPhase => "SoftWeakFinalRefsPhase",
            RefProcPhase::KeepAliveFinalRefsPhase => "KeepAliveFinalRefsPhase",
            RefProcPhase::PhantomRefsPhase => "PhantomRefsPhase",
        }
    }
}

/// Units of work inside a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefProcSubPhase {
    ProcessSoftRefSubPhase,
    ProcessWeakRefSubPhase,
    ProcessFinalRefSubPhase,
    KeepAliveFinalRefsSubPhase,
    ProcessPhantomRefsSubPhase,
}

impl RefProcSubPhase {
    pub fn name(self) -> &'static str {
        match self {
            RefProcSubPhase::ProcessSoftRefSubPhase => "SoftRef",
            RefProcSubPhase::ProcessWeakRefSubPhase => "WeakRef",
            RefProcSubPhase::ProcessFinalRefSubPhase => "FinalRef",
            RefProcSubPhase::KeepAliveFinalRefsSubPhase => "FinalRef (keep alive)",
            RefProcSubPhase::ProcessPhantomRefsSubPhase => "PhantomRef",
        }
    }
}

/// Timings and counts of one processing cycle
pub struct PhaseTimes {
    max_workers: usize,
    ref_discovered: [AtomicUsize; ReferenceType::COUNT],
    ref_dropped: [AtomicUsize; ReferenceType::COUNT],
    processing_is_mt: AtomicBool,
    inner: Mutex<Timings>,
}

#[derive(Default)]
struct Timings {
    phase_ms: IndexMap<RefProcPhase, f64>,
    balance_ms: IndexMap<RefProcPhase, f64>,
    /// Worker seconds per sub-phase, indexed by worker id
    sub_phase_worker_ms: IndexMap<RefProcSubPhase, Vec<f64>>,
    skipped: Vec<RefProcPhase>,
    total_ms: f64,
}

impl PhaseTimes {
    /// Create phase times for up to `max_workers` workers
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            ref_discovered: Default::default(),
            ref_dropped: Default::default(),
            processing_is_mt: AtomicBool::new(false),
            inner: Mutex::new(Timings::default()),
        }
    }

    /// Forget everything recorded
    pub fn reset(&self) {
        for i in 0..ReferenceType::COUNT {
            self.ref_discovered[i].store(0, Ordering::Relaxed);
            self.ref_dropped[i].store(0, Ordering::Relaxed);
        }
        self.processing_is_mt.store(false, Ordering::Relaxed);
        *self.inner.lock() = Timings::default();
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn set_ref_discovered(&self, kind: ReferenceType, count: usize) {
        self.ref_discovered[kind.list_index()].store(count, Ordering::Relaxed);
    }

    pub fn ref_discovered(&self, kind: ReferenceType) -> usize {
        self.ref_discovered[kind.list_index()].load(Ordering::Relaxed)
    }

    pub fn add_ref_dropped(&self, kind: ReferenceType, count: usize) {
        self.ref_dropped[kind.list_index()].fetch_add(count, Ordering::Relaxed);
    }

    pub fn ref_dropped(&self, kind: ReferenceType) -> usize {
        self.ref_dropped[kind.list_index()].load(Ordering::Relaxed)
    }

    pub fn set_processing_is_mt(&self, mt: bool) {
        self.processing_is_mt.store(mt, Ordering::Relaxed);
    }

    pub fn processing_is_mt(&self) -> bool {
        self.processing_is_mt.load(Ordering::Relaxed)
    }

    pub fn record_phase_time(&self, phase: RefProcPhase, duration: Duration) {
        *self.inner.lock().phase_ms.entry(phase).or_insert(0.0) += millis(duration);
    }

    pub fn phase_time_ms(&self, phase: RefProcPhase) -> Option<f64> {
        self.inner.lock().phase_ms.get(&phase).copied()
    }

    pub fn record_balance_time(&self, phase: RefProcPhase, duration: Duration) {
        *self.inner.lock().balance_ms.entry(phase).or_insert(0.0) += millis(duration);
    }

    pub fn balance_time_ms(&self, phase: RefProcPhase) -> Option<f64> {
        self.inner.lock().balance_ms.get(&phase).copied()
    }

    /// Add worker time for a sub-phase
    ///
    /// Serial processing records everything under worker 0.
    pub fn add_sub_phase_worker_time(
        &self,
        sub_phase: RefProcSubPhase,
        worker_id: usize,
        duration: Duration,
    ) {
        let max_workers = self.max_workers;
        let mut inner = self.inner.lock();
        let slots = inner
            .sub_phase_worker_ms
            .entry(sub_phase)
            .or_insert_with(|| vec![0.0; max_workers]);
        if worker_id >= slots.len() {
            slots.resize(worker_id + 1, 0.0);
        }
        slots[worker_id] += millis(duration);
    }

    /// Per-worker times of a sub-phase
    pub fn sub_phase_worker_times(&self, sub_phase: RefProcSubPhase) -> Vec<f64> {
        self.inner
            .lock()
            .sub_phase_worker_ms
            .get(&sub_phase)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record_skipped(&self, phase: RefProcPhase) {
        self.inner.lock().skipped.push(phase);
    }

    pub fn skipped_phases(&self) -> Vec<RefProcPhase> {
        self.inner.lock().skipped.clone()
    }

    pub fn set_total_time(&self, duration: Duration) {
        self.inner.lock().total_ms = millis(duration);
    }

    pub fn total_time_ms(&self) -> f64 {
        self.inner.lock().total_ms
    }

    /// Serializable snapshot
    pub fn summary(&self) -> PhaseTimesSummary {
        let inner = self.inner.lock();
        let per_kind = |counters: &[AtomicUsize; ReferenceType::COUNT]| {
            ReferenceType::DISCOVERABLE
                .iter()
                .map(|kind| {
                    (
                        kind.name().to_string(),
                        counters[kind.list_index()].load(Ordering::Relaxed),
                    )
                })
                .collect::<IndexMap<_, _>>()
        };

        PhaseTimesSummary {
            processing_is_mt: self.processing_is_mt(),
            total_ms: inner.total_ms,
            discovered: per_kind(&self.ref_discovered),
            dropped: per_kind(&self.ref_dropped),
            phases: inner
                .phase_ms
                .iter()
                .map(|(phase, ms)| (phase.name().to_string(), *ms))
                .collect(),
            balancing: inner
                .balance_ms
                .iter()
                .map(|(phase, ms)| (phase.name().to_string(), *ms))
                .collect(),
            sub_phases: inner
                .sub_phase_worker_ms
                .iter()
                .map(|(sub, times)| (sub.name().to_string(), times.clone()))
                .collect(),
            skipped: inner.skipped.iter().map(|p| p.name().to_string()).collect(),
        }
    }
}

impl Default for PhaseTimes {
    fn default() -> Self {
        Self::new(1)
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Snapshot of [`PhaseTimes`]
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTimesSummary {
    pub processing_is_mt: bool,
    pub total_ms: f64,
    pub discovered: IndexMap<String, usize>,
    pub dropped: IndexMap<String, usize>,
    pub phases: IndexMap<String, f64>,
    pub balancing: IndexMap<String, f64>,
    pub sub_phases: IndexMap<String, Vec<f64>>,
    pub skipped: Vec<String>,
}
