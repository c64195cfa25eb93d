//! MT Degree Adjuster
//!
//! Narrows the active queue count for one phase to what the amount of work
//! justifies and restores the previous count when dropped.

use super::ReferenceProcessor;
use crate::stats::RefProcPhase;
use crate::workers::WorkerThreads;

/// Scoped processing degree for one phase
pub struct MtDegreeAdjuster<'a> {
    rp: &'a ReferenceProcessor,
    saved_num_queues: usize,
}

impl<'a> MtDegreeAdjuster<'a> {
    /// Set the degree for `phase` given `ref_count` references to process
    pub fn new(
        rp: &'a ReferenceProcessor,
        phase: RefProcPhase,
        ref_count: usize,
        workers: Option<&WorkerThreads>,
    ) -> Self {
        let saved_num_queues = rp.num_queues();
        let adjuster = Self {
            rp,
            saved_num_queues,
        };

        if !rp.processing_is_mt() {
            return adjuster;
        }

        let available = workers.map_or(1, WorkerThreads::active_workers);
        let max_threads = saved_num_queues.min(available).max(1);
        let degree = ergo_proc_thread_count(
            ref_count,
            max_threads,
            phase,
            rp.config().references_per_thread,
            rp.config().processor_count(),
        )
        .clamp(1, rp.max_num_queues());

        rp.set_active_mt_degree(degree);
        adjuster
    }

    pub fn saved_num_queues(&self) -> usize {
        self.saved_num_queues
    }
}

impl Drop for MtDegreeAdjuster<'_> {
    fn drop(&mut self) {
        self.rp.set_active_mt_degree(self.saved_num_queues);
    }
}

/// Whether `phase` always runs with every available worker
///
/// Keeping final referents alive can fan out into large object graphs even
/// for few references.
pub fn use_max_threads(phase: RefProcPhase) -> bool {
    phase == RefProcPhase::KeepAliveFinalRefsPhase
}

/// Worker count for `ref_count` references
pub fn ergo_proc_thread_count(
    ref_count: usize,
    max_threads: usize,
    phase: RefProcPhase,
    references_per_thread: usize,
    processor_count: usize,
) -> usize {
    debug_assert!(max_threads > 0, "must allow at least one thread");

    if use_max_threads(phase) || references_per_thread == 0 {
        return max_threads;
    }

    let thread_count = 1 + ref_count / references_per_thread;
    thread_count.min(max_threads).min(processor_count)
}
