//! Phase Tasks and the Proxy Seam to the Collector
//!
//! A phase task knows which lists to resolve for a queue index; it does not
//! know how the collector marks or copies. The collector supplies that via
//! a [`RefProcProxyTask`], which builds per-worker closures and calls
//! [`RefProcTask::rp_work`] with them:
//!
//! ```text
//! ReferenceProcessor ──run_task──► WorkerThreads ──work(i)──► RefProcProxyTask
//!                                                                  │
//!                                       rp_work(i, is_alive, keep_alive, ...)
//!                                                                  ▼
//!                                                          phase task, queue i
//! ```

use super::ReferenceProcessor;
use crate::closures::{CompleteGc, EnqueueDiscoveredField, IsAlive, KeepAlive};
use crate::object::ReferenceType;
use crate::stats::{PhaseTimes, RefProcSubPhase};
use std::time::Instant;

/// How a phase is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefProcThreadModel {
    /// One unit per active queue on the worker pool
    Multi,
    /// Every queue on the calling thread
    Single,
}

/// Work for one queue index of one phase
pub trait RefProcTask: Sync {
    fn rp_work(
        &self,
        worker_id: usize,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        complete_gc: &dyn CompleteGc,
    );
}

/// Collector-side adapter that supplies closures to phase tasks
pub trait RefProcProxyTask: Sync {
    /// Called once per phase before any `work`
    fn prepare_run_task(
        &mut self,
        _queue_count: usize,
        _thread_model: RefProcThreadModel,
        _marks_oops_alive: bool,
    ) {
    }

    /// Run `task` for queue `worker_id`
    fn work(&self, worker_id: usize, task: &dyn RefProcTask);
}

/// Proxy that hands the same closures to every worker
///
/// Suitable when the closures are thread-safe, e.g. a shared
/// [`Marker`](crate::Marker) with a lock-free mark queue.
pub struct ClosureProxyTask<'a> {
    is_alive: &'a dyn IsAlive,
    keep_alive: &'a (dyn KeepAlive + Sync),
    enqueue: &'a (dyn EnqueueDiscoveredField + Sync),
    complete_gc: &'a (dyn CompleteGc + Sync),

    queue_count: usize,
    thread_model: RefProcThreadModel,
    marks_oops_alive: bool,
    phases: usize,
}

impl<'a> ClosureProxyTask<'a> {
    pub fn new(
        is_alive: &'a dyn IsAlive,
        keep_alive: &'a (dyn KeepAlive + Sync),
        enqueue: &'a (dyn EnqueueDiscoveredField + Sync),
        complete_gc: &'a (dyn CompleteGc + Sync),
    ) -> Self {
        Self {
            is_alive,
            keep_alive,
            enqueue,
            complete_gc,
            queue_count: 0,
            thread_model: RefProcThreadModel::Single,
            marks_oops_alive: false,
            phases: 0,
        }
    }

    /// Use one object for liveness, keep-alive and completion
    pub fn uniform<C>(closures: &'a C, enqueue: &'a (dyn EnqueueDiscoveredField + Sync)) -> Self
    where
        C: IsAlive + KeepAlive + CompleteGc + Sync,
    {
        Self::new(closures, closures, enqueue, closures)
    }

    /// Queue count of the last prepared phase
    pub fn queue_count(&self) -> usize {
        self.queue_count
    }

    pub fn thread_model(&self) -> RefProcThreadModel {
        self.thread_model
    }

    pub fn marks_oops_alive(&self) -> bool {
        self.marks_oops_alive
    }

    /// Phases dispatched through this proxy
    pub fn phases(&self) -> usize {
        self.phases
    }
}

impl RefProcProxyTask for ClosureProxyTask<'_> {
    fn prepare_run_task(
        &mut self,
        queue_count: usize,
        thread_model: RefProcThreadModel,
        marks_oops_alive: bool,
    ) {
        self.queue_count = queue_count;
        self.thread_model = thread_model;
        self.marks_oops_alive = marks_oops_alive;
        self.phases += 1;
    }

    fn work(&self, worker_id: usize, task: &dyn RefProcTask) {
        task.rp_work(
            worker_id,
            self.is_alive,
            self.keep_alive,
            self.enqueue,
            self.complete_gc,
        );
    }
}

/// Worker slot used for timing: serial processing records under worker 0
fn tracker_id(rp: &ReferenceProcessor, worker_id: usize) -> usize {
    if rp.processing_is_mt() {
        worker_id
    } else {
        0
    }
}

/// Phase 1: resolve soft, weak and final lists of one queue
pub(crate) struct SoftWeakFinalPhaseTask<'a> {
    rp: &'a ReferenceProcessor,
    phase_times: &'a PhaseTimes,
}

impl<'a> SoftWeakFinalPhaseTask<'a> {
    pub(crate) fn new(rp: &'a ReferenceProcessor, phase_times: &'a PhaseTimes) -> Self {
        Self { rp, phase_times }
    }
}

impl RefProcTask for SoftWeakFinalPhaseTask<'_> {
    fn rp_work(
        &self,
        worker_id: usize,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        complete_gc: &dyn CompleteGc,
    ) {
        let tracker = tracker_id(self.rp, worker_id);
        let sub_phases = [
            (ReferenceType::Soft, RefProcSubPhase::ProcessSoftRefSubPhase),
            (ReferenceType::Weak, RefProcSubPhase::ProcessWeakRefSubPhase),
            (ReferenceType::Final, RefProcSubPhase::ProcessFinalRefSubPhase),
        ];

        for (kind, sub_phase) in sub_phases {
            let start = Instant::now();
            // Final references are only filtered here; their referents
            // stay intact for the keep-alive phase.
            let removed = self.rp.process_discovered_list_work(
                self.rp.discovered_list(kind, worker_id),
                is_alive,
                keep_alive,
                enqueue,
                kind != ReferenceType::Final,
            );
            self.phase_times.add_ref_dropped(kind, removed);
            self.phase_times
                .add_sub_phase_worker_time(sub_phase, tracker, start.elapsed());
        }

        // Close the reachable set; keep-alive may have deferred work.
        complete_gc.complete();
    }
}

/// Phase 2: keep final referents alive and publish final lists
pub(crate) struct KeepAliveFinalPhaseTask<'a> {
    rp: &'a ReferenceProcessor,
    phase_times: &'a PhaseTimes,
}

impl<'a> KeepAliveFinalPhaseTask<'a> {
    pub(crate) fn new(rp: &'a ReferenceProcessor, phase_times: &'a PhaseTimes) -> Self {
        Self { rp, phase_times }
    }
}

impl RefProcTask for KeepAliveFinalPhaseTask<'_> {
    fn rp_work(
        &self,
        worker_id: usize,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        complete_gc: &dyn CompleteGc,
    ) {
        let start = Instant::now();
        self.rp.process_final_keep_alive_work(
            self.rp.discovered_list(ReferenceType::Final, worker_id),
            is_alive,
            keep_alive,
            enqueue,
        );
        complete_gc.complete();
        self.phase_times.add_sub_phase_worker_time(
            RefProcSubPhase::KeepAliveFinalRefsSubPhase,
            tracker_id(self.rp, worker_id),
            start.elapsed(),
        );
    }
}

/// Phase 3: resolve phantom lists
pub(crate) struct PhantomPhaseTask<'a> {
    rp: &'a ReferenceProcessor,
    phase_times: &'a PhaseTimes,
}

impl<'a> PhantomPhaseTask<'a> {
    pub(crate) fn new(rp: &'a ReferenceProcessor, phase_times: &'a PhaseTimes) -> Self {
        Self { rp, phase_times }
    }
}

impl RefProcTask for PhantomPhaseTask<'_> {
    fn rp_work(
        &self,
        worker_id: usize,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        complete_gc: &dyn CompleteGc,
    ) {
        let start = Instant::now();
        let removed = self.rp.process_discovered_list_work(
            self.rp.discovered_list(ReferenceType::Phantom, worker_id),
            is_alive,
            keep_alive,
            enqueue,
            true,
        );
        self.phase_times
            .add_ref_dropped(ReferenceType::Phantom, removed);
        complete_gc.complete();
        self.phase_times.add_sub_phase_worker_time(
            RefProcSubPhase::ProcessPhantomRefsSubPhase,
            tracker_id(self.rp, worker_id),
            start.elapsed(),
        );
    }
}
