//! Phase Orchestration
//!
//! `process_discovered_references` and the per-list work each phase task
//! runs for its queue.

use super::adjuster::MtDegreeAdjuster;
use super::tasks::{
    KeepAliveFinalPhaseTask, PhantomPhaseTask, RefProcProxyTask, RefProcTask,
    RefProcThreadModel, SoftWeakFinalPhaseTask,
};
use super::ReferenceProcessor;
use crate::closures::{EnqueueDiscoveredField, IsAlive, KeepAlive};
use crate::debug_assert_context;
use crate::discovered::{DiscoveredList, DiscoveredListIterator};
use crate::logging::RefProcEvent;
use crate::object::ReferenceType;
use crate::stats::{PhaseTimes, RefProcPhase, ReferenceProcessorStats, ScopedTimer};
use crate::workers::WorkerThreads;
use std::time::Instant;

impl ReferenceProcessor {
    /// Resolve everything discovered since discovery was enabled
    ///
    /// Disables discovery, then runs the soft/weak/final, final keep-alive
    /// and phantom phases in order. Afterwards every discovered list is
    /// empty and every reference that was not dropped is on the table's
    /// pending list. Returns the per-kind counts discovered in this cycle.
    ///
    /// `workers` is used when processing is multi-threaded; without it
    /// every queue is processed on the calling thread.
    pub fn process_discovered_references(
        &self,
        proxy: &mut dyn RefProcProxyTask,
        workers: Option<&WorkerThreads>,
        phase_times: &PhaseTimes,
    ) -> ReferenceProcessorStats {
        let start = Instant::now();

        // Stop treating discovered references specially.
        self.disable_discovery();

        let stats = ReferenceProcessorStats::new(
            self.total_reference_count(ReferenceType::Soft),
            self.total_reference_count(ReferenceType::Weak),
            self.total_reference_count(ReferenceType::Final),
            self.total_reference_count(ReferenceType::Phantom),
        );
        for kind in ReferenceType::DISCOVERABLE {
            phase_times.set_ref_discovered(kind, stats.count(kind));
        }

        self.update_soft_ref_master_clock();
        phase_times.set_processing_is_mt(self.processing_is_mt());

        {
            let _t = self.phase_timer(RefProcPhase::SoftWeakFinalRefsPhase, phase_times);
            self.process_soft_weak_final_refs(proxy, workers, phase_times);
        }
        {
            let _t = self.phase_timer(RefProcPhase::KeepAliveFinalRefsPhase, phase_times);
            self.process_final_keep_alive(proxy, workers, phase_times);
        }
        {
            let _t = self.phase_timer(RefProcPhase::PhantomRefsPhase, phase_times);
            self.process_phantom_refs(proxy, workers, phase_times);
        }

        let elapsed = start.elapsed();
        phase_times.set_total_time(elapsed);

        // Elements on discovered lists were pushed to the pending list.
        self.verify_no_references_recorded();

        self.logger().log(RefProcEvent::Summary {
            soft: stats.soft_count,
            weak: stats.weak_count,
            final_refs: stats.final_count,
            phantom: stats.phantom_count,
            total_ms: elapsed.as_secs_f64() * 1000.0,
        });

        stats
    }

    fn phase_timer<'a>(&'a self, phase: RefProcPhase, phase_times: &'a PhaseTimes) -> ScopedTimer<'a> {
        ScopedTimer::new(phase.name(), move |duration| {
            phase_times.record_phase_time(phase, duration);
            self.logger().log(RefProcEvent::PhaseEnd {
                phase: phase.name().to_string(),
                duration_ms: duration.as_secs_f64() * 1000.0,
            });
        })
    }

    fn skip_phase(&self, phase: RefProcPhase, phase_times: &PhaseTimes) {
        phase_times.record_skipped(phase);
        self.logger().log(RefProcEvent::PhaseSkipped {
            phase: phase.name().to_string(),
            reason: "no references".to_string(),
        });
    }

    fn balance_for_phase(
        &self,
        phase: RefProcPhase,
        kinds: &[ReferenceType],
        phase_times: &PhaseTimes,
    ) {
        if !self.processing_is_mt() {
            return;
        }
        let start = Instant::now();
        for kind in kinds {
            self.maybe_balance_queues(*kind);
        }
        phase_times.record_balance_time(phase, start.elapsed());
    }

    fn process_soft_weak_final_refs(
        &self,
        proxy: &mut dyn RefProcProxyTask,
        workers: Option<&WorkerThreads>,
        phase_times: &PhaseTimes,
    ) {
        let phase = RefProcPhase::SoftWeakFinalRefsPhase;
        let num_total_refs = phase_times.ref_discovered(ReferenceType::Soft)
            + phase_times.ref_discovered(ReferenceType::Weak)
            + phase_times.ref_discovered(ReferenceType::Final);

        if num_total_refs == 0 {
            self.skip_phase(phase, phase_times);
            return;
        }

        let _adjuster = MtDegreeAdjuster::new(self, phase, num_total_refs, workers);
        self.balance_for_phase(
            phase,
            &[ReferenceType::Soft, ReferenceType::Weak, ReferenceType::Final],
            phase_times,
        );

        self.log_reflist("SoftWeakFinalRefsPhase Soft before", ReferenceType::Soft);
        self.log_reflist("SoftWeakFinalRefsPhase Weak before", ReferenceType::Weak);
        self.log_reflist("SoftWeakFinalRefsPhase Final before", ReferenceType::Final);

        let task = SoftWeakFinalPhaseTask::new(self, phase_times);
        self.run_task(phase, &task, proxy, workers, false);

        self.verify_total_count_zero(ReferenceType::Soft);
        self.verify_total_count_zero(ReferenceType::Weak);
        self.log_reflist("SoftWeakFinalRefsPhase Final after", ReferenceType::Final);
    }

    fn process_final_keep_alive(
        &self,
        proxy: &mut dyn RefProcProxyTask,
        workers: Option<&WorkerThreads>,
        phase_times: &PhaseTimes,
    ) {
        let phase = RefProcPhase::KeepAliveFinalRefsPhase;
        let num_final_refs = self.total_reference_count(ReferenceType::Final);

        if num_final_refs == 0 {
            self.skip_phase(phase, phase_times);
            return;
        }

        let _adjuster = MtDegreeAdjuster::new(self, phase, num_final_refs, workers);
        self.balance_for_phase(phase, &[ReferenceType::Final], phase_times);

        let task = KeepAliveFinalPhaseTask::new(self, phase_times);
        self.run_task(phase, &task, proxy, workers, true);

        self.verify_total_count_zero(ReferenceType::Final);
    }

    fn process_phantom_refs(
        &self,
        proxy: &mut dyn RefProcProxyTask,
        workers: Option<&WorkerThreads>,
        phase_times: &PhaseTimes,
    ) {
        let phase = RefProcPhase::PhantomRefsPhase;
        let num_phantom_refs = phase_times.ref_discovered(ReferenceType::Phantom);

        if num_phantom_refs == 0 {
            self.skip_phase(phase, phase_times);
            return;
        }

        let _adjuster = MtDegreeAdjuster::new(self, phase, num_phantom_refs, workers);
        self.balance_for_phase(phase, &[ReferenceType::Phantom], phase_times);

        self.log_reflist("PhantomRefsPhase Phantom before", ReferenceType::Phantom);

        let task = PhantomPhaseTask::new(self, phase_times);
        self.run_task(phase, &task, proxy, workers, false);

        self.verify_total_count_zero(ReferenceType::Phantom);
    }

    /// Dispatch one phase task over the queues
    fn run_task(
        &self,
        phase: RefProcPhase,
        task: &dyn RefProcTask,
        proxy: &mut dyn RefProcProxyTask,
        workers: Option<&WorkerThreads>,
        marks_oops_alive: bool,
    ) {
        let workers = workers.filter(|_| self.processing_is_mt());
        let thread_model = if workers.is_some() {
            RefProcThreadModel::Multi
        } else {
            RefProcThreadModel::Single
        };

        self.logger().log(RefProcEvent::PhaseStart {
            phase: phase.name().to_string(),
            queues: self.num_queues(),
            mt: workers.is_some(),
            marks_oops_alive,
        });

        proxy.prepare_run_task(self.num_queues(), thread_model, marks_oops_alive);
        let proxy: &dyn RefProcProxyTask = proxy;

        match workers {
            Some(workers) => {
                workers.run_task(&|worker_id: usize| proxy.work(worker_id, task), self.num_queues())
            }
            None => {
                for i in 0..self.max_num_queues() {
                    proxy.work(i, task);
                }
            }
        }
    }

    /// Resolve one list
    ///
    /// Null and strongly reachable referents are unlinked; reachable ones
    /// are also kept alive. With `do_enqueue_and_clear` the remaining
    /// references get their referent cleared and are published to the
    /// pending list, leaving the list empty. Returns the number unlinked.
    pub(crate) fn process_discovered_list_work(
        &self,
        refs_list: &DiscoveredList,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        do_enqueue_and_clear: bool,
    ) -> usize {
        let kind = refs_list.head().map(|head| self.table().reference_type(head));
        let mut iter = DiscoveredListIterator::new(
            self.table(),
            refs_list,
            Some(keep_alive),
            is_alive,
            enqueue,
        );

        while iter.has_next() {
            iter.load_ptrs(self.discovery_is_concurrent());
            if iter.referent().is_none() {
                // Cleared by a mutator since discovery.
                iter.remove();
                iter.move_to_next();
            } else if iter.is_referent_alive() {
                iter.remove();
                // Already traced; this only updates the field.
                iter.make_referent_alive();
                iter.move_to_next();
            } else {
                if do_enqueue_and_clear {
                    iter.clear_referent();
                    iter.enqueue();
                }
                iter.next();
            }
        }

        if do_enqueue_and_clear {
            iter.complete_enqueue();
            refs_list.clear();
        }

        if let Some(kind) = kind {
            self.logger().log(RefProcEvent::ListProcessed {
                kind: kind.name().to_string(),
                processed: iter.processed(),
                dropped: iter.removed(),
            });
        }
        iter.removed()
    }

    /// Keep every remaining final referent alive and publish the list
    pub(crate) fn process_final_keep_alive_work(
        &self,
        refs_list: &DiscoveredList,
        is_alive: &dyn IsAlive,
        keep_alive: &dyn KeepAlive,
        enqueue: &dyn EnqueueDiscoveredField,
    ) {
        let table = self.table();
        let mut iter =
            DiscoveredListIterator::new(table, refs_list, Some(keep_alive), is_alive, enqueue);

        while iter.has_next() {
            iter.load_ptrs(false);
            // keep the referent and followers around
            iter.make_referent_alive();

            if let Some(obj) = iter.current() {
                debug_assert_context!(table.next(obj).is_none(), "enqueued FinalReference {}", obj);
                // Self-loop next to mark the FinalReference inactive.
                table.set_next_raw(obj, Some(obj));
            }

            iter.enqueue();
            iter.next();
        }

        iter.complete_enqueue();
        refs_list.clear();
        debug_assert_context!(iter.removed() == 0, "This phase does not remove anything.");
    }
}
