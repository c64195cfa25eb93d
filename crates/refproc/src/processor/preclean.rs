//! Precleaning
//!
//! A concurrent collector can shrink the discovered lists before the final
//! pause: references whose referent was cleared or has become strongly
//! reachable since discovery are unlinked early. Nothing is kept alive and
//! nothing is enqueued here, so an aborted pass leaves the lists valid.

use super::ReferenceProcessor;
use crate::closures::{EnqueueDiscoveredField, IsAlive, YieldCheck};
use crate::discovered::{DiscoveredList, DiscoveredListIterator};
use crate::logging::RefProcEvent;
use crate::object::ReferenceType;
use crate::stats::GcTimer;

impl ReferenceProcessor {
    /// Drop discovered references that no longer need processing
    ///
    /// Lists are visited soft, weak, final, phantom. `yield_check` is asked
    /// before every list and, at fine grain, before every reference.
    /// Returns true if the pass was cut short.
    pub fn preclean_discovered_references(
        &self,
        is_alive: &dyn IsAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        yield_check: &dyn YieldCheck,
        timer: Option<&GcTimer>,
    ) -> bool {
        for kind in ReferenceType::DISCOVERABLE {
            let phase_name = preclean_phase_name(kind);
            let _t = timer.map(|timer| timer.phase(phase_name));

            self.log_reflist(&format!("{} before", phase_name), kind);
            for list in self.discovered_lists(kind) {
                if yield_check.should_return() {
                    return true;
                }
                if self.preclean_discovered_reflist(list, is_alive, enqueue, yield_check) {
                    self.logger().log(RefProcEvent::PrecleanAborted {
                        kind: kind.name().to_string(),
                    });
                    return true;
                }
            }
            self.log_reflist(&format!("{} after", phase_name), kind);
        }
        false
    }

    /// Returns true if `yield_check` asked to stop
    fn preclean_discovered_reflist(
        &self,
        refs_list: &DiscoveredList,
        is_alive: &dyn IsAlive,
        enqueue: &dyn EnqueueDiscoveredField,
        yield_check: &dyn YieldCheck,
    ) -> bool {
        let mut iter = DiscoveredListIterator::new(self.table(), refs_list, None, is_alive, enqueue);

        while iter.has_next() {
            if yield_check.should_return_fine_grain() {
                return true;
            }
            // Mutators may have cleared the referent since discovery.
            iter.load_ptrs(true);
            if iter.referent().is_none() || iter.is_referent_alive() {
                iter.remove();
                iter.move_to_next();
            } else {
                iter.next();
            }
        }

        if iter.processed() > 0 {
            log::trace!(
                target: "gc::ref",
                " Dropped {} Refs out of {} Refs in discovered list",
                iter.removed(),
                iter.processed()
            );
        }
        false
    }
}

fn preclean_phase_name(kind: ReferenceType) -> &'static str {
    match kind {
        ReferenceType::Soft => "Preclean SoftReferences",
        ReferenceType::Weak => "Preclean WeakReferences",
        ReferenceType::Final => "Preclean FinalReferences",
        _ => "Preclean PhantomReferences",
    }
}
