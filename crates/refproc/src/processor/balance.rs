//! Queue Balancing
//!
//! Before a parallel phase only the first `num_queues` lists of a kind are
//! visited, so references on higher queues must move down. While at it the
//! active queues are evened out to at most `avg = total / num_queues + 1`.
//!
//! Moving `k` references splits a source list after its k-th element (the
//! lists are intrusive, so this is a walk) and splices the prefix onto the
//! destination head:
//!
//! ```text
//! from: A → B → C → D ⟲        to: X → Y ⟲
//!        └─ k = 2 ─┘
//! from: C → D ⟲                to: A → B → X → Y ⟲
//! ```

use super::ReferenceProcessor;
use crate::debug_assert_context;
use crate::discovered::DiscoveredList;
use crate::logging::RefProcEvent;
use crate::object::{ObjectTable, ReferenceType};

/// Redistribute `lists` so that only `lists[..num_queues]` hold entries
pub fn balance_queues(table: &ObjectTable, lists: &[DiscoveredList], num_queues: usize) {
    debug_assert_context!(
        num_queues > 0 && num_queues <= lists.len(),
        "bad processing degree {} for {} queues",
        num_queues,
        lists.len()
    );

    let total_refs: usize = lists.iter().map(DiscoveredList::length).sum();
    let avg_refs = total_refs / num_queues + 1;
    let mut to_idx = 0;

    for from_idx in 0..lists.len() {
        let from = &lists[from_idx];
        // Lists past the processing degree are never visited; empty them.
        let mut move_all = from_idx >= num_queues && from.length() > 0;

        while from.length() > avg_refs || move_all {
            debug_assert_context!(to_idx < num_queues, "Sanity Check!");
            let to = &lists[to_idx];

            if to.length() >= avg_refs {
                to_idx = (to_idx + 1) % num_queues;
                continue;
            }

            let refs_to_move = if move_all {
                from.length().min(avg_refs - to.length())
            } else {
                (from.length() - avg_refs).min(avg_refs - to.length())
            };
            debug_assert_context!(refs_to_move > 0, "otherwise the code below will fail");

            let Some(move_head) = from.head() else { break };

            // Find the element to split the list on.
            let mut move_tail = move_head;
            let mut new_head = Some(move_head);
            for _ in 0..refs_to_move {
                match new_head {
                    Some(obj) => {
                        move_tail = obj;
                        new_head = table.discovered(obj);
                    }
                    None => break,
                }
            }

            // Add the chain to the destination.
            match to.head() {
                None => table.set_discovered_raw(move_tail, Some(move_tail)),
                Some(to_head) => table.set_discovered_raw(move_tail, Some(to_head)),
            }
            to.set_head(Some(move_head));
            to.inc_length(refs_to_move);

            // Remove the chain from the source; a self-loop means it was the tail.
            if new_head == Some(move_tail) {
                from.set_head(None);
            } else {
                from.set_head(new_head);
            }
            from.dec_length(refs_to_move);

            if from.length() == 0 {
                move_all = false;
            }
        }
    }

    if cfg!(debug_assertions) {
        let balanced_total_refs: usize = lists[..num_queues]
            .iter()
            .map(DiscoveredList::length)
            .sum();
        debug_assert_context!(
            total_refs == balanced_total_refs,
            "Balancing was incomplete: {} != {}",
            total_refs,
            balanced_total_refs
        );
    }
}

impl ReferenceProcessor {
    /// Whether lists of `kind` must be balanced before a parallel phase
    pub(crate) fn need_balance_queues(&self, kind: ReferenceType) -> bool {
        if self.config().parallel_ref_proc_balancing_enabled {
            return true;
        }
        // Balancing is off, but entries beyond the processing degree would
        // never be processed.
        self.discovered_lists(kind)[self.num_queues()..]
            .iter()
            .any(|list| !list.is_empty())
    }

    pub(crate) fn maybe_balance_queues(&self, kind: ReferenceType) {
        debug_assert_context!(self.processing_is_mt(), "Should not call this otherwise");
        if self.need_balance_queues(kind) {
            self.balance_kind(kind);
        }
    }

    fn balance_kind(&self, kind: ReferenceType) {
        let lists = self.discovered_lists(kind);
        let total = lists.iter().map(DiscoveredList::length).sum();
        balance_queues(self.table(), lists, self.num_queues());
        self.logger().log(RefProcEvent::Balanced {
            kind: kind.name().to_string(),
            total,
            num_queues: self.num_queues(),
        });
    }

    /// Balance every kind onto the active queues
    pub fn balance_all_queues(&self) {
        for kind in ReferenceType::DISCOVERABLE {
            self.balance_kind(kind);
        }
    }
}
