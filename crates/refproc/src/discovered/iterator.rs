//! Discovered List Iterator
//!
//! Cursor over one [`DiscoveredList`] that makes the per-reference decision
//! and performs the splices. It remembers the previous element so removal is
//! O(1): the previous element's `discovered` field (or the list head, before
//! the first advance) is re-pointed past the removed object.
//!
//! Enqueueing keeps surviving references chained through their `discovered`
//! fields; [`DiscoveredListIterator::complete_enqueue`] then publishes the
//! whole chain with a single atomic exchange on the pending list head.

use crate::closures::{EnqueueDiscoveredField, IsAlive, KeepAlive};
use crate::debug_assert_context;
use crate::discovered::DiscoveredList;
use crate::object::{FieldAddr, ObjectTable, Oop};

/// Iterator over a discovered list
pub struct DiscoveredListIterator<'a> {
    table: &'a ObjectTable,
    list: &'a DiscoveredList,
    keep_alive: Option<&'a dyn KeepAlive>,
    is_alive: &'a dyn IsAlive,
    enqueue: &'a dyn EnqueueDiscoveredField,

    /// Object whose discovered field links to `current`; None is the head
    prev_discovered: Option<Oop>,
    current: Option<Oop>,
    next_discovered: Option<Oop>,
    referent: Option<Oop>,

    first_seen: Option<Oop>,
    processed: usize,
    removed: usize,
}

impl<'a> DiscoveredListIterator<'a> {
    /// Create iterator at the head of `list`
    ///
    /// `keep_alive` is None for passes that only drop references and never
    /// resurrect a referent.
    pub fn new(
        table: &'a ObjectTable,
        list: &'a DiscoveredList,
        keep_alive: Option<&'a dyn KeepAlive>,
        is_alive: &'a dyn IsAlive,
        enqueue: &'a dyn EnqueueDiscoveredField,
    ) -> Self {
        let head = list.head();
        Self {
            table,
            list,
            keep_alive,
            is_alive,
            enqueue,
            prev_discovered: None,
            current: head,
            next_discovered: None,
            referent: None,
            first_seen: head,
            processed: 0,
            removed: 0,
        }
    }

    /// Whether there is a current element
    #[inline]
    pub fn has_next(&self) -> bool {
        self.current.is_some()
    }

    #[inline]
    fn current_obj(&self) -> Oop {
        match self.current {
            Some(obj) => obj,
            None => panic!("discovered list iterator used past the end"),
        }
    }

    /// Current reference object
    #[inline]
    pub fn current(&self) -> Option<Oop> {
        self.current
    }

    /// Referent loaded by the last [`load_ptrs`](Self::load_ptrs)
    #[inline]
    pub fn referent(&self) -> Option<Oop> {
        self.referent
    }

    /// Load the current element's discovered and referent fields
    pub fn load_ptrs(&mut self, allow_null_referent: bool) {
        let obj = self.current_obj();

        self.next_discovered = self.table.discovered(obj);
        debug_assert_context!(
            self.table.is_oop_or_null(self.next_discovered),
            "expected an oop or null for discovered field of {}",
            obj
        );

        self.referent = self.table.referent(obj);
        debug_assert_context!(
            match self.referent {
                Some(referent) => self.table.is_oop(referent),
                None => allow_null_referent,
            },
            "bad referent {:?} found in discovered list",
            self.referent
        );
    }

    /// Whether the loaded referent is strongly reachable
    pub fn is_referent_alive(&self) -> bool {
        match self.referent {
            Some(referent) => self.is_alive.is_alive(referent),
            None => false,
        }
    }

    /// Unlink the current element from the list
    ///
    /// The removed object's discovered field is nulled so it can be
    /// discovered again.
    pub fn remove(&mut self) {
        let obj = self.current_obj();
        debug_assert_context!(self.table.is_oop(obj), "dropping a bad reference");
        self.table.set_discovered_raw(obj, None);

        // Removing the tail makes the previous element the new tail.
        let new_next = if self.next_discovered == Some(obj) {
            self.prev_discovered
        } else {
            self.next_discovered
        };

        match self.prev_discovered {
            None => self.list.set_head(new_next),
            Some(prev) => self.table.set_discovered_raw(prev, new_next),
        }

        self.removed += 1;
        self.list.dec_length(1);
    }

    /// Keep the current referent reachable
    pub fn make_referent_alive(&self) {
        let obj = self.current_obj();
        match self.keep_alive {
            Some(keep_alive) => keep_alive.keep_alive(FieldAddr::referent(obj)),
            None => panic!("make_referent_alive on an iterator without keep-alive"),
        }
    }

    /// Null the current element's referent
    pub fn clear_referent(&self) {
        self.table.clear_referent(self.current_obj());
    }

    /// Keep the current element on the enqueue chain
    pub fn enqueue(&self) {
        let obj = self.current_obj();
        match self.prev_discovered {
            Some(prev) => self
                .enqueue
                .enqueue(FieldAddr::discovered(prev), Some(obj)),
            // The list head is not a heap field and needs no barrier.
            None => self.list.set_head(Some(obj)),
        }
    }

    /// Publish the enqueued chain onto the pending list
    ///
    /// The last kept element receives the old pending list head.
    pub fn complete_enqueue(&self) {
        if let Some(last) = self.prev_discovered {
            let old = self
                .table
                .swap_reference_pending_list(self.list.head());
            self.enqueue.enqueue(FieldAddr::discovered(last), old);
        }
    }

    /// Advance without updating the previous element
    pub fn move_to_next(&mut self) {
        let obj = self.current_obj();
        if self.next_discovered == Some(obj) {
            // self-loop: end of list
            self.current = None;
        } else {
            self.current = self.next_discovered;
        }
        debug_assert_context!(
            self.current.is_none() || self.current != self.first_seen,
            "cyclic discovered list"
        );
        self.processed += 1;
    }

    /// Keep the current element and advance
    pub fn next(&mut self) {
        self.prev_discovered = self.current;
        self.move_to_next();
    }

    /// Elements visited
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Elements unlinked
    pub fn removed(&self) -> usize {
        self.removed
    }
}
