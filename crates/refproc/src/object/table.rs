//! Object Table - Handle-Addressed Object Arena
//!
//! Append-only arena standing in for the managed heap. Every slot carries the
//! header bits reference processing needs (kind, generation, mark bit) and,
//! for reference objects, the three intrusive link words. Link words are
//! atomics so discovery can claim an object with a single compare-and-exchange
//! and the pending list can be swapped in one atomic step.
//!
//! Handles are never freed; a collector embedding this table reclaims space
//! on its own terms.

use crate::error::{RefProcError, Result};
use crate::object::{FieldAddr, Generation, Oop, RefField, ReferenceType};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// One object in the table
struct ObjectSlot {
    kind: ReferenceType,
    generation: Generation,
    referent: AtomicUsize,
    discovered: AtomicUsize,
    next: AtomicUsize,
    /// Soft reference access time in soft-ref clock units
    timestamp: AtomicI64,
    marked: AtomicBool,
    /// Strong outgoing edges, followed by the marker
    fields: Mutex<Vec<Oop>>,
}

impl ObjectSlot {
    fn new(kind: ReferenceType, generation: Generation, referent: Option<Oop>) -> Self {
        Self {
            kind,
            generation,
            referent: AtomicUsize::new(Oop::encode(referent)),
            discovered: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
            timestamp: AtomicI64::new(0),
            marked: AtomicBool::new(false),
            fields: Mutex::new(Vec::new()),
        }
    }

    fn word(&self, field: RefField) -> &AtomicUsize {
        match field {
            RefField::Referent => &self.referent,
            RefField::Discovered => &self.discovered,
            RefField::Next => &self.next,
        }
    }
}

/// ObjectTable - arena of objects addressed by [`Oop`]
///
/// # Thread Safety
///
/// Field accessors take a shared lock on the slot vector and touch a single
/// atomic word; allocation takes the exclusive lock. Accessors never nest the
/// lock.
pub struct ObjectTable {
    slots: RwLock<Vec<ObjectSlot>>,

    /// Head of the process-wide pending-notification list
    pending_list: AtomicUsize,
}

impl ObjectTable {
    /// Create empty table
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create table with room for `capacity` objects
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Vec::with_capacity(capacity)),
            pending_list: AtomicUsize::new(0),
        }
    }

    /// Allocate a plain (non-reference) object
    pub fn allocate(&self, generation: Generation) -> Result<Oop> {
        self.push(ObjectSlot::new(ReferenceType::None, generation, None))
    }

    /// Allocate a reference object of `kind` pointing at `referent`
    pub fn allocate_reference(
        &self,
        kind: ReferenceType,
        referent: Option<Oop>,
        generation: Generation,
    ) -> Result<Oop> {
        if !kind.is_reference() {
            return Err(RefProcError::InvalidArgument(
                "reference objects need a reference kind".to_string(),
            ));
        }
        if let Some(target) = referent {
            self.check(target)?;
        }
        self.push(ObjectSlot::new(kind, generation, referent))
    }

    fn push(&self, slot: ObjectSlot) -> Result<Oop> {
        let mut slots = self.slots.write();
        let oop = Oop::try_from_index(slots.len()).ok_or_else(|| RefProcError::ResourceExhausted {
            resource: "object handles".to_string(),
        })?;
        slots.push(slot);
        Ok(oop)
    }

    /// Validate that `obj` belongs to this table
    pub fn check(&self, obj: Oop) -> Result<()> {
        let len = self.len();
        if obj.index() < len {
            Ok(())
        } else {
            Err(RefProcError::InvalidHandle {
                index: obj.index(),
                len,
            })
        }
    }

    /// Number of allocated objects
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Check if no object has been allocated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `obj` is a valid object of this table
    pub fn is_oop(&self, obj: Oop) -> bool {
        obj.index() < self.len()
    }

    /// Whether `obj` is null or a valid object of this table
    pub fn is_oop_or_null(&self, obj: Option<Oop>) -> bool {
        obj.map_or(true, |o| self.is_oop(o))
    }

    #[inline]
    fn with_slot<R>(&self, obj: Oop, f: impl FnOnce(&ObjectSlot) -> R) -> R {
        let slots = self.slots.read();
        f(&slots[obj.index()])
    }

    /// Reference kind of `obj` (`None` for plain objects)
    pub fn reference_type(&self, obj: Oop) -> ReferenceType {
        self.with_slot(obj, |s| s.kind)
    }

    /// Generation of `obj`
    pub fn generation(&self, obj: Oop) -> Generation {
        self.with_slot(obj, |s| s.generation)
    }

    // ------------------------------------------------------------------
    // Link fields
    // ------------------------------------------------------------------

    /// Load any link field
    #[inline]
    pub fn load_field(&self, addr: FieldAddr) -> Option<Oop> {
        self.with_slot(addr.obj, |s| Oop::decode(s.word(addr.field).load(Ordering::Acquire)))
    }

    /// Store any link field without a barrier
    #[inline]
    pub fn store_field(&self, addr: FieldAddr, value: Option<Oop>) {
        self.with_slot(addr.obj, |s| {
            s.word(addr.field).store(Oop::encode(value), Ordering::Release)
        })
    }

    /// Referent, read without keeping it alive
    #[inline]
    pub fn referent(&self, obj: Oop) -> Option<Oop> {
        self.load_field(FieldAddr::referent(obj))
    }

    /// Null the referent field
    #[inline]
    pub fn clear_referent(&self, obj: Oop) {
        self.store_field(FieldAddr::referent(obj), None)
    }

    /// Mutator-side `Reference.clear()` / re-point
    pub fn set_referent(&self, obj: Oop, referent: Option<Oop>) {
        self.store_field(FieldAddr::referent(obj), referent)
    }

    /// Discovered link
    #[inline]
    pub fn discovered(&self, obj: Oop) -> Option<Oop> {
        self.load_field(FieldAddr::discovered(obj))
    }

    /// Store the discovered link without a barrier
    #[inline]
    pub fn set_discovered_raw(&self, obj: Oop, value: Option<Oop>) {
        self.store_field(FieldAddr::discovered(obj), value)
    }

    /// Claim `obj` for a discovered list
    ///
    /// Installs `value` only if the discovered field is still null. Returns
    /// true if this call won.
    #[inline]
    pub fn cas_discovered(&self, obj: Oop, value: Oop) -> bool {
        self.with_slot(obj, |s| {
            s.discovered
                .compare_exchange(
                    0,
                    Oop::encode(Some(value)),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        })
    }

    /// Next link (non-null marks an inactive reference)
    #[inline]
    pub fn next(&self, obj: Oop) -> Option<Oop> {
        self.load_field(FieldAddr::next(obj))
    }

    /// Store the next link without a barrier
    #[inline]
    pub fn set_next_raw(&self, obj: Oop, value: Option<Oop>) {
        self.store_field(FieldAddr::next(obj), value)
    }

    /// Soft reference access timestamp
    pub fn soft_timestamp(&self, obj: Oop) -> i64 {
        self.with_slot(obj, |s| s.timestamp.load(Ordering::Relaxed))
    }

    /// Record a soft reference access at `clock`
    pub fn set_soft_timestamp(&self, obj: Oop, clock: i64) {
        self.with_slot(obj, |s| s.timestamp.store(clock, Ordering::Relaxed))
    }

    // ------------------------------------------------------------------
    // Marking support
    // ------------------------------------------------------------------

    /// Set the mark bit; true if it was clear before
    #[inline]
    pub fn mark(&self, obj: Oop) -> bool {
        self.with_slot(obj, |s| !s.marked.swap(true, Ordering::AcqRel))
    }

    /// Check the mark bit
    #[inline]
    pub fn is_marked(&self, obj: Oop) -> bool {
        self.with_slot(obj, |s| s.marked.load(Ordering::Acquire))
    }

    /// Clear every mark bit
    pub fn clear_marks(&self) {
        let slots = self.slots.read();
        for slot in slots.iter() {
            slot.marked.store(false, Ordering::Relaxed);
        }
    }

    /// Add a strong edge `from -> to`
    pub fn add_field(&self, from: Oop, to: Oop) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        self.with_slot(from, |s| s.fields.lock().push(to));
        Ok(())
    }

    /// Strong edges of `obj`
    pub fn fields(&self, obj: Oop) -> Vec<Oop> {
        self.with_slot(obj, |s| s.fields.lock().clone())
    }

    // ------------------------------------------------------------------
    // Pending list
    // ------------------------------------------------------------------

    /// Atomically install `head` as the pending list and return the old head
    pub fn swap_reference_pending_list(&self, head: Option<Oop>) -> Option<Oop> {
        Oop::decode(self.pending_list.swap(Oop::encode(head), Ordering::AcqRel))
    }

    /// Current pending list head
    pub fn pending_list_head(&self) -> Option<Oop> {
        Oop::decode(self.pending_list.load(Ordering::Acquire))
    }

    /// Detach the pending list and unlink it
    ///
    /// Returns references in list order; every returned object's discovered
    /// field is null again.
    pub fn take_pending_list(&self) -> Vec<Oop> {
        let mut current = self.swap_reference_pending_list(None);
        let mut drained = Vec::new();

        while let Some(obj) = current {
            let next = self.discovered(obj);
            self.set_discovered_raw(obj, None);
            drained.push(obj);
            current = next;
        }

        drained
    }

    /// Snapshot of table contents
    pub fn stats(&self) -> TableStats {
        let slots = self.slots.read();
        let mut stats = TableStats {
            objects: slots.len(),
            ..Default::default()
        };

        for slot in slots.iter() {
            match slot.kind {
                ReferenceType::None => {}
                ReferenceType::Soft => stats.soft_references += 1,
                ReferenceType::Weak => stats.weak_references += 1,
                ReferenceType::Final => stats.final_references += 1,
                ReferenceType::Phantom => stats.phantom_references += 1,
            }
            if slot.marked.load(Ordering::Relaxed) {
                stats.marked += 1;
            }
        }

        stats
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Object counts of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub objects: usize,
    pub soft_references: usize,
    pub weak_references: usize,
    pub final_references: usize,
    pub phantom_references: usize,
    pub marked: usize,
}
