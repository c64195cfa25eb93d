//! Object Module - Handles, Reference Kinds and the Object Table
//!
//! Reference processing works on intrusive links stored inside reference
//! objects. Objects are addressed by [`Oop`] handles into an [`ObjectTable`];
//! a link field holds an encoded handle (`0` is null), so list splices and the
//! discovery compare-and-exchange behave like they would on raw pointers.
//!
//! Field layout of a reference object:
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────────────┐
//! │ referent   │ weakly held target, read without keep-alive  │
//! │ discovered │ next link while on a discovered list,        │
//! │            │ itself at the tail, then pending-list link   │
//! │ next       │ self-looped once a FinalReference is inactive│
//! │ timestamp  │ soft references only: last access clock      │
//! └────────────┴──────────────────────────────────────────────┘
//! ```

pub mod table;

pub use table::{ObjectTable, TableStats};

use serde::Serialize;
use std::fmt;
use std::num::NonZeroU32;

/// Handle to an object in an [`ObjectTable`]
///
/// The handle is the slot index plus one, so `Option<Oop>` is the size of a
/// `u32` and the null encoding of a link field is `0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oop(NonZeroU32);

impl Oop {
    /// Create handle for slot `index`
    ///
    /// # Panics
    /// Panics if `index` does not fit the handle width.
    pub fn from_index(index: usize) -> Self {
        match Self::try_from_index(index) {
            Some(oop) => oop,
            None => panic!("object index {} exceeds handle width", index),
        }
    }

    /// Create handle for slot `index`, None if it does not fit
    pub fn try_from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .and_then(NonZeroU32::new)
            .map(Oop)
    }

    /// Slot index of this handle
    #[inline]
    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Encode an optional handle into a link word
    #[inline]
    pub(crate) fn encode(obj: Option<Oop>) -> usize {
        obj.map_or(0, |o| o.0.get() as usize)
    }

    /// Decode a link word
    #[inline]
    pub(crate) fn decode(raw: usize) -> Option<Oop> {
        u32::try_from(raw).ok().and_then(NonZeroU32::new).map(Oop)
    }
}

impl fmt::Debug for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oop(#{})", self.index())
    }
}

impl fmt::Display for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// Reference kinds, strongest first
///
/// The order is significant: soft, weak and final lists are resolved in one
/// phase, final referents are then kept alive, phantom references last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceType {
    /// Not a reference object
    None,
    /// Cleared at the policy's discretion
    Soft,
    /// Cleared as soon as the referent is not strongly reachable
    Weak,
    /// Registered finalizer; referent kept alive for `finalize()`
    Final,
    /// Post-mortem notification; referent never resurrected
    Phantom,
}

impl ReferenceType {
    /// Kinds that can be discovered, in list order
    pub const DISCOVERABLE: [ReferenceType; 4] = [
        ReferenceType::Soft,
        ReferenceType::Weak,
        ReferenceType::Final,
        ReferenceType::Phantom,
    ];

    /// Number of discoverable kinds
    pub const COUNT: usize = 4;

    /// Position in [`ReferenceType::DISCOVERABLE`]
    ///
    /// # Panics
    /// Panics for [`ReferenceType::None`].
    #[inline]
    pub fn list_index(self) -> usize {
        match self {
            ReferenceType::Soft => 0,
            ReferenceType::Weak => 1,
            ReferenceType::Final => 2,
            ReferenceType::Phantom => 3,
            ReferenceType::None => panic!("ReferenceType::None has no discovered list"),
        }
    }

    /// Whether this is a reference kind at all
    pub fn is_reference(self) -> bool {
        self != ReferenceType::None
    }

    /// Short name used in logs
    pub fn name(self) -> &'static str {
        match self {
            ReferenceType::None => "None",
            ReferenceType::Soft => "SoftReference",
            ReferenceType::Weak => "WeakReference",
            ReferenceType::Final => "FinalReference",
            ReferenceType::Phantom => "PhantomReference",
        }
    }
}

/// Generation an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Generation {
    Young,
    Old,
}

/// Link fields of a reference object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefField {
    Referent,
    Discovered,
    Next,
}

/// Address of a link field: the object plus which field
///
/// Plays the role of a raw field pointer for the keep-alive and enqueue
/// closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAddr {
    pub obj: Oop,
    pub field: RefField,
}

impl FieldAddr {
    pub fn referent(obj: Oop) -> Self {
        FieldAddr {
            obj,
            field: RefField::Referent,
        }
    }

    pub fn discovered(obj: Oop) -> Self {
        FieldAddr {
            obj,
            field: RefField::Discovered,
        }
    }

    pub fn next(obj: Oop) -> Self {
        FieldAddr {
            obj,
            field: RefField::Next,
        }
    }
}
