//! # refproc - Reference Discovery and Processing
//!
//! refproc is the part of a tracing garbage collector that deals with
//! soft, weak, final and phantom references. During marking the collector
//! hands reference objects to a [`ReferenceProcessor`] instead of tracing
//! their referents; once marking is done the processor decides, per
//! reference, whether to drop it, clear it and publish it, or resurrect its
//! referent for finalization.
//!
//! ## Overview
//!
//! - **Discovery**: lock-free per-queue lists threaded through the
//!   references' own `discovered` fields, with a compare-and-exchange path
//!   for parallel markers
//! - **Ordered phases**: soft/weak/final, then final keep-alive, then
//!   phantom, each one unit of work per queue
//! - **Parallel processing**: queues are balanced and dispatched to a
//!   scoped worker pool sized to the amount of work
//! - **Soft reference policies**: LRU policies driven by a shared,
//!   monotonic soft reference clock
//! - **Precleaning**: concurrent collectors can shrink the lists before the
//!   pause and bail out when a safepoint is requested
//!
//! ## Quick Start
//!
//! ```rust
//! use refproc::{
//!     ClosureProxyTask, Generation, Marker, ObjectTable, PhaseTimes, RawEnqueue,
//!     RefProcConfig, ReferenceProcessor, ReferenceType, WholeHeap,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> refproc::Result<()> {
//!     let table = Arc::new(ObjectTable::new());
//!     let root = table.allocate(Generation::Old)?;
//!     let target = table.allocate(Generation::Old)?;
//!     let weak = table.allocate_reference(ReferenceType::Weak, Some(target), Generation::Old)?;
//!     table.add_field(root, weak)?;
//!
//!     let rp = ReferenceProcessor::new(Arc::clone(&table), RefProcConfig::serial(), WholeHeap)?;
//!     let marker = Marker::new(Arc::clone(&table));
//!
//!     // Mark, handing reference objects to the processor.
//!     rp.enable_discovery();
//!     marker.mark_roots([root]);
//!     marker.trace_discovering(&rp);
//!
//!     // Resolve what was discovered.
//!     let enqueue = RawEnqueue::new(&table);
//!     let mut proxy = ClosureProxyTask::uniform(&marker, &enqueue);
//!     let stats = rp.process_discovered_references(&mut proxy, None, &PhaseTimes::new(1));
//!
//!     assert_eq!(stats.weak_count, 1);
//!     assert_eq!(table.referent(weak), None);
//!     assert_eq!(table.take_pending_list(), vec![weak]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Marking                          │
//! │   Marker ──discover_reference──► ReferenceProcessor     │
//! │                                   [kind × queue lists]  │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ (optional) preclean
//! ┌───────────────────────────▼─────────────────────────────┐
//! │              process_discovered_references              │
//! │  SoftWeakFinalRefs ─► KeepAliveFinalRefs ─► PhantomRefs │
//! │     (balance, MtDegreeAdjuster, WorkerThreads)          │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ pending list
//! ┌───────────────────────────▼─────────────────────────────┐
//! │   ReferenceHandler ──► ReferenceQueue / finalizer        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Object Model
//!
//! Objects live in an [`ObjectTable`] arena and are named by [`Oop`]
//! handles. A reference object carries `referent`, `discovered` and `next`
//! fields stored as atomic words, so list splices and the discovery race
//! behave the way they would on raw heap words.
//!
//! ## Modules
//!
//! - [`closures`]: Collector callbacks (is-alive, keep-alive, enqueue, ...)
//! - [`config`]: Reference processing configuration and validation
//! - [`discovered`]: Discovered lists and their iterator
//! - [`error`]: Error types for all refproc operations
//! - [`logging`]: Structured reference processing events
//! - [`marker`]: Small tracing marker over the object table
//! - [`object`]: Object table, handles and reference kinds
//! - [`policy`]: Soft reference clearing policies and clock
//! - [`processor`]: The reference processor, its phases and balancing
//! - [`runtime`]: Pending list consumer and safepoints
//! - [`stats`]: Phase times and per-cycle statistics
//! - [`workers`]: Scoped worker pool

// Core
pub mod config;
pub mod error;
pub mod object;

// Reference processing
pub mod closures;
pub mod discovered;
pub mod policy;
pub mod processor;

// Collector-side helpers
pub mod marker;
pub mod workers;

// Runtime and monitoring
pub mod logging;
pub mod runtime;
pub mod stats;

// Re-export main types for convenience
pub use closures::{
    BarrierEnqueue, CompleteGc, DiscoveryScope, EnqueueDiscoveredField, GenerationScope, IsAlive,
    KeepAlive, NeverYield, RawEnqueue, WholeHeap, YieldCheck,
};
pub use config::{RediscoveryPolicy, RefProcConfig, SoftRefPolicyKind};
pub use discovered::{DiscoveredList, DiscoveredListIterator};
pub use error::{RefProcError, Result};
pub use logging::{RefProcEvent, RefProcLogger};
pub use marker::Marker;
pub use object::{FieldAddr, Generation, ObjectTable, Oop, RefField, ReferenceType};
pub use policy::{HeapOccupancy, ReferencePolicy, SoftRefClock};
pub use processor::{ClosureProxyTask, RefProcProxyTask, RefProcTask, ReferenceProcessor};
pub use runtime::{ReferenceHandler, ReferenceQueue, Safepoint};
pub use stats::{GcTimer, PhaseTimes, ReferenceProcessorStats};
pub use workers::WorkerThreads;

/// refproc version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
