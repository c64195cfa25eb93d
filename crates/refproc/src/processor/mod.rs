//! Reference Processor - Discovery and Processing of Reference Objects
//!
//! During marking the collector offers every reference object whose
//! referent is not yet known to be strongly reachable to
//! [`ReferenceProcessor::discover_reference`]. Discovered references are
//! parked on per-kind, per-queue [`DiscoveredList`]s instead of having their
//! referents traced. After marking,
//! [`ReferenceProcessor::process_discovered_references`] resolves them in
//! three ordered phases:
//!
//! ```text
//! ┌──────────────────────┐   ┌─────────────────────────┐   ┌──────────────────┐
//! │ SoftWeakFinalRefs    │──►│ KeepAliveFinalRefs      │──►│ PhantomRefs      │
//! │ drop live / cleared, │   │ resurrect final         │   │ drop live /      │
//! │ clear + enqueue dead │   │ referents, self-loop    │   │ cleared, clear + │
//! │ soft and weak        │   │ next, enqueue           │   │ enqueue dead     │
//! └──────────────────────┘   └─────────────────────────┘   └──────────────────┘
//! ```
//!
//! Every reference that is not dropped ends up on the table's pending list.
//!
//! ## Queues
//!
//! Each kind has `max_num_queues = max(processing degree, discovery degree)`
//! lists. Multi-threaded discovery appends to the discovering worker's own
//! queue; single-threaded discovery feeding parallel processing spreads
//! references round-robin. Before a parallel phase the queues are balanced
//! so only the first `num_queues` hold work.

pub mod adjuster;
pub mod balance;
pub mod phases;
pub mod preclean;
pub mod tasks;

pub use adjuster::MtDegreeAdjuster;
pub use balance::balance_queues;
pub use tasks::{ClosureProxyTask, RefProcProxyTask, RefProcTask, RefProcThreadModel};

use crate::closures::{DiscoveryScope, IsAlive};
use crate::config::{RediscoveryPolicy, RefProcConfig, SoftRefPolicyKind};
use crate::debug_assert_context;
use crate::discovered::DiscoveredList;
use crate::error::Result;
use crate::logging::{RefProcEvent, RefProcLogger, RefProcLoggerConfig};
use crate::object::{ObjectTable, Oop, ReferenceType};
use crate::policy::{
    now_millis, AlwaysClearPolicy, HeapOccupancy, LruCurrentHeapPolicy, LruMaxHeapPolicy,
    ReferencePolicy, SoftRefClock,
};
use crate::workers::current_worker_id;
use log::Level;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// ReferenceProcessor - owns the discovered lists of one collector
pub struct ReferenceProcessor {
    table: Arc<ObjectTable>,
    config: RefProcConfig,

    discovery_scope: Box<dyn DiscoveryScope>,
    /// Referent liveness known without the mark word, checked at discovery
    is_alive_non_header: Option<Arc<dyn IsAlive>>,

    discovering_refs: AtomicBool,
    discovery_is_concurrent: bool,
    discovery_is_mt: AtomicBool,

    max_num_queues: usize,
    num_queues: AtomicUsize,
    next_id: AtomicUsize,

    /// Soft, weak, final and phantom lists, `max_num_queues` each
    discovered_refs: Box<[DiscoveredList]>,

    soft_ref_clock: Arc<SoftRefClock>,
    /// Clock value snapshotted when discovery was enabled
    soft_ref_timestamp_clock: AtomicI64,
    always_clear_policy: Arc<dyn ReferencePolicy>,
    default_soft_ref_policy: Arc<dyn ReferencePolicy>,
    current_soft_ref_policy: RwLock<Arc<dyn ReferencePolicy>>,

    logger: RefProcLogger,
}

impl ReferenceProcessor {
    /// Create processor for `table`
    ///
    /// Only references for which `discovery_scope` answers true are
    /// discovered.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use refproc::{ObjectTable, RefProcConfig, ReferenceProcessor, WholeHeap};
    /// use std::sync::Arc;
    ///
    /// let table = Arc::new(ObjectTable::new());
    /// let rp = ReferenceProcessor::new(table, RefProcConfig::serial(), WholeHeap).unwrap();
    /// assert_eq!(rp.max_num_queues(), 1);
    /// assert!(!rp.discovery_enabled());
    /// ```
    pub fn new(
        table: Arc<ObjectTable>,
        config: RefProcConfig,
        discovery_scope: impl DiscoveryScope + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let max_num_queues = config.max_num_queues();
        let discovered_refs = (0..max_num_queues * ReferenceType::COUNT)
            .map(|_| DiscoveredList::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let default_soft_ref_policy: Arc<dyn ReferencePolicy> = match config.soft_ref_policy {
            SoftRefPolicyKind::LruCurrentHeap => {
                Arc::new(LruCurrentHeapPolicy::new(config.soft_ref_lru_policy_ms_per_mb))
            }
            SoftRefPolicyKind::LruMaxHeap => {
                Arc::new(LruMaxHeapPolicy::new(config.soft_ref_lru_policy_ms_per_mb))
            }
        };

        let soft_ref_clock = Arc::new(SoftRefClock::new());
        let logger = RefProcLogger::new(RefProcLoggerConfig {
            json: config.json_log,
            verbose: config.verbose,
            ..Default::default()
        });

        Ok(Self {
            table,
            discovery_scope: Box::new(discovery_scope),
            is_alive_non_header: None,
            discovering_refs: AtomicBool::new(false),
            discovery_is_concurrent: config.concurrent_discovery,
            discovery_is_mt: AtomicBool::new(config.mt_discovery_degree > 1),
            max_num_queues,
            num_queues: AtomicUsize::new(config.mt_processing_degree),
            next_id: AtomicUsize::new(0),
            discovered_refs,
            soft_ref_timestamp_clock: AtomicI64::new(soft_ref_clock.get()),
            soft_ref_clock,
            always_clear_policy: Arc::new(AlwaysClearPolicy),
            current_soft_ref_policy: RwLock::new(Arc::clone(&default_soft_ref_policy)),
            default_soft_ref_policy,
            logger,
            config,
        })
    }

    /// Use `oracle` to skip discovery of references with reachable referents
    pub fn with_is_alive_non_header(mut self, oracle: Arc<dyn IsAlive>) -> Self {
        self.is_alive_non_header = Some(oracle);
        self
    }

    /// Share a soft reference clock, e.g. with mutators or other processors
    pub fn with_soft_ref_clock(self, clock: Arc<SoftRefClock>) -> Self {
        self.soft_ref_timestamp_clock
            .store(clock.get(), Ordering::Release);
        Self {
            soft_ref_clock: clock,
            ..self
        }
    }

    /// Replace the policy used when soft references are not cleared outright
    pub fn with_soft_ref_policy(self, policy: Arc<dyn ReferencePolicy>) -> Self {
        *self.current_soft_ref_policy.write() = Arc::clone(&policy);
        Self {
            default_soft_ref_policy: policy,
            ..self
        }
    }

    pub fn set_is_alive_non_header(&mut self, oracle: Option<Arc<dyn IsAlive>>) {
        self.is_alive_non_header = oracle;
    }

    pub fn is_alive_non_header(&self) -> Option<&Arc<dyn IsAlive>> {
        self.is_alive_non_header.as_ref()
    }

    pub fn set_discovery_scope(&mut self, scope: impl DiscoveryScope + 'static) {
        self.discovery_scope = Box::new(scope);
    }

    pub fn table(&self) -> &Arc<ObjectTable> {
        &self.table
    }

    pub fn config(&self) -> &RefProcConfig {
        &self.config
    }

    pub fn logger(&self) -> &RefProcLogger {
        &self.logger
    }

    // ------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------

    pub fn max_num_queues(&self) -> usize {
        self.max_num_queues
    }

    /// Active processing degree
    pub fn num_queues(&self) -> usize {
        self.num_queues.load(Ordering::Acquire)
    }

    /// Set the active processing degree
    pub fn set_active_mt_degree(&self, v: usize) {
        debug_assert_context!(
            v <= self.max_num_queues,
            "Mismatch between processing degree {} and number of queues {}",
            v,
            self.max_num_queues
        );
        self.num_queues.store(v, Ordering::Release);
        self.next_id.store(0, Ordering::Release);
    }

    pub fn processing_is_mt(&self) -> bool {
        self.config.parallel_ref_proc_enabled && self.num_queues() > 1
    }

    /// Lists of one kind, `max_num_queues` long
    pub fn discovered_lists(&self, kind: ReferenceType) -> &[DiscoveredList] {
        let start = kind.list_index() * self.max_num_queues;
        &self.discovered_refs[start..start + self.max_num_queues]
    }

    /// List of `kind` for queue `queue`
    pub fn discovered_list(&self, kind: ReferenceType, queue: usize) -> &DiscoveredList {
        &self.discovered_lists(kind)[queue]
    }

    /// Name of the list at flat index `i`
    pub fn list_name(&self, i: usize) -> &'static str {
        match i / self.max_num_queues {
            0 => "SoftRef",
            1 => "WeakRef",
            2 => "FinalRef",
            3 => "PhantomRef",
            _ => "Unknown",
        }
    }

    /// References currently on all lists of `kind`
    pub fn total_reference_count(&self, kind: ReferenceType) -> usize {
        self.discovered_lists(kind)
            .iter()
            .map(DiscoveredList::length)
            .sum()
    }

    /// Visit the head of every non-empty list
    pub fn heads_do(&self, mut f: impl FnMut(ReferenceType, usize, Oop)) {
        for kind in ReferenceType::DISCOVERABLE {
            for (queue, list) in self.discovered_lists(kind).iter().enumerate() {
                if let Some(head) = list.head() {
                    f(kind, queue, head);
                }
            }
        }
    }

    /// Debug check that no references are recorded
    pub fn verify_no_references_recorded(&self) {
        for (i, list) in self.discovered_refs.iter().enumerate() {
            debug_assert_context!(
                list.is_empty(),
                "Found non-empty discovered list {} at {}",
                self.list_name(i),
                i
            );
        }
    }

    fn verify_total_count_zero(&self, kind: ReferenceType) {
        debug_assert_context!(
            self.total_reference_count(kind) == 0,
            "{}s must be empty but has {} elements",
            kind.name(),
            self.total_reference_count(kind)
        );
    }

    fn log_reflist(&self, label: &str, kind: ReferenceType) {
        if !self.logger.enabled_for(Level::Trace) {
            return;
        }
        let counts: Vec<usize> = self
            .discovered_lists(kind)
            .iter()
            .map(DiscoveredList::length)
            .collect();
        let total = counts.iter().sum();
        self.logger.log(RefProcEvent::ListCounts {
            label: label.to_string(),
            counts,
            total,
        });
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Start discovering references
    pub fn enable_discovery(&self) {
        debug_assert_context!(!self.discovery_enabled(), "nested call?");
        self.verify_no_references_recorded();

        // Pick up any change made to the shared clock between collections.
        self.soft_ref_timestamp_clock
            .store(self.soft_ref_clock.get(), Ordering::Release);
        self.discovering_refs.store(true, Ordering::Release);
    }

    pub fn disable_discovery(&self) {
        self.discovering_refs.store(false, Ordering::Release);
    }

    pub fn discovery_enabled(&self) -> bool {
        self.discovering_refs.load(Ordering::Acquire)
    }

    pub fn discovery_is_concurrent(&self) -> bool {
        self.discovery_is_concurrent
    }

    pub fn discovery_is_stw(&self) -> bool {
        !self.discovery_is_concurrent
    }

    pub fn discovery_is_mt(&self) -> bool {
        self.discovery_is_mt.load(Ordering::Acquire)
    }

    pub fn set_mt_discovery(&self, mt: bool) {
        self.discovery_is_mt.store(mt, Ordering::Release);
    }

    /// Round-robin queue for single-threaded discovery
    fn next_id(&self) -> usize {
        debug_assert_context!(
            !self.discovery_is_mt(),
            "Round robin should only be used in serial discovery"
        );
        let num_queues = self.num_queues();
        self.next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                Some(if id + 1 >= num_queues { 0 } else { id + 1 })
            })
            .unwrap_or_else(|id| id)
    }

    fn get_discovered_list(&self, kind: ReferenceType) -> &DiscoveredList {
        let id = if self.discovery_is_mt() {
            // Outside a worker the caller acts as worker 0.
            current_worker_id().unwrap_or(0)
        } else if self.processing_is_mt() {
            self.next_id()
        } else {
            0
        };
        debug_assert_context!(
            id < self.max_num_queues,
            "Id is out of bounds id {} and max id {}",
            id,
            self.max_num_queues
        );
        self.discovered_list(kind, id)
    }

    /// Offer `obj` of kind `kind` for discovery
    ///
    /// Returns true if the reference is (now or already) on a discovered
    /// list; the caller must then not trace its referent.
    ///
    /// Under multi-threaded discovery the list is picked by the caller's
    /// worker id ([`with_worker_id`](crate::workers::with_worker_id) or a
    /// [`WorkerThreads`](crate::WorkerThreads) unit). Callers without one
    /// all share queue 0.
    pub fn discover_reference(&self, obj: Oop, kind: ReferenceType) -> bool {
        debug_assert_context!(kind.is_reference(), "{} is not a reference", obj);

        if !self.discovery_enabled() || !self.config.register_references {
            return false;
        }

        // An inactive FinalReference has already been processed once.
        if kind == ReferenceType::Final && self.table.next(obj).is_some() {
            return false;
        }

        if !self.discovery_scope.is_subject_to_discovery(obj) {
            return false;
        }

        if let Some(oracle) = &self.is_alive_non_header {
            if let Some(referent) = self.table.referent(obj) {
                if oracle.is_alive(referent) {
                    return false;
                }
            }
        }

        if kind == ReferenceType::Soft {
            let clock = self.soft_ref_timestamp_clock.load(Ordering::Acquire);
            let policy = self.current_soft_ref_policy.read();
            if !policy.should_clear_reference(&self.table, obj, clock) {
                return false;
            }
        }

        if self.table.discovered(obj).is_some() {
            log::trace!(target: "gc::ref", "Already discovered reference ({}: {})", obj, kind.name());
            return match self.config.rediscovery {
                RediscoveryPolicy::TreatAsDiscovered => true,
                RediscoveryPolicy::Ignore => false,
            };
        }

        let list = self.get_discovered_list(kind);
        self.add_to_discovered_list(list, obj, kind)
    }

    fn add_to_discovered_list(&self, list: &DiscoveredList, obj: Oop, kind: ReferenceType) -> bool {
        let old_head = list.head();
        // The tail of a list links to itself.
        let next_discovered = old_head.unwrap_or(obj);

        if self.discovery_is_mt() {
            if self.table.cas_discovered(obj, next_discovered) {
                // `obj` is ours now. Threads outside the worker pool share
                // queue 0, so the head is published with a CAS as well.
                let mut head = old_head;
                while !list.cas_head(head, obj) {
                    head = list.head();
                    self.table.set_discovered_raw(obj, Some(head.unwrap_or(obj)));
                }
                log::trace!(target: "gc::ref", "Discovered reference (mt) ({}: {})", obj, kind.name());
            } else {
                // Another thread won; the reference is on its list.
                log::trace!(target: "gc::ref", "Already discovered reference ({}: {})", obj, kind.name());
            }
        } else {
            debug_assert_context!(
                self.table.discovered(obj).is_none(),
                "discovered field of {} already set",
                obj
            );
            self.table.set_discovered_raw(obj, Some(next_discovered));
            list.add_as_head(obj);
            log::trace!(target: "gc::ref", "Discovered reference ({}: {})", obj, kind.name());
        }

        true
    }

    /// Throw away everything discovered so far
    ///
    /// Every abandoned reference gets a null discovered field, so it can be
    /// discovered again by the next marking attempt.
    pub fn abandon_partial_discovery(&self) {
        let mut abandoned = 0;
        for (i, list) in self.discovered_refs.iter().enumerate() {
            if i % self.max_num_queues == 0 {
                log::trace!(target: "gc::ref", "Abandoning {} discovered list", self.list_name(i));
            }
            abandoned += list.length();
            self.clear_discovered_references(list);
        }
        self.logger
            .log(RefProcEvent::DiscoveryAbandoned { references: abandoned });
    }

    fn clear_discovered_references(&self, list: &DiscoveredList) {
        let mut obj = None;
        let mut next = list.head();
        while next != obj {
            obj = next;
            if let Some(current) = obj {
                next = self.table.discovered(current);
                self.table.set_discovered_raw(current, None);
            }
        }
        list.clear();
    }

    // ------------------------------------------------------------------
    // Soft reference policy
    // ------------------------------------------------------------------

    /// Select and prime the soft reference policy for the next cycle
    ///
    /// With `always_clear` every soft reference that reaches discovery is
    /// treated like a weak one.
    pub fn setup_policy(&self, always_clear: bool, occupancy: &HeapOccupancy) {
        let policy = if always_clear {
            Arc::clone(&self.always_clear_policy)
        } else {
            Arc::clone(&self.default_soft_ref_policy)
        };
        policy.setup(occupancy);
        *self.current_soft_ref_policy.write() = policy;
    }

    pub fn soft_ref_clock(&self) -> &Arc<SoftRefClock> {
        &self.soft_ref_clock
    }

    /// Clock value soft references are compared against during discovery
    pub fn soft_ref_timestamp_clock(&self) -> i64 {
        self.soft_ref_timestamp_clock.load(Ordering::Acquire)
    }

    /// Advance the shared soft reference clock to now
    pub(crate) fn update_soft_ref_master_clock(&self) {
        let now = now_millis();
        let clock = self.soft_ref_clock.get();
        if !self.soft_ref_clock.update_to(now) {
            self.logger.log(RefProcEvent::ClockWarp { now, clock });
        }
    }
}
