//! Soft Reference Policy - When to Clear Soft References
//!
//! Soft references are cleared based on how long ago they were last read.
//! Each soft reference carries the clock value of its last access; a policy
//! compares `clock - timestamp` against an interval derived from heap
//! occupancy at the last collection.
//!
//! ```text
//! clear  ⇔  clock - timestamp > max_interval
//!
//! LRU current heap: max_interval = free_MB            × ms_per_mb
//! LRU max heap:     max_interval = (max - used)_MB    × ms_per_mb
//! ```

use crate::object::{ObjectTable, Oop};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

const M: usize = 1024 * 1024;

lazy_static! {
    static ref CLOCK_ORIGIN: Instant = Instant::now();
}

/// Milliseconds on the process-monotonic clock
pub fn now_millis() -> i64 {
    i64::try_from(CLOCK_ORIGIN.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// Heap numbers a policy primes itself from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapOccupancy {
    /// Free bytes at the end of the last collection
    pub free_bytes: usize,
    /// Used bytes at the end of the last collection
    pub used_bytes: usize,
    /// Maximum heap size
    pub max_bytes: usize,
}

/// Soft reference clearing policy
pub trait ReferencePolicy: Send + Sync {
    /// Prime the policy at the start of a collection
    fn setup(&self, _occupancy: &HeapOccupancy) {}

    /// Whether the soft reference `obj` should be cleared this cycle
    fn should_clear_reference(&self, table: &ObjectTable, obj: Oop, clock: i64) -> bool;
}

/// Clear every soft reference
#[derive(Debug, Default)]
pub struct AlwaysClearPolicy;

impl ReferencePolicy for AlwaysClearPolicy {
    fn should_clear_reference(&self, _table: &ObjectTable, _obj: Oop, _clock: i64) -> bool {
        true
    }
}

/// Never clear a soft reference
#[derive(Debug, Default)]
pub struct NeverClearPolicy;

impl ReferencePolicy for NeverClearPolicy {
    fn should_clear_reference(&self, _table: &ObjectTable, _obj: Oop, _clock: i64) -> bool {
        false
    }
}

fn lru_should_clear(table: &ObjectTable, obj: Oop, clock: i64, max_interval: i64) -> bool {
    let interval = clock - table.soft_timestamp(obj);
    interval > max_interval
}

/// LRU policy scaled by free space at the last collection
#[derive(Debug)]
pub struct LruCurrentHeapPolicy {
    ms_per_mb: i64,
    max_interval: AtomicI64,
}

impl LruCurrentHeapPolicy {
    pub fn new(ms_per_mb: i64) -> Self {
        Self {
            ms_per_mb,
            max_interval: AtomicI64::new(0),
        }
    }

    /// Interval computed by the last `setup`
    pub fn max_interval(&self) -> i64 {
        self.max_interval.load(Ordering::Relaxed)
    }
}

impl ReferencePolicy for LruCurrentHeapPolicy {
    fn setup(&self, occupancy: &HeapOccupancy) {
        let free_mb = (occupancy.free_bytes / M) as i64;
        self.max_interval
            .store(free_mb.saturating_mul(self.ms_per_mb), Ordering::Relaxed);
    }

    fn should_clear_reference(&self, table: &ObjectTable, obj: Oop, clock: i64) -> bool {
        lru_should_clear(table, obj, clock, self.max_interval())
    }
}

/// LRU policy scaled by headroom to the maximum heap size
#[derive(Debug)]
pub struct LruMaxHeapPolicy {
    ms_per_mb: i64,
    max_interval: AtomicI64,
}

impl LruMaxHeapPolicy {
    pub fn new(ms_per_mb: i64) -> Self {
        Self {
            ms_per_mb,
            max_interval: AtomicI64::new(0),
        }
    }

    pub fn max_interval(&self) -> i64 {
        self.max_interval.load(Ordering::Relaxed)
    }
}

impl ReferencePolicy for LruMaxHeapPolicy {
    fn setup(&self, occupancy: &HeapOccupancy) {
        let headroom = occupancy.max_bytes.saturating_sub(occupancy.used_bytes);
        let headroom_mb = (headroom / M) as i64;
        self.max_interval
            .store(headroom_mb.saturating_mul(self.ms_per_mb), Ordering::Relaxed);
    }

    fn should_clear_reference(&self, table: &ObjectTable, obj: Oop, clock: i64) -> bool {
        lru_should_clear(table, obj, clock, self.max_interval())
    }
}

/// Soft reference clock
///
/// Updated once per collection and read by mutators when they touch a soft
/// reference. Never moves backwards.
#[derive(Debug)]
pub struct SoftRefClock {
    millis: AtomicI64,
}

impl SoftRefClock {
    /// Clock starting at the current monotonic time
    pub fn new() -> Self {
        Self::starting_at(now_millis())
    }

    /// Clock starting at `millis`
    pub fn starting_at(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Current clock value
    pub fn get(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }

    /// Advance to the current monotonic time
    pub fn update(&self) -> bool {
        self.update_to(now_millis())
    }

    /// Advance to `now`
    ///
    /// Returns false if the time source went backwards; the clock is then
    /// left unchanged.
    pub fn update_to(&self, now: i64) -> bool {
        if now < self.get() {
            return false;
        }
        self.millis.fetch_max(now, Ordering::AcqRel);
        true
    }

    /// Mutator-side soft reference read: stamp `obj` with the clock
    pub fn record_access(&self, table: &ObjectTable, obj: Oop) {
        let clock = self.get();
        if table.soft_timestamp(obj) != clock {
            table.set_soft_timestamp(obj, clock);
        }
    }
}

impl Default for SoftRefClock {
    fn default() -> Self {
        Self::new()
    }
}
