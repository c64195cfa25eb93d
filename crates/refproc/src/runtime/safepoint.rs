//! Safepoint Requests
//!
//! Concurrent precleaning runs alongside mutators. When the collector wants
//! a pause it raises a request here and precleaning gets out of the way:
//!
//! - [`Safepoint::request_at_list_boundary`]: finish the list being
//!   precleaned, then return
//! - [`Safepoint::request_safepoint`]: return before the next reference
//!
//! The request stays raised until [`Safepoint::release_safepoint`].

use crate::closures::YieldCheck;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Safepoint - pause request polled by precleaning
///
/// # Examples
///
/// ```rust
/// use refproc::runtime::Safepoint;
/// use refproc::closures::YieldCheck;
///
/// let safepoint = Safepoint::new();
/// assert!(!safepoint.should_return());
///
/// safepoint.request_at_list_boundary();
/// assert!(safepoint.should_return());
/// assert!(!safepoint.should_return_fine_grain());
///
/// safepoint.request_safepoint();
/// assert!(safepoint.should_return_fine_grain());
///
/// safepoint.release_safepoint();
/// assert!(!safepoint.is_requested());
/// ```
#[derive(Debug, Default)]
pub struct Safepoint {
    /// Yield between lists
    coarse: AtomicBool,

    /// Yield between references
    urgent: AtomicBool,

    /// Requests raised since creation
    requests: AtomicU64,
}

impl Safepoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask precleaning to stop as soon as possible
    pub fn request_safepoint(&self) {
        self.coarse.store(true, Ordering::SeqCst);
        self.urgent.store(true, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Ask precleaning to stop once the current list is done
    pub fn request_at_list_boundary(&self) {
        self.coarse.store(true, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop any pending request
    pub fn release_safepoint(&self) {
        self.urgent.store(false, Ordering::SeqCst);
        self.coarse.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.coarse.load(Ordering::Acquire) || self.urgent.load(Ordering::Acquire)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl YieldCheck for Safepoint {
    fn should_return(&self) -> bool {
        self.is_requested()
    }

    fn should_return_fine_grain(&self) -> bool {
        self.urgent.load(Ordering::Acquire)
    }
}
