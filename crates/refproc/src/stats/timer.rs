//! GC Timer - Timing Utilities
//!
//! `GcTimer` measures a whole pause or concurrent pass and collects named
//! sub-phases (e.g. "Preclean SoftReferences"). `ScopedTimer` times one
//! block and reports on drop.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// One recorded phase
#[derive(Debug, Clone, Serialize)]
pub struct TimedPhase {
    pub name: String,
    pub duration_ms: f64,
}

/// GcTimer - timer for measuring GC operations
pub struct GcTimer {
    start: Instant,
    phases: Mutex<Vec<TimedPhase>>,
}

impl GcTimer {
    /// Create new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            phases: Mutex::new(Vec::new()),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    /// Get elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Record a finished phase
    pub fn record_phase(&self, name: &str, duration: Duration) {
        self.phases.lock().push(TimedPhase {
            name: name.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        });
    }

    /// Phases recorded so far, in completion order
    pub fn phases(&self) -> Vec<TimedPhase> {
        self.phases.lock().clone()
    }

    /// Time a named phase that reports into this timer
    pub fn phase<'a>(&'a self, name: &'a str) -> ScopedTimer<'a> {
        ScopedTimer::new(name, move |duration| self.record_phase(name, duration))
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped timer for automatic timing
///
/// Hands the elapsed time to the callback when dropped.
pub struct ScopedTimer<'a> {
    name: &'a str,
    start: Instant,
    callback: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a> ScopedTimer<'a> {
    /// Create scoped timer
    pub fn new<F>(name: &'a str, callback: F) -> Self
    where
        F: FnMut(Duration) + 'a,
    {
        Self {
            name,
            start: Instant::now(),
            callback: Box::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        (self.callback)(duration);
    }
}
