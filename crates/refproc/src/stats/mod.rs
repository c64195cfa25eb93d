//! Stats Module - Reference Processing Statistics
//!
//! - [`ReferenceProcessorStats`]: per-kind discovered counts returned by
//!   every processing cycle
//! - [`PhaseTimes`]: detailed timings and drop counts of one cycle
//! - [`GcTimer`] / [`ScopedTimer`]: timing helpers

pub mod phase_times;
pub mod timer;

pub use phase_times::{PhaseTimes, PhaseTimesSummary, RefProcPhase, RefProcSubPhase};
pub use timer::{GcTimer, ScopedTimer, TimedPhase};

use crate::object::ReferenceType;
use serde::Serialize;

/// References discovered per kind in one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceProcessorStats {
    pub soft_count: usize,
    pub weak_count: usize,
    pub final_count: usize,
    pub phantom_count: usize,
}

impl ReferenceProcessorStats {
    pub fn new(soft_count: usize, weak_count: usize, final_count: usize, phantom_count: usize) -> Self {
        Self {
            soft_count,
            weak_count,
            final_count,
            phantom_count,
        }
    }

    /// Count for one kind
    pub fn count(&self, kind: ReferenceType) -> usize {
        match kind {
            ReferenceType::Soft => self.soft_count,
            ReferenceType::Weak => self.weak_count,
            ReferenceType::Final => self.final_count,
            ReferenceType::Phantom => self.phantom_count,
            ReferenceType::None => 0,
        }
    }

    /// Sum over all kinds
    pub fn total(&self) -> usize {
        self.soft_count + self.weak_count + self.final_count + self.phantom_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_by_kind() {
        let stats = ReferenceProcessorStats::new(1, 2, 3, 4);
        assert_eq!(stats.count(ReferenceType::Final), 3);
        assert_eq!(stats.count(ReferenceType::None), 0);
        assert_eq!(stats.total(), 10);
    }
}
