//! Reference Processing Logging
//!
//! Every processor owns a [`RefProcLogger`] that keeps a bounded record of
//! structured events and forwards them to the `log` crate under the
//! `gc::ref` target, either human-readable or as JSON lines.
//!
//! Log Levels:
//! - WARN: Soft reference clock warps
//! - INFO: Processing summaries (phase ends too when verbose)
//! - DEBUG: Phase start/skip/end, balancing, preclean aborts
//! - TRACE: Per-queue list counts and per-list drop counts

use log::Level;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log target for all reference processing output
pub const LOG_TARGET: &str = "gc::ref";

/// Events cap; older events are discarded first
const MAX_EVENTS: usize = 4096;

/// Reference processing event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefProcEvent {
    /// Phase about to dispatch work
    PhaseStart {
        phase: String,
        queues: usize,
        mt: bool,
        marks_oops_alive: bool,
    },

    /// Phase had nothing to do
    PhaseSkipped { phase: String, reason: String },

    /// Phase finished
    PhaseEnd { phase: String, duration_ms: f64 },

    /// Per-queue lengths of one kind
    ListCounts {
        label: String,
        counts: Vec<usize>,
        total: usize,
    },

    /// Queues of one kind were rebalanced
    Balanced {
        kind: String,
        total: usize,
        num_queues: usize,
    },

    /// One list was resolved
    ListProcessed {
        kind: String,
        processed: usize,
        dropped: usize,
    },

    /// Precleaning stopped early
    PrecleanAborted { kind: String },

    /// Partial discovery thrown away
    DiscoveryAbandoned { references: usize },

    /// Soft reference clock did not advance
    ClockWarp { now: i64, clock: i64 },

    /// Whole processing cycle finished
    Summary {
        soft: usize,
        weak: usize,
        #[serde(rename = "final")]
        final_refs: usize,
        phantom: usize,
        total_ms: f64,
    },
}

impl RefProcEvent {
    /// Level the event is emitted at
    pub fn level(&self, verbose: bool) -> Level {
        match self {
            RefProcEvent::ClockWarp { .. } => Level::Warn,
            RefProcEvent::Summary { .. } => Level::Info,
            RefProcEvent::PhaseEnd { .. } if verbose => Level::Info,
            RefProcEvent::PhaseStart { .. }
            | RefProcEvent::PhaseSkipped { .. }
            | RefProcEvent::PhaseEnd { .. }
            | RefProcEvent::Balanced { .. }
            | RefProcEvent::PrecleanAborted { .. }
            | RefProcEvent::DiscoveryAbandoned { .. } => Level::Debug,
            RefProcEvent::ListCounts { .. } | RefProcEvent::ListProcessed { .. } => Level::Trace,
        }
    }

    fn human(&self) -> String {
        match self {
            RefProcEvent::PhaseStart {
                phase,
                queues,
                mt,
                marks_oops_alive,
            } => format!(
                "{} queues: {}, {}, marks_oops_alive: {}",
                phase,
                queues,
                if *mt { "Multi" } else { "Single" },
                marks_oops_alive
            ),
            RefProcEvent::PhaseSkipped { phase, reason } => {
                format!("Skipped {} of Reference Processing: {}", phase, reason)
            }
            RefProcEvent::PhaseEnd { phase, duration_ms } => {
                format!("{} {:.3}ms", phase, duration_ms)
            }
            RefProcEvent::ListCounts {
                label,
                counts,
                total,
            } => {
                let counts: Vec<String> = counts.iter().map(|c| c.to_string()).collect();
                format!("{} {} (total: {})", label, counts.join(" "), total)
            }
            RefProcEvent::Balanced {
                kind,
                total,
                num_queues,
            } => format!("Balanced {} {} refs over {} queues", kind, total, num_queues),
            RefProcEvent::ListProcessed {
                kind,
                processed,
                dropped,
            } => format!(
                "Dropped {} {} out of {} in discovered list",
                dropped, kind, processed
            ),
            RefProcEvent::PrecleanAborted { kind } => format!("{} preclean aborted", kind),
            RefProcEvent::DiscoveryAbandoned { references } => {
                format!("Abandoned partial discovery of {} references", references)
            }
            RefProcEvent::ClockWarp { now, clock } => format!(
                "time warp: {} < {}, soft reference clock not updated",
                now, clock
            ),
            RefProcEvent::Summary {
                soft,
                weak,
                final_refs,
                phantom,
                total_ms,
            } => format!(
                "Ref Counts: Soft: {} Weak: {} Final: {} Phantom: {} ({:.3}ms)",
                soft, weak, final_refs, phantom, total_ms
            ),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct RefProcLoggerConfig {
    /// Most detailed level recorded
    pub level: Level,

    /// Emit JSON lines instead of text
    pub json: bool,

    /// Prefix output with a wall-clock timestamp
    pub timestamps: bool,

    /// Promote phase ends to info
    pub verbose: bool,
}

impl Default for RefProcLoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Debug,
            json: false,
            timestamps: false,
            verbose: false,
        }
    }
}

/// Logger for one reference processor
pub struct RefProcLogger {
    config: RefProcLoggerConfig,
    events: Mutex<Vec<(Instant, RefProcEvent)>>,
    enabled: AtomicBool,
}

impl RefProcLogger {
    pub fn new(config: RefProcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Whether an event at `level` would be recorded or emitted
    ///
    /// Lets callers skip building expensive events such as list counts.
    pub fn enabled_for(&self, level: Level) -> bool {
        self.is_enabled() && (level <= self.config.level || level <= log::max_level())
    }

    /// Record and emit an event
    pub fn log(&self, event: RefProcEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level(self.config.verbose);

        if log::log_enabled!(target: LOG_TARGET, level) {
            self.emit(level, &event);
        }

        if level <= self.config.level {
            let mut events = self.events.lock();
            if events.len() >= MAX_EVENTS {
                events.remove(0);
            }
            events.push((Instant::now(), event));
        }
    }

    fn emit(&self, level: Level, event: &RefProcEvent) {
        let body = if self.config.json {
            match serde_json::to_string(event) {
                Ok(json) => json,
                Err(_) => event.human(),
            }
        } else {
            event.human()
        };

        if self.config.timestamps {
            let now = chrono::Local::now();
            log::log!(
                target: LOG_TARGET,
                level,
                "[{}] {}",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                body
            );
        } else {
            log::log!(target: LOG_TARGET, level, "{}", body);
        }
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<RefProcEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for RefProcLogger {
    fn default() -> Self {
        Self::new(RefProcLoggerConfig::default())
    }
}
