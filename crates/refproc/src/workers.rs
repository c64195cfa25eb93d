//! Worker Threads - Parallel Dispatch of Per-Queue Work
//!
//! `WorkerThreads::run_task(task, n)` calls `task.work(i)` exactly once for
//! every `i < n`. Work indices are handed out through a
//! `crossbeam_deque::Injector`; scoped threads and the calling thread all
//! pull from it until it is empty, so a thread that cannot be spawned only
//! costs parallelism.
//!
//! While a unit runs, its index is the thread's worker id
//! ([`current_worker_id`]). Multi-threaded discovery uses that id to pick
//! the discovering thread's own queue.

use crate::error::{RefProcError, Result};
use crossbeam_deque::{Injector, Steal};
use std::any::Any;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Worker id of the calling thread, if it is running a worker unit
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(|id| id.get())
}

/// Run `f` with the calling thread's worker id set to `id`
///
/// The previous id is restored afterwards, also on unwind.
pub fn with_worker_id<R>(id: usize, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<usize>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let prev = self.0;
            WORKER_ID.with(|slot| slot.set(prev));
        }
    }

    let _restore = Restore(WORKER_ID.with(|slot| slot.replace(Some(id))));
    f()
}

/// A unit of parallel work
pub trait WorkerTask: Sync {
    fn work(&self, worker_id: usize);
}

impl<F> WorkerTask for F
where
    F: Fn(usize) + Sync,
{
    fn work(&self, worker_id: usize) {
        self(worker_id)
    }
}

/// Counters of a worker pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// `run_task` calls
    pub runs: u64,
    /// Units executed
    pub units: u64,
    /// Threads that could not be spawned
    pub spawn_failures: u64,
}

/// Worker pool
pub struct WorkerThreads {
    name: String,
    max_workers: usize,
    active_workers: AtomicUsize,
    runs: AtomicU64,
    units: AtomicU64,
    spawn_failures: AtomicU64,
}

impl WorkerThreads {
    /// Create pool of up to `max_workers` workers, all active
    pub fn new(name: impl Into<String>, max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(RefProcError::InvalidArgument(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        Ok(Self {
            name: name.into(),
            max_workers,
            active_workers: AtomicUsize::new(max_workers),
            runs: AtomicU64::new(0),
            units: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Set active worker count, clamped to `1..=max_workers`
    ///
    /// Returns the count actually set.
    pub fn set_active_workers(&self, n: usize) -> usize {
        let n = n.clamp(1, self.max_workers);
        self.active_workers.store(n, Ordering::Release);
        n
    }

    /// Run `task.work(i)` for every `i < num_units`
    ///
    /// Returns once all units have finished. A panic in any unit is
    /// propagated to the caller.
    pub fn run_task(&self, task: &dyn WorkerTask, num_units: usize) {
        if num_units == 0 {
            return;
        }

        self.runs.fetch_add(1, Ordering::Relaxed);
        self.units.fetch_add(num_units as u64, Ordering::Relaxed);

        let injector = Injector::new();
        for i in 0..num_units {
            injector.push(i);
        }

        let threads = num_units.min(self.active_workers());
        if threads == 1 {
            drain(&injector, task);
            return;
        }

        let result = crossbeam::thread::scope(|scope| {
            for t in 1..threads {
                let injector = &injector;
                let spawned = scope
                    .builder()
                    .name(format!("{}#{}", self.name, t))
                    .spawn(move |_| drain(injector, task));

                if let Err(err) = spawned {
                    self.spawn_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        target: "gc::ref",
                        "{}: failed to spawn worker {}: {}",
                        self.name,
                        t,
                        err
                    );
                }
            }

            // The caller is worker 0 and picks up whatever is left.
            drain(&injector, task);
        });

        if let Err(payload) = result {
            // Re-raise the first worker panic with its own payload.
            let payload = match payload.downcast::<Vec<Box<dyn Any + Send + 'static>>>() {
                Ok(mut panics) if !panics.is_empty() => panics.swap_remove(0),
                Ok(_) => Box::new("worker thread panicked") as Box<dyn Any + Send>,
                Err(other) => other,
            };
            std::panic::resume_unwind(payload);
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            runs: self.runs.load(Ordering::Relaxed),
            units: self.units.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
        }
    }
}

fn drain(injector: &Injector<usize>, task: &dyn WorkerTask) {
    loop {
        match injector.steal() {
            Steal::Success(i) => with_worker_id(i, || task.work(i)),
            Steal::Empty => break,
            Steal::Retry => continue,
        }
    }
}
