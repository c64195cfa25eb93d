//! Reference Handler - Pending List Consumer
//!
//! Reference processing ends with cleared and finalizable references on the
//! table's pending list. The handler takes that list and hands each
//! reference to whoever waits for it:
//!
//! - FinalReference: the finalizer callback runs with the still-intact
//!   referent, then the referent is cleared
//! - Soft, weak and phantom references: pushed onto a [`ReferenceQueue`]
//!
//! It runs either synchronously ([`ReferenceHandler::process_pending`]) or on
//! a background thread ([`ReferenceHandler::start`] / [`ReferenceHandler::stop`]).

use crate::error::{RefProcError, Result};
use crate::object::{ObjectTable, Oop, ReferenceType};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Callback for finalizable references: (reference, referent)
pub type FinalizerFn = dyn Fn(Oop, Option<Oop>) + Send + Sync;

/// Queue of references whose referent has been cleared
#[derive(Default)]
pub struct ReferenceQueue {
    queue: Mutex<VecDeque<Oop>>,
    available: Condvar,
}

impl ReferenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, obj: Oop) {
        self.queue.lock().push_back(obj);
        self.available.notify_one();
    }

    /// Take the oldest reference without blocking
    pub fn poll(&self) -> Option<Oop> {
        self.queue.lock().pop_front()
    }

    /// Take the oldest reference, waiting up to `timeout`
    pub fn remove_timeout(&self, timeout: Duration) -> Option<Oop> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            if self.available.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Counters of a handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// `process_pending` passes that found work
    pub batches: u64,
    /// References passed to the finalizer
    pub finalized: u64,
    /// References pushed onto the queue
    pub enqueued: u64,
}

struct HandlerInner {
    table: Arc<ObjectTable>,
    queue: Arc<ReferenceQueue>,
    finalizer: Box<FinalizerFn>,
    batches: AtomicU64,
    finalized: AtomicU64,
    enqueued: AtomicU64,
}

impl HandlerInner {
    fn process_pending(&self) -> usize {
        let pending = self.table.take_pending_list();
        if pending.is_empty() {
            return 0;
        }

        for &obj in &pending {
            if self.table.reference_type(obj) == ReferenceType::Final {
                let referent = self.table.referent(obj);
                (self.finalizer)(obj, referent);
                self.table.clear_referent(obj);
                self.finalized.fetch_add(1, Ordering::Relaxed);
            } else {
                self.queue.enqueue(obj);
                self.enqueued.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        log::debug!(target: "gc::ref", "Reference handler processed {} pending references", pending.len());
        pending.len()
    }
}

/// ReferenceHandler - drains the pending list
pub struct ReferenceHandler {
    inner: Arc<HandlerInner>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl ReferenceHandler {
    /// Create handler for `table`
    ///
    /// Finalizable references go to `finalizer`; all others to a fresh
    /// [`ReferenceQueue`].
    pub fn new<F>(table: Arc<ObjectTable>, finalizer: F) -> Self
    where
        F: Fn(Oop, Option<Oop>) + Send + Sync + 'static,
    {
        Self::with_queue(table, Arc::new(ReferenceQueue::new()), finalizer)
    }

    /// Create handler that delivers into an existing queue
    pub fn with_queue<F>(table: Arc<ObjectTable>, queue: Arc<ReferenceQueue>, finalizer: F) -> Self
    where
        F: Fn(Oop, Option<Oop>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(HandlerInner {
                table,
                queue,
                finalizer: Box::new(finalizer),
                batches: AtomicU64::new(0),
                finalized: AtomicU64::new(0),
                enqueued: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Sleep between empty polls of the background thread
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn queue(&self) -> &Arc<ReferenceQueue> {
        &self.inner.queue
    }

    /// Drain the pending list on the calling thread
    ///
    /// Returns the number of references handed out.
    pub fn process_pending(&self) -> usize {
        self.inner.process_pending()
    }

    /// Start the background handler thread
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RefProcError::InvalidState {
                expected: "stopped".to_string(),
                actual: "running".to_string(),
            });
        }

        let inner = Arc::clone(&self.inner);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let spawned = std::thread::Builder::new()
            .name("Reference Handler".to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    if inner.process_pending() == 0 {
                        std::thread::sleep(poll_interval);
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(RefProcError::WorkerSpawn {
                    name: "Reference Handler".to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Stop the background thread and drain what is left
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(RefProcError::InvalidState {
                expected: "running".to_string(),
                actual: "stopped".to_string(),
            });
        }

        if let Some(handle) = self.thread.lock().take() {
            handle
                .join()
                .map_err(|_| RefProcError::Internal("reference handler thread panicked".to_string()))?;
        }

        self.inner.process_pending();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            batches: self.inner.batches.load(Ordering::Relaxed),
            finalized: self.inner.finalized.load(Ordering::Relaxed),
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ReferenceHandler {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
