#![forbid(unsafe_code)]

//! One-shot deadline scheduler backed by a single timer thread.
//!
//! # Design
//!
//! Jobs live in a min-heap keyed by `(deadline, sequence)`. The timer thread
//! sleeps on a condition variable until the earliest deadline (or until a new
//! job is pushed), pops every due job, and runs it with the queue unlocked.
//! Jobs sharing a deadline run in scheduling order.
//!
//! The thread is started lazily by the first `schedule_*` call.
//! [`DeadlineScheduler::global`] is never dropped and its thread is never
//! joined, so it does not hold up process exit. Private instances join their
//! thread on [`shutdown`](DeadlineScheduler::shutdown) or drop.
//!
//! # Invariants
//!
//! 1. A job runs at most once, on the timer thread, never before its deadline.
//! 2. A job whose deadline has already passed runs promptly on the timer
//!    thread, never inline in the scheduling call.
//! 3. There is no cancellation. Jobs must tolerate running after whatever
//!    they act on has finished.
//!
//! # Failure Modes
//!
//! - **Job panics**: caught and logged at `error`; the timer thread keeps
//!   running.
//! - **Shutdown with jobs pending**: the jobs are dropped without running.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use web_time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::error::{Result, ScheduleError};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shut_down: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    thread_id: ThreadId,
}

/// Runs one-shot callbacks at or after absolute deadlines.
pub struct DeadlineScheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

static GLOBAL: OnceLock<DeadlineScheduler> = OnceLock::new();

impl DeadlineScheduler {
    /// A private scheduler. Its thread starts on first use.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    /// The process-wide scheduler, configured from the environment on first
    /// access.
    pub fn global() -> &'static DeadlineScheduler {
        GLOBAL.get_or_init(|| Self::new(SchedulerConfig::from_env()))
    }

    /// Configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `job` once on the timer thread, at or after `at`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::ShutDown`] after [`shutdown`](Self::shutdown), or
    /// [`ScheduleError::Spawn`] if the timer thread could not be started.
    pub fn schedule_once(&self, at: Instant, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.ensure_started()?;
        let mut queue = self.shared.queue();
        if queue.shut_down {
            return Err(ScheduleError::ShutDown);
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Entry {
            at,
            seq,
            job: Box::new(job),
        });
        tracing::trace!(
            seq,
            delay_us = at.saturating_duration_since(Instant::now()).as_micros() as u64,
            pending = queue.heap.len(),
            "deadline registered"
        );
        drop(queue);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Run `job` once, `delay` from now.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Unrepresentable`] if `now + delay` overflows the
    /// clock, otherwise as [`schedule_once`](Self::schedule_once).
    pub fn schedule_after(&self, delay: Duration, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let at = Instant::now()
            .checked_add(delay)
            .ok_or(ScheduleError::Unrepresentable)?;
        self.schedule_once(at, job)
    }

    /// Run `job` once, `secs` seconds from now. Negative delays run promptly.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::NonFiniteDelay`] for infinite or NaN `secs`,
    /// otherwise as [`schedule_after`](Self::schedule_after).
    pub fn schedule_after_secs(&self, secs: f64, job: impl FnOnce() + Send + 'static) -> Result<()> {
        if !secs.is_finite() {
            return Err(ScheduleError::NonFiniteDelay { secs });
        }
        let delay =
            Duration::try_from_secs_f64(secs.max(0.0)).map_err(|_| ScheduleError::Unrepresentable)?;
        self.schedule_after(delay, job)
    }

    /// Number of jobs waiting for their deadline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue().heap.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.queue().shut_down
    }

    /// Stop the timer thread and drop every pending job. Idempotent.
    ///
    /// Joins the timer thread unless called from a job running on it.
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = self.shared.queue();
            if queue.shut_down {
                None
            } else {
                queue.shut_down = true;
                Some(std::mem::take(&mut queue.heap))
            }
        };
        self.shared.wake.notify_all();
        let Some(dropped) = dropped else {
            return;
        };
        tracing::debug!(
            thread = %self.config.thread_name,
            dropped = dropped.len(),
            "deadline scheduler shut down"
        );
        drop(dropped);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && worker.thread_id != thread::current().id()
        {
            let _ = worker.handle.join();
        }
    }

    fn ensure_started(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }
        if self.shared.queue().shut_down {
            return Err(ScheduleError::ShutDown);
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || timer_loop(&shared))?;
        tracing::debug!(thread = %self.config.thread_name, "deadline scheduler started");
        *worker = Some(Worker {
            thread_id: handle.thread().id(),
            handle,
        });
        Ok(())
    }
}

impl Drop for DeadlineScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for DeadlineScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue();
        f.debug_struct("DeadlineScheduler")
            .field("thread_name", &self.config.thread_name)
            .field("pending", &queue.heap.len())
            .field("shut_down", &queue.shut_down)
            .finish()
    }
}

fn timer_loop(shared: &Shared) {
    let mut queue = shared.queue();
    loop {
        if queue.shut_down {
            return;
        }
        let now = Instant::now();
        match queue.heap.peek().map(|entry| entry.at) {
            None => {
                queue = shared
                    .wake
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(at) if at <= now => {
                let Some(entry) = queue.heap.pop() else {
                    continue;
                };
                drop(queue);
                run_job(entry);
                queue = shared.queue();
            }
            Some(at) => {
                queue = shared
                    .wake
                    .wait_timeout(queue, at - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }
}

fn run_job(entry: Entry) {
    let Entry { seq, job, .. } = entry;
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(seq, "deadline callback panicked");
    }
}
