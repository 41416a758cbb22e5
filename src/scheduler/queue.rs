use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A deferred notification. Keyed by the id of the store it notifies.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// How a non-empty queue gets flushed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Spawn the flush on the ambient tokio runtime if there is one,
    /// otherwise flush synchronously.
    #[default]
    Auto,
    /// The host loop calls [`Scheduler::flush`] itself.
    Manual,
    /// Flush synchronously as soon as something is queued.
    Immediate,
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<(u64, Task)>,
    pending: FxHashSet<u64>,
    scheduled: bool,
    flushing: bool,
}

struct SchedulerInner {
    queue: Mutex<Queue>,
    mode: Mutex<FlushMode>,
}

/// Deduplicating FIFO of notify tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(mode: FlushMode) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(Queue::default()),
                mode: Mutex::new(mode),
            }),
        }
    }

    pub fn mode(&self) -> FlushMode {
        *self.inner.mode.lock()
    }

    pub fn set_mode(&self, mode: FlushMode) {
        *self.inner.mode.lock() = mode;
    }

    /// Queue `task` under `key`. A key that is already queued is left where
    /// it is and the new task is dropped.
    pub fn schedule(&self, key: u64, task: Task) {
        let trigger = {
            let mut queue = self.inner.queue.lock();
            if !queue.pending.insert(key) {
                tracing::trace!(key, "notification already queued");
                return;
            }
            queue.tasks.push_back((key, task));
            !std::mem::replace(&mut queue.scheduled, true)
        };
        if trigger {
            self.trigger();
        }
    }

    fn trigger(&self) {
        match self.mode() {
            FlushMode::Manual => {}
            FlushMode::Immediate => {
                self.flush();
            }
            FlushMode::Auto => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let scheduler = self.clone();
                    handle.spawn(async move {
                        scheduler.flush();
                    });
                }
                Err(_) => {
                    tracing::trace!("no async host available, flushing synchronously");
                    self.flush();
                }
            },
        }
    }

    /// Run queued tasks in FIFO order until the queue is empty, including
    /// tasks queued by the tasks themselves. Returns how many ran.
    ///
    /// A call made while another flush is running returns 0 immediately;
    /// the running flush drains whatever is queued.
    pub fn flush(&self) -> usize {
        {
            let mut queue = self.inner.queue.lock();
            if queue.flushing {
                return 0;
            }
            queue.flushing = true;
        }
        let guard = FlushGuard { inner: &self.inner };
        let mut ran = 0;
        loop {
            let next = {
                let mut queue = self.inner.queue.lock();
                match queue.tasks.pop_front() {
                    Some((key, task)) => {
                        queue.pending.remove(&key);
                        Some(task)
                    }
                    None => {
                        queue.scheduled = false;
                        queue.flushing = false;
                        None
                    }
                }
            };
            let Some(task) = next else { break };
            task();
            ran += 1;
        }
        std::mem::forget(guard);
        tracing::trace!(ran, "scheduler flushed");
        ran
    }

    /// Number of tasks waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().tasks.len()
    }
}

/// Unblocks the queue if a task panics mid-flush.
struct FlushGuard<'a> {
    inner: &'a SchedulerInner,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let mut queue = self.inner.queue.lock();
        queue.flushing = false;
        queue.scheduled = false;
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("mode", &self.mode())
            .field("pending", &self.pending())
            .finish()
    }
}
