//! Time-windowed coalescing of value writes.
//!
//! The first `add` in an idle batcher arms a timer; every later `add` in the
//! same window overwrites the entry for its path. When the timer fires (or
//! `flush` is called) all entries go to the flush handler as one aggregate
//! write.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use formbridge_api::Value;

use crate::{lock, Result};

/// A queued write. `value: None` clears the path.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub path: String,
    pub value: Option<Value>,
}

impl PendingUpdate {
    pub fn new(path: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

impl From<PendingUpdate> for (String, Option<Value>) {
    fn from(update: PendingUpdate) -> Self {
        (update.path, update.value)
    }
}

/// Receives every aggregate write.
pub type FlushHandler = Arc<dyn Fn(Vec<PendingUpdate>) -> Result<()> + Send + Sync>;

type FlushCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    Idle,
    Pending,
}

#[derive(Default)]
struct Queue {
    entries: IndexMap<String, Option<Value>>,
    callbacks: Vec<FlushCallback>,
    waiters: Vec<oneshot::Sender<()>>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    disposed: bool,
}

impl Queue {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn discard(&mut self) {
        self.cancel_timer();
        self.entries.clear();
        self.callbacks.clear();
        // dropping the senders wakes every waiter
        self.waiters.clear();
    }
}

struct Inner {
    delay: Duration,
    handler: FlushHandler,
    queue: Mutex<Queue>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(queue) = self.queue.get_mut() {
            if let Some(timer) = queue.timer.take() {
                timer.abort();
            }
        }
    }
}

/// Coalescing write queue. Cloning shares the queue.
#[derive(Clone)]
pub struct UpdateBatcher {
    inner: Arc<Inner>,
}

/// Non-owning handle to a batcher.
#[derive(Clone)]
pub(crate) struct WeakBatcher(Weak<Inner>);

impl WeakBatcher {
    pub(crate) fn upgrade(&self) -> Option<UpdateBatcher> {
        self.0.upgrade().map(|inner| UpdateBatcher { inner })
    }
}

impl UpdateBatcher {
    pub fn new(delay: Duration, handler: FlushHandler) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                handler,
                queue: Mutex::new(Queue::default()),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    pub fn state(&self) -> BatcherState {
        if lock(&self.inner.queue).entries.is_empty() {
            BatcherState::Idle
        } else {
            BatcherState::Pending
        }
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.inner.queue).entries.len()
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.queue).disposed
    }

    pub fn is_timer_armed(&self) -> bool {
        lock(&self.inner.queue).timer.is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakBatcher {
        WeakBatcher(Arc::downgrade(&self.inner))
    }

    /// Queue a write. Returns false if the batcher has been disposed.
    pub fn add(&self, path: impl Into<String>, value: Option<Value>) -> bool {
        let path = path.into();
        let mut queue = lock(&self.inner.queue);
        if queue.disposed {
            warn!("Ignoring update to '{}' on a disposed batcher", path);
            return false;
        }
        queue.entries.insert(path, value);
        if queue.timer.is_none() {
            self.arm_timer(&mut queue);
        }
        true
    }

    fn arm_timer(&self, queue: &mut Queue) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("No tokio runtime; batch stays pending until flushed");
            return;
        };
        queue.generation = queue.generation.wrapping_add(1);
        let generation = queue.generation;
        let delay = self.inner.delay;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        queue.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let batcher = UpdateBatcher { inner };
                if let Err(e) = batcher.flush_timer(generation) {
                    error!("Batched write failed: {}", e);
                }
            }
        }));
    }

    fn flush_timer(&self, generation: u64) -> Result<()> {
        let mut queue = lock(&self.inner.queue);
        if queue.generation != generation || queue.timer.is_none() {
            return Ok(());
        }
        // this task is the timer; release the handle without aborting ourselves
        queue.timer = None;
        self.drain_and_write(queue)
    }

    /// Write everything queued now. Empty queue: no-op.
    pub fn flush(&self) -> Result<()> {
        let mut queue = lock(&self.inner.queue);
        queue.cancel_timer();
        self.drain_and_write(queue)
    }

    fn drain_and_write(&self, mut queue: std::sync::MutexGuard<'_, Queue>) -> Result<()> {
        let updates: Vec<PendingUpdate> = queue
            .entries
            .drain(..)
            .map(|(path, value)| PendingUpdate { path, value })
            .collect();
        let callbacks = std::mem::take(&mut queue.callbacks);
        let waiters = std::mem::take(&mut queue.waiters);
        drop(queue);

        if updates.is_empty() {
            return Ok(());
        }

        debug!("Flushing {} batched update(s)", updates.len());
        let result = (self.inner.handler)(updates);
        if let Err(e) = &result {
            error!("Aggregate write failed: {}", e);
        }

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                error!("Flush callback panicked");
            }
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
        result
    }

    /// Discard queued entries and callbacks without writing.
    pub fn clear(&self) {
        lock(&self.inner.queue).discard();
    }

    pub fn cancel(&self) {
        self.clear();
    }

    /// Run `callback` after the next flush, or right away when nothing is
    /// pending. Returns true if the callback was deferred.
    pub fn on_flush(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        let mut queue = lock(&self.inner.queue);
        if queue.entries.is_empty() {
            drop(queue);
            callback();
            return false;
        }
        queue.callbacks.push(Box::new(callback));
        true
    }

    /// Resolves once everything pending now has been written or discarded.
    pub async fn wait_flush(&self) {
        let rx = {
            let mut queue = lock(&self.inner.queue);
            if queue.entries.is_empty() {
                return;
            }
            // queued before a runtime existed: nothing else will drain it
            if queue.timer.is_none() {
                self.arm_timer(&mut queue);
            }
            let (tx, rx) = oneshot::channel();
            queue.waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Idempotent. Later `add`s are rejected.
    pub fn dispose(&self) {
        let mut queue = lock(&self.inner.queue);
        if queue.disposed {
            return;
        }
        queue.disposed = true;
        queue.discard();
        debug!("Batcher disposed");
    }
}
