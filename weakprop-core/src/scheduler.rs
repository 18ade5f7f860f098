//! Schedulers
//!
//! A [`Scheduler`] decides where and when a deferred action runs. Properties
//! publish values synchronously but raise their change events through a
//! scheduler, so the events can be marshaled onto a particular context
//! (a UI loop, a runtime worker) distinct from the writer's.
//!
//! The only contract a property relies on is that `schedule(action)`
//! eventually runs `action`.
//!
//! # Stock Schedulers
//!
//! - [`ImmediateScheduler`] runs the action inline. This is the process
//!   default until [`set_default_scheduler`] is called.
//! - [`QueueScheduler`] queues actions until the owning loop calls
//!   [`QueueScheduler::drain`].
//! - [`TokioScheduler`] spawns each action onto a Tokio runtime.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;

use crate::error::{PropertyError, Result};

/// A deferred unit of work.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Defers actions onto some execution context.
pub trait Scheduler: Send + Sync {
    /// Arrange for `action` to run. Fire-and-forget.
    fn schedule(&self, action: Action);
}

/// Runs every action immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, action: Action) {
        action();
    }
}

/// Holds actions until they are drained by the owning loop.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<Action>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued actions in FIFO order until the queue is empty, including
    /// actions scheduled by the actions being run. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it.
            let next = self.queue.lock().pop_front();
            match next {
                Some(action) => {
                    action();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, action: Action) {
        self.queue.lock().push_back(action);
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Spawns each action as a task on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime the caller is currently running on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| PropertyError::RuntimeUnavailable)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, action: Action) {
        self.runtime.spawn(async move { action() });
    }
}

// Process-wide default used by properties that are not given a scheduler.
static DEFAULT_SCHEDULER: OnceLock<RwLock<Arc<dyn Scheduler>>> = OnceLock::new();

fn default_slot() -> &'static RwLock<Arc<dyn Scheduler>> {
    DEFAULT_SCHEDULER.get_or_init(|| RwLock::new(Arc::new(ImmediateScheduler)))
}

/// The scheduler new properties use when none is configured.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::clone(&default_slot().read())
}

/// Replace the process-wide default scheduler.
///
/// Only properties created afterwards pick up the new default.
pub fn set_default_scheduler(scheduler: Arc<dyn Scheduler>) {
    *default_slot().write() = scheduler;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn immediate_runs_inline() {
        let ran = Arc::new(AtomicI32::new(0));
        let ran_clone = ran.clone();
        ImmediateScheduler.schedule(Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_defers_until_drained() {
        let queue = Arc::new(QueueScheduler::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            queue.schedule(Box::new(move || order.lock().push(i)));
        }
        assert_eq!(queue.pending(), 3);
        assert!(order.lock().is_empty());

        assert_eq!(queue.drain(), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn queue_drains_actions_scheduled_while_draining() {
        let queue = Arc::new(QueueScheduler::new());
        let ran = Arc::new(AtomicI32::new(0));

        let queue_clone = queue.clone();
        let ran_clone = ran.clone();
        queue.schedule(Box::new(move || {
            let ran = ran_clone.clone();
            queue_clone.schedule(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(queue.drain(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tokio_scheduler_requires_runtime() {
        assert_eq!(
            TokioScheduler::current().unwrap_err(),
            PropertyError::RuntimeUnavailable
        );
    }

    #[tokio::test]
    async fn tokio_scheduler_spawns_actions() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
