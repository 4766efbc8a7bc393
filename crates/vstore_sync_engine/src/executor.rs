//! Execution contexts.
//!
//! Every piece of engine work (write queue drains, reconnect timers, inbound
//! message processing) is posted as a discrete task onto an [`Executor`].
//! Tasks posted to one executor run one at a time, in posting order, and
//! each runs to completion.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A unit of posted work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serialized execution context with timers.
pub trait Executor: Send + Sync {
    /// Queues a task.
    fn post(&self, task: Task);

    /// Queues a task once `delay` has elapsed.
    fn post_after(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle of a delayed task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Creates a live handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Executor backed by a tokio runtime.
///
/// Tasks are funneled through a channel into a single consumer task, which
/// gives strand semantics on a multi-threaded runtime.
pub struct TokioExecutor {
    handle: Handle,
    sender: mpsc::UnboundedSender<Task>,
}

impl TokioExecutor {
    /// Creates an executor on the given runtime.
    pub fn new(handle: Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
        });
        Self { handle, sender }
    }

    /// Creates an executor on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn post(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::warn!("executor stopped; task dropped");
        }
    }

    fn post_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let timer = TimerHandle::new();
        let cancelled = timer.clone();
        let sender = self.sender.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancelled.is_cancelled() {
                let _ = sender.send(task);
            }
        });
        timer
    }
}

struct PendingTimer {
    delay: Duration,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    tasks: VecDeque<Task>,
    timers: Vec<PendingTimer>,
    armed: Vec<Duration>,
}

/// Deterministic executor for tests.
///
/// Posted tasks run only when [`ManualExecutor::run_until_idle`] is called;
/// timers fire only when [`ManualExecutor::fire_next_timer`] is called. Every
/// armed delay is recorded.
#[derive(Default)]
pub struct ManualExecutor {
    state: Mutex<ManualState>,
}

impl ManualExecutor {
    /// Creates an idle executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs posted tasks, including tasks they post, until none is left.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        loop {
            let next = self.state.lock().tasks.pop_front();
            match next {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    /// Fires the earliest armed, uncancelled timer and runs until idle.
    ///
    /// Returns the delay of the fired timer.
    pub fn fire_next_timer(&self) -> Option<Duration> {
        let fired = {
            let mut state = self.state.lock();
            state.timers.retain(|timer| !timer.handle.is_cancelled());
            if state.timers.is_empty() {
                None
            } else {
                Some(state.timers.remove(0))
            }
        };
        let timer = fired?;
        (timer.task)();
        self.run_until_idle();
        Some(timer.delay)
    }

    /// Returns the number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Returns the delays of timers that are armed and not cancelled.
    pub fn pending_timers(&self) -> Vec<Duration> {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .map(|timer| timer.delay)
            .collect()
    }

    /// Returns every delay armed so far, in arming order.
    pub fn armed_delays(&self) -> Vec<Duration> {
        self.state.lock().armed.clone()
    }
}

impl Executor for ManualExecutor {
    fn post(&self, task: Task) {
        self.state.lock().tasks.push_back(task);
    }

    fn post_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        state.armed.push(delay);
        state.timers.push(PendingTimer {
            delay,
            handle: handle.clone(),
            task,
        });
        handle
    }
}
