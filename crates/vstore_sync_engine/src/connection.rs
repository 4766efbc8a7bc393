//! Reconnect backoff.
//!
//! A disconnect arms a retry timer; a fired timer attempts to connect and
//! immediately arms the next timer, so failed attempts chain on their own
//! until a connect succeeds. Delays follow [`RetryConfig::delay_after`].
//!
//! An optional attempt hook observes each timer-driven attempt so the owner
//! can track its connection state.

use crate::config::RetryConfig;
use crate::executor::{Executor, TimerHandle};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phase of a timer-driven connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// The transport is about to be asked to connect.
    Started,
    /// The transport refused the attempt synchronously.
    Failed,
}

type AttemptHook = Arc<dyn Fn(AttemptPhase) + Send + Sync>;

struct RetryState {
    config: RetryConfig,
    timeout: Duration,
    attempts: u32,
    timer: Option<TimerHandle>,
}

/// Drives reconnect attempts for one transport.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn Executor>,
    state: Mutex<RetryState>,
    attempt_hook: Mutex<Option<AttemptHook>>,
    self_ref: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Creates an idle manager.
    pub fn new(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn Executor>,
        config: RetryConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            transport,
            executor,
            state: Mutex::new(RetryState {
                config,
                timeout: Duration::ZERO,
                attempts: 0,
                timer: None,
            }),
            attempt_hook: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Installs the hook run around each timer-driven connect attempt.
    pub fn set_attempt_hook(&self, hook: impl Fn(AttemptPhase) + Send + Sync + 'static) {
        *self.attempt_hook.lock() = Some(Arc::new(hook));
    }

    /// The transport connected: cancels any pending retry and resets the
    /// backoff.
    pub fn on_connected(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.timeout = Duration::ZERO;
        state.attempts = 0;
    }

    /// The transport disconnected or failed to connect: arms a retry unless
    /// one is armed or the budget is exhausted.
    pub fn on_disconnected(&self) {
        self.arm();
    }

    /// Returns true while a retry timer is armed.
    pub fn is_armed(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    /// Returns the delay of the most recently armed timer (zero after a
    /// connect).
    pub fn current_timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Stops retrying: the budget drops to zero and any armed timer is
    /// cancelled. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.config.retry_max = Some(0);
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
    }

    fn arm(&self) {
        let mut state = self.state.lock();
        if state.timer.is_some() {
            return;
        }
        if state.config.is_exhausted(state.attempts) {
            debug!(attempts = state.attempts, "retry budget exhausted");
            return;
        }
        let delay = state.config.delay_after(state.timeout);
        state.timeout = delay;
        state.attempts += 1;

        let manager = self.self_ref.clone();
        let timer = self.executor.post_after(
            delay,
            Box::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.fire();
                }
            }),
        );
        state.timer = Some(timer);
        info!(?delay, "reconnect timer armed");
    }

    fn fire(&self) {
        self.state.lock().timer = None;
        debug!("reconnecting");
        self.notify(AttemptPhase::Started);
        if let Err(e) = self.transport.connect() {
            warn!(error = %e, "reconnect attempt failed");
            self.notify(AttemptPhase::Failed);
        }
        self.arm();
    }

    fn notify(&self, phase: AttemptPhase) {
        let hook = self.attempt_hook.lock().clone();
        if let Some(hook) = hook {
            hook(phase);
        }
    }
}
