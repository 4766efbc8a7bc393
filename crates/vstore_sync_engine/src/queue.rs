//! Outbound write queue.
//!
//! Messages leave in strict enqueue order, one per posted drain task. A drain
//! is scheduled when the queue goes from empty to non-empty, or when the
//! connection comes up; a drain already in flight is never duplicated.

use crate::executor::Executor;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use vstore_sync_protocol::{encode_frame, FrameEncoding, Message};

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Message>,
    connected: bool,
    draining: bool,
}

/// FIFO of messages waiting to be written.
pub struct WriteQueue {
    state: Mutex<QueueState>,
    executor: Arc<dyn Executor>,
    transport: Arc<dyn Transport>,
    encoding: FrameEncoding,
    self_ref: Weak<WriteQueue>,
}

impl WriteQueue {
    /// Creates an empty, disconnected queue.
    pub fn new(
        executor: Arc<dyn Executor>,
        transport: Arc<dyn Transport>,
        encoding: FrameEncoding,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(QueueState::default()),
            executor,
            transport,
            encoding,
            self_ref: self_ref.clone(),
        })
    }

    /// Appends a message.
    pub fn push(&self, message: Message) {
        let was_empty = {
            let mut state = self.state.lock();
            let was_empty = state.messages.is_empty();
            state.messages.push_back(message);
            was_empty
        };
        if was_empty {
            self.schedule_drain();
        }
    }

    /// Records the connection state; coming up schedules a drain.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
        if connected {
            self.schedule_drain();
        }
    }

    /// Drops every pending message; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.messages.len();
        state.messages.clear();
        dropped
    }

    /// Returns the number of pending messages.
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Returns true if no message is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule_drain(&self) {
        {
            let mut state = self.state.lock();
            if state.draining || !state.connected || state.messages.is_empty() {
                return;
            }
            state.draining = true;
        }
        let queue = self.self_ref.clone();
        self.executor.post(Box::new(move || {
            if let Some(queue) = queue.upgrade() {
                queue.drain_one();
            }
        }));
    }

    fn drain_one(&self) {
        let message = {
            let mut state = self.state.lock();
            let next = if state.connected {
                state.messages.pop_front()
            } else {
                None
            };
            if next.is_none() {
                state.draining = false;
            }
            next
        };
        let Some(message) = message else {
            return;
        };

        match encode_frame(&message, self.encoding) {
            Ok(frame) => {
                debug!(type_code = message.type_code(), "writing message");
                if let Err(e) = self.transport.send(frame) {
                    warn!(error = %e, "write failed; message dropped");
                }
            }
            Err(e) => warn!(error = %e, "message could not be encoded"),
        }

        let queue = self.self_ref.clone();
        self.executor.post(Box::new(move || {
            if let Some(queue) = queue.upgrade() {
                queue.drain_one();
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ManualExecutor;
    use crate::transport::MockTransport;

    fn setup() -> (Arc<ManualExecutor>, Arc<MockTransport>, Arc<WriteQueue>) {
        let executor = Arc::new(ManualExecutor::new());
        let transport = Arc::new(MockTransport::new());
        let queue = WriteQueue::new(executor.clone(), transport.clone(), FrameEncoding::Marked);
        (executor, transport, queue)
    }

    fn unsubscribe(sequence_no: u32) -> Message {
        Message::Unsubscribe { sequence_no }
    }

    #[test]
    fn nothing_is_written_while_disconnected() {
        let (executor, transport, queue) = setup();
        queue.push(unsubscribe(1));
        executor.run_until_idle();
        assert_eq!(queue.len(), 1);
        assert!(transport.sent_frames().is_empty());
    }

    #[test]
    fn drains_in_fifo_order_once_connected() {
        let (executor, transport, queue) = setup();
        transport.connect().unwrap();
        for seq in 1..=3 {
            queue.push(unsubscribe(seq));
        }
        queue.set_connected(true);
        executor.run_until_idle();

        assert!(queue.is_empty());
        assert_eq!(
            transport.take_sent_messages().unwrap(),
            vec![unsubscribe(1), unsubscribe(2), unsubscribe(3)]
        );
    }

    #[test]
    fn concurrent_pushes_schedule_one_drain() {
        let (executor, transport, queue) = setup();
        transport.connect().unwrap();
        queue.set_connected(true);
        executor.run_until_idle();

        queue.push(unsubscribe(1));
        queue.push(unsubscribe(2));
        queue.set_connected(true);
        assert_eq!(executor.pending_tasks(), 1);

        executor.run_until_idle();
        assert_eq!(transport.take_sent_messages().unwrap().len(), 2);
    }

    #[test]
    fn drain_stops_on_disconnect() {
        let (executor, transport, queue) = setup();
        transport.connect().unwrap();
        queue.set_connected(true);
        queue.push(unsubscribe(1));
        queue.push(unsubscribe(2));
        queue.set_connected(false);
        executor.run_until_idle();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.clear(), 2);
        assert!(transport.sent_frames().is_empty());
    }
}
