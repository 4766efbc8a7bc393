//! Transport layer abstraction.
//!
//! A transport is a byte-oriented duplex connection to the authority.
//! Connection state changes and received bytes are reported through a
//! [`TransportEvents`] sink; delimiting the stream into frames is left to the
//! receiver.

use crate::error::{SyncError, SyncResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use vstore_sync_protocol::{FrameDecoder, Message};

/// Receiver of transport notifications.
pub trait TransportEvents: Send + Sync {
    /// The connection is established.
    fn on_connected(&self);

    /// The connection was lost, or a connect attempt failed.
    fn on_disconnected(&self);

    /// Bytes arrived.
    fn on_received(&self, bytes: &[u8]);
}

/// A duplex connection to the authority.
pub trait Transport: Send + Sync {
    /// Installs the notification sink.
    fn set_event_sink(&self, sink: Weak<dyn TransportEvents>);

    /// Starts a connection attempt.
    ///
    /// Success is reported through [`TransportEvents::on_connected`]. An
    /// error means the attempt could not even be started.
    fn connect(&self) -> SyncResult<()>;

    /// Closes the connection without notifying the sink.
    fn close(&self) -> SyncResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Writes one frame.
    fn send(&self, frame: Bytes) -> SyncResult<()>;
}

/// Holder for the notification sink shared by transport implementations.
#[derive(Default)]
pub(crate) struct EventSink {
    sink: Mutex<Option<Weak<dyn TransportEvents>>>,
}

impl EventSink {
    pub(crate) fn set(&self, sink: Weak<dyn TransportEvents>) {
        *self.sink.lock() = Some(sink);
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn TransportEvents>> {
        self.sink.lock().as_ref().and_then(Weak::upgrade)
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    reachable: bool,
    connect_attempts: u32,
    sent: Vec<Bytes>,
}

/// A mock transport for testing.
///
/// Connect attempts succeed synchronously while the mock is reachable and
/// fail otherwise. Sent frames are recorded; inbound bytes are injected with
/// [`MockTransport::inject`].
pub struct MockTransport {
    state: Mutex<MockState>,
    sink: EventSink,
}

impl MockTransport {
    /// Creates a reachable, disconnected mock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                reachable: true,
                ..MockState::default()
            }),
            sink: EventSink::default(),
        }
    }

    /// Sets whether connect attempts succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Simulates the authority dropping the connection.
    pub fn drop_connection(&self) {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            if let Some(sink) = self.sink.get() {
                sink.on_disconnected();
            }
        }
    }

    /// Delivers bytes as if received from the authority.
    pub fn inject(&self, bytes: &[u8]) {
        if let Some(sink) = self.sink.get() {
            sink.on_received(bytes);
        }
    }

    /// Returns the number of connect attempts so far.
    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Returns the frames sent so far.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.state.lock().sent.clone()
    }

    /// Removes and decodes the frames sent so far.
    pub fn take_sent_messages(&self) -> SyncResult<Vec<Message>> {
        let frames = std::mem::take(&mut self.state.lock().sent);
        let mut decoder = FrameDecoder::new();
        let mut messages = Vec::new();
        for frame in frames {
            decoder.extend(&frame);
            while let Some(message) = decoder.next_message()? {
                messages.push(message);
            }
        }
        Ok(messages)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn set_event_sink(&self, sink: Weak<dyn TransportEvents>) {
        self.sink.set(sink);
    }

    fn connect(&self) -> SyncResult<()> {
        {
            let mut state = self.state.lock();
            state.connect_attempts += 1;
            if !state.reachable {
                return Err(SyncError::transport_retryable("authority unreachable"));
            }
            state.connected = true;
        }
        if let Some(sink) = self.sink.get() {
            sink.on_connected();
        }
        Ok(())
    }

    fn close(&self) -> SyncResult<()> {
        self.state.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn send(&self, frame: Bytes) -> SyncResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SyncError::NotConnected);
        }
        state.sent.push(frame);
        Ok(())
    }
}
