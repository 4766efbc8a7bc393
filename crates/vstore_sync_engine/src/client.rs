//! Synchronization client.
//!
//! The client owns the write queue, the subscription-completion map and the
//! connection manager for one microservice. It reacts to transport events by
//! posting tasks onto its executor:
//!
//! - connected: flush the write queue
//! - connection lost: drop the stale queue, replay this application's
//!   entries under shared roots, push the current local state in one
//!   `ValueChanged`, then resubscribe to the same ids in one `Subscribe`
//! - bytes received: decode frames and hand messages to the handler
//!
//! ## Key Invariants
//!
//! - Messages are written in enqueue order
//! - After a reconnect the state push precedes the resubscribe
//! - A completion runs at most once, and never after it was cancelled

use crate::config::ClientConfig;
use crate::connection::{AttemptPhase, ConnectionManager};
use crate::error::SyncResult;
use crate::executor::Executor;
use crate::handler::{MessageHandler, ResultEvent};
use crate::queue::WriteQueue;
use crate::transport::{Transport, TransportEvents};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use vstore_core::{
    Access, ContainerOrder, ContainerSchema, Data, Provenance, Subscription, Value, ValueId,
    ValueStore,
};
use vstore_sync_protocol::{FrameDecoder, Message, ProtocolError, ValueUpdate};

/// Callback run with `true` on a successful result, `false` otherwise.
pub type Completion = Box<dyn FnOnce(bool) + Send + 'static>;

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Connected to the authority.
    Connected,
}

struct ClientState {
    connection: ConnectionState,
    next_sequence_no: u32,
    pending: BTreeMap<u32, Completion>,
    result_listener: Option<Subscription>,
    app_entries: Vec<ValueId>,
    started: bool,
}

/// Microservice-side synchronization client.
pub struct SyncClient {
    config: ClientConfig,
    store: Arc<ValueStore>,
    executor: Arc<dyn Executor>,
    transport: Arc<dyn Transport>,
    handler: Arc<MessageHandler>,
    queue: Arc<WriteQueue>,
    connection: Arc<ConnectionManager>,
    decoder: Mutex<FrameDecoder>,
    state: Mutex<ClientState>,
    store_listener: Mutex<Option<Subscription>>,
    self_ref: Weak<SyncClient>,
}

impl SyncClient {
    /// Creates a client over `store`.
    ///
    /// The configured shared roots are installed as ancestor filters. The
    /// client does not connect until [`SyncClient::start`].
    pub fn new(
        config: ClientConfig,
        store: Arc<ValueStore>,
        transport: Arc<dyn Transport>,
        executor: Arc<dyn Executor>,
    ) -> Arc<Self> {
        let handler = Arc::new(MessageHandler::new(
            Arc::clone(&store),
            config.app_name.clone(),
        ));
        for root in &config.shared_roots {
            handler.insert_app_name_filter(root);
        }
        let queue = WriteQueue::new(
            Arc::clone(&executor),
            Arc::clone(&transport),
            config.frame_encoding,
        );
        let connection = ConnectionManager::new(
            Arc::clone(&transport),
            Arc::clone(&executor),
            config.retry.clone(),
        );
        let decoder = FrameDecoder::with_max_frame_size(config.max_frame_size);

        let client = Arc::new_cyclic(|self_ref| Self {
            config,
            store,
            executor,
            transport,
            handler,
            queue,
            connection,
            decoder: Mutex::new(decoder),
            state: Mutex::new(ClientState {
                connection: ConnectionState::Disconnected,
                next_sequence_no: 1,
                pending: BTreeMap::new(),
                result_listener: None,
                app_entries: Vec::new(),
                started: false,
            }),
            store_listener: Mutex::new(None),
            self_ref: self_ref.clone(),
        });

        let handler = Arc::downgrade(&client.handler);
        let queue = Arc::downgrade(&client.queue);
        let listener = client.store.observe(move |event| {
            let (Some(handler), Some(queue)) = (handler.upgrade(), queue.upgrade()) else {
                return;
            };
            if let Some(message) = handler.outbound(event) {
                queue.push(message);
            }
        });
        *client.store_listener.lock() = Some(listener);

        let weak = client.self_ref.clone();
        client.connection.set_attempt_hook(move |phase| {
            if let Some(client) = weak.upgrade() {
                client.handle_attempt(phase);
            }
        });

        let sink: Weak<dyn TransportEvents> = client.self_ref.clone();
        client.transport.set_event_sink(sink);
        client
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<ValueStore> {
        &self.store
    }

    /// Returns the message handler (ancestor filter management).
    pub fn handler(&self) -> &Arc<MessageHandler> {
        &self.handler
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    /// Returns the number of requests awaiting a result.
    pub fn pending_subscriptions(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns the number of messages waiting to be written.
    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    /// Starts the first connect attempt; a failure arms the reconnect timer.
    pub fn start(&self) {
        {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
            state.connection = ConnectionState::Connecting;
        }
        info!(app = %self.config.app_name, endpoint = %self.config.endpoint, "starting sync client");
        if let Err(e) = self.transport.connect() {
            warn!(error = %e, "connect failed");
            self.state.lock().connection = ConnectionState::Disconnected;
            self.connection.on_disconnected();
        }
    }

    /// Stops reconnecting and closes the transport.
    pub fn shutdown(&self) {
        self.connection.stop();
        self.queue.set_connected(false);
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "close failed");
        }
        let mut state = self.state.lock();
        state.connection = ConnectionState::Disconnected;
        state.started = false;
        info!(app = %self.config.app_name, "sync client stopped");
    }

    /// Subscribes to the subtrees rooted at `ids`.
    ///
    /// Ids missing locally are created unset so that the authority's answer
    /// has a place to land. Returns the sequence number, which doubles as
    /// the cancellation token.
    pub fn subscribe_with_completion<F>(&self, ids: Vec<ValueId>, completion: F) -> u32
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.materialize(&ids);
        let sequence_no = self.register(Box::new(completion));
        debug!(sequence_no, count = ids.len(), "subscribe");
        self.queue.push(Message::Subscribe { sequence_no, ids });
        sequence_no
    }

    /// Subscribes to the whole tree, lifting the shared-root filters first.
    pub fn subscribe_all<F>(&self, completion: F) -> u32
    where
        F: FnOnce(bool) + Send + 'static,
    {
        for root in &self.config.shared_roots {
            self.handler.remove_app_name_filter(root);
        }
        self.subscribe_with_completion(vec![ValueId::root()], completion)
    }

    /// Forgets the completion for `token` without telling the authority.
    ///
    /// Returns false if nothing was pending under that token.
    pub fn cancel_subscribe_completion(&self, token: u32) -> bool {
        let mut state = self.state.lock();
        let removed = state.pending.remove(&token).is_some();
        if state.pending.is_empty() {
            state.result_listener = None;
        }
        removed
    }

    /// Drops every subscription of this client on the authority.
    ///
    /// The local store is left as is.
    pub fn unsubscribe_all(&self) -> u32 {
        let sequence_no = self.next_sequence_no();
        self.queue.push(Message::Unsubscribe { sequence_no });
        sequence_no
    }

    /// Reads `ids` once without subscribing.
    pub fn multi_get<F>(&self, ids: Vec<ValueId>, completion: F) -> u32
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.materialize(&ids);
        let sequence_no = self.register(Box::new(completion));
        self.queue.push(Message::MultiGet { sequence_no, ids });
        sequence_no
    }

    /// Writes several values in one request.
    pub fn multi_set<F>(&self, values: Vec<Value>, completion: F) -> u32
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let sequence_no = self.register(Box::new(completion));
        self.queue.push(Message::MultiSet {
            sequence_no,
            values,
        });
        sequence_no
    }

    /// Adds this application's key under the shared container `root` and
    /// remembers it for replay after a reconnect.
    pub fn register_app_entry(&self, root: &ValueId) -> SyncResult<()> {
        if !self.store.has(root) {
            self.store
                .declare_container(ContainerSchema::new(root.clone(), ContainerOrder::Ordered))?;
        }
        self.store
            .add_to_container(root, &self.config.app_name, Provenance::Local)?;
        let mut state = self.state.lock();
        if !state.app_entries.contains(root) {
            state.app_entries.push(root.clone());
        }
        Ok(())
    }

    fn materialize(&self, ids: &[ValueId]) {
        for id in ids.iter().filter(|id| !id.is_root()) {
            if self.store.has(id) {
                continue;
            }
            if let Err(e) = self.store.declare(id, Data::Unset, Access::ReadWrite) {
                warn!(id = %id, error = %e, "could not create subscribed value");
            }
        }
    }

    fn next_sequence_no(&self) -> u32 {
        let mut state = self.state.lock();
        let sequence_no = state.next_sequence_no;
        state.next_sequence_no = state.next_sequence_no.wrapping_add(1).max(1);
        sequence_no
    }

    fn register(&self, completion: Completion) -> u32 {
        let sequence_no = self.next_sequence_no();
        let mut state = self.state.lock();
        state.pending.insert(sequence_no, completion);
        if state.result_listener.is_none() {
            let client = self.self_ref.clone();
            state.result_listener = Some(self.handler.observe_results(move |event| {
                if let Some(client) = client.upgrade() {
                    client.on_result(event);
                }
            }));
        }
        sequence_no
    }

    fn on_result(&self, event: &ResultEvent) {
        let completion = {
            let mut state = self.state.lock();
            let completion = state.pending.remove(&event.sequence_no);
            if state.pending.is_empty() {
                state.result_listener = None;
            }
            completion
        };
        match completion {
            Some(completion) => completion(event.success),
            None => debug!(sequence_no = event.sequence_no, "no pending completion"),
        }
    }

    fn post(&self, task: impl FnOnce(&SyncClient) + Send + 'static) {
        let client = self.self_ref.clone();
        self.executor.post(Box::new(move || {
            if let Some(client) = client.upgrade() {
                task(&client);
            }
        }));
    }

    fn handle_attempt(&self, phase: AttemptPhase) {
        let mut state = self.state.lock();
        match (phase, state.connection) {
            (AttemptPhase::Started, ConnectionState::Disconnected) => {
                state.connection = ConnectionState::Connecting;
            }
            (AttemptPhase::Failed, ConnectionState::Connecting) => {
                state.connection = ConnectionState::Disconnected;
            }
            _ => {}
        }
    }

    fn handle_connected(&self) {
        self.state.lock().connection = ConnectionState::Connected;
        info!(app = %self.config.app_name, "connected");
        self.connection.on_connected();
        self.queue.set_connected(true);
    }

    fn handle_disconnected(&self) {
        let was_connected = {
            let mut state = self.state.lock();
            let was_connected = state.connection == ConnectionState::Connected;
            state.connection = ConnectionState::Disconnected;
            was_connected
        };
        self.queue.set_connected(false);
        if !self.config.auto_reconnect {
            info!(app = %self.config.app_name, "disconnected");
            return;
        }
        if was_connected {
            info!(app = %self.config.app_name, "connection lost; resyncing");
            self.resync();
        }
        self.connection.on_disconnected();
    }

    fn resync(&self) {
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "stale messages dropped");
        }

        let entries = self.state.lock().app_entries.clone();
        let mut replay = Vec::new();
        for root in entries {
            let Ok(entry) = root.join(&self.config.app_name) else {
                continue;
            };
            replay.push(ValueUpdate::AddToContainer {
                container: root,
                key: self.config.app_name.clone(),
            });
            if let Some(value) = self.store.get(&entry) {
                replay.push(ValueUpdate::set(value));
            }
        }
        if !replay.is_empty() {
            self.queue.push(Message::ValueChanged { values: replay });
        }

        let mut values = Vec::new();
        let mut ids = Vec::new();
        for value in self.store.values() {
            if value.has_data() {
                ids.push(value.id.clone());
                values.push(ValueUpdate::set(value));
            }
        }
        if ids.is_empty() {
            return;
        }
        debug!(count = ids.len(), "pushing local state");
        self.queue.push(Message::ValueChanged { values });
        let sequence_no = self.next_sequence_no();
        self.queue.push(Message::Subscribe { sequence_no, ids });
    }

    fn handle_received(&self, bytes: &[u8]) {
        let messages = {
            let mut decoder = self.decoder.lock();
            decoder.extend(bytes);
            let mut messages = Vec::new();
            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => messages.push(message),
                    Ok(None) => break,
                    Err(e @ ProtocolError::FrameTooLarge { .. }) => {
                        warn!(error = %e, "inbound stream discarded");
                        break;
                    }
                    Err(e) => warn!(error = %e, "undecodable frame skipped"),
                }
            }
            messages
        };
        for message in &messages {
            self.handler.handle(message);
        }
    }
}

impl TransportEvents for SyncClient {
    fn on_connected(&self) {
        self.post(|client| client.handle_connected());
    }

    fn on_disconnected(&self) {
        self.post(|client| client.handle_disconnected());
    }

    fn on_received(&self, bytes: &[u8]) {
        let bytes = bytes.to_vec();
        self.post(move |client| client.handle_received(&bytes));
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.connection.stop();
    }
}
