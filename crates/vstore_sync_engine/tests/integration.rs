//! Integration tests for the sync engine against an in-memory authority.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vstore_core::{Data, IntWidth, Provenance, StoreEvent, Value, ValueId, ValueStore};
use vstore_sync_engine::{
    ClientConfig, ConnectionState, Endpoint, ManualExecutor, MockTransport, SyncClient,
};
use vstore_sync_protocol::{encode_frame, FrameEncoding, Message, ResultStatus, ValueUpdate};

fn id(s: &str) -> ValueId {
    ValueId::parse(s).unwrap()
}

/// One microservice wired to a mock transport and a manual executor.
struct Node {
    executor: Arc<ManualExecutor>,
    transport: Arc<MockTransport>,
    client: Arc<SyncClient>,
}

impl Node {
    fn new(app: &str) -> Self {
        let executor = Arc::new(ManualExecutor::new());
        let transport = Arc::new(MockTransport::new());
        let config = ClientConfig::new(app, Endpoint::Tcp("127.0.0.1:7400".parse().unwrap()));
        let client = SyncClient::new(
            config,
            Arc::new(ValueStore::new()),
            transport.clone(),
            executor.clone(),
        );
        Self {
            executor,
            transport,
            client,
        }
    }

    fn started(app: &str) -> Self {
        let node = Self::new(app);
        node.client.start();
        node.executor.run_until_idle();
        node
    }

    fn store(&self) -> &Arc<ValueStore> {
        self.client.store()
    }
}

/// A minimal authority: owns a store, answers requests, relays changes to
/// the other subscribed clients.
struct Authority {
    store: ValueStore,
    subscriptions: BTreeMap<usize, Vec<ValueId>>,
    received: Vec<(usize, Message)>,
}

impl Authority {
    fn new() -> Self {
        Self {
            store: ValueStore::new(),
            subscriptions: BTreeMap::new(),
            received: Vec::new(),
        }
    }

    fn covering(&self, target: &ValueId, except: usize) -> Vec<usize> {
        self.subscriptions
            .iter()
            .filter(|(client, roots)| **client != except && roots.iter().any(|r| target.starts_with(r)))
            .map(|(client, _)| *client)
            .collect()
    }

    fn subtree(&self, root: &ValueId) -> Vec<Value> {
        self.store
            .values()
            .into_iter()
            .filter(|v| v.id.starts_with(root))
            .collect()
    }

    fn handle(&mut self, from: usize, message: Message) -> Vec<(usize, Message)> {
        self.received.push((from, message.clone()));
        match message {
            Message::Subscribe { sequence_no, ids } => {
                let missing: Vec<Value> = ids
                    .iter()
                    .filter(|id| self.subtree(id).is_empty())
                    .cloned()
                    .map(Value::unset)
                    .collect();
                let mut values = Vec::new();
                for id in &ids {
                    values.extend(self.subtree(id));
                }
                self.subscriptions.entry(from).or_default().extend(ids);
                let (status, values) = if missing.is_empty() {
                    (ResultStatus::Success, values)
                } else {
                    (ResultStatus::NotFound, missing)
                };
                vec![(
                    from,
                    Message::Result {
                        sequence_no,
                        status,
                        values,
                    },
                )]
            }
            Message::Unsubscribe { sequence_no } => {
                self.subscriptions.remove(&from);
                vec![(
                    from,
                    Message::Result {
                        sequence_no,
                        status: ResultStatus::Success,
                        values: vec![],
                    },
                )]
            }
            Message::ValueChanged { values } => {
                let mut relay: BTreeMap<usize, Vec<ValueUpdate>> = BTreeMap::new();
                for update in values {
                    let applied = match &update {
                        ValueUpdate::Set { value } => self
                            .store
                            .set_value(value, Provenance::Remote)
                            .map(|s| s.is_changed())
                            .unwrap_or(false),
                        ValueUpdate::AddToContainer { container, key } => self
                            .store
                            .add_to_container(container, key, Provenance::Remote)
                            .unwrap_or(false),
                        ValueUpdate::RemoveFromContainer { container, key } => self
                            .store
                            .remove_from_container(container, key, Provenance::Remote)
                            .unwrap_or(false),
                    };
                    if applied {
                        for target in self.covering(update.id(), from) {
                            relay.entry(target).or_default().push(update.clone());
                        }
                    }
                }
                relay
                    .into_iter()
                    .map(|(target, values)| (target, Message::ValueChanged { values }))
                    .collect()
            }
            Message::ValueRemoved { ids, .. } => {
                let mut out = Vec::new();
                for id in ids {
                    if self.store.remove(&id, Provenance::Remote).unwrap_or(false) {
                        for target in self.covering(&id, from) {
                            out.push((target, Message::value_removed(vec![id.clone()])));
                        }
                    }
                }
                out
            }
            Message::MultiGet { sequence_no, ids } => {
                let values = ids.iter().filter_map(|id| self.store.get(id)).collect();
                vec![(
                    from,
                    Message::Result {
                        sequence_no,
                        status: ResultStatus::Success,
                        values,
                    },
                )]
            }
            Message::MultiSet {
                sequence_no,
                values,
            } => {
                for value in &values {
                    let _ = self.store.set_value(value, Provenance::Remote);
                }
                vec![(
                    from,
                    Message::Result {
                        sequence_no,
                        status: ResultStatus::Success,
                        values: vec![],
                    },
                )]
            }
            Message::Result { .. } | Message::SyncCompleted => vec![],
        }
    }
}

/// Runs every node and the authority until no message or task is left.
fn pump(authority: &mut Authority, nodes: &[&Node]) {
    loop {
        let mut progressed = false;
        for node in nodes {
            if node.executor.run_until_idle() > 0 {
                progressed = true;
            }
        }
        for (i, node) in nodes.iter().enumerate() {
            for message in node.transport.take_sent_messages().unwrap() {
                progressed = true;
                for (target, reply) in authority.handle(i, message) {
                    let frame = encode_frame(&reply, FrameEncoding::Marked).unwrap();
                    nodes[target].transport.inject(&frame);
                }
            }
        }
        if !progressed {
            break;
        }
    }
}

#[test]
fn subscribe_while_disconnected_completes_after_reconnect() {
    let mut authority = Authority::new();
    authority
        .store
        .set(&id("a.b"), Data::text("hello"), Provenance::Local)
        .unwrap();

    let node = Node::new("svc");
    node.transport.set_reachable(false);
    node.client.start();
    assert_eq!(node.client.state(), ConnectionState::Disconnected);

    let completed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&completed);
    let seq = node
        .client
        .subscribe_with_completion(vec![id("a.b")], move |ok| flag.store(ok, Ordering::SeqCst));
    assert_eq!(seq, 1);
    assert_eq!(node.store().get(&id("a.b")).unwrap().data, Data::Unset);

    node.transport.set_reachable(true);
    assert_eq!(node.executor.fire_next_timer(), Some(Duration::from_millis(250)));
    assert_eq!(node.client.state(), ConnectionState::Connected);

    pump(&mut authority, &[&node]);

    assert_eq!(
        authority.received[0],
        (
            0,
            Message::Subscribe {
                sequence_no: 1,
                ids: vec![id("a.b")],
            }
        )
    );
    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(node.store().get(&id("a.b")).unwrap().data, Data::text("hello"));
    assert_eq!(node.client.pending_subscriptions(), 0);
}

#[test]
fn shared_logger_root_hides_other_apps() {
    let mut authority = Authority::new();
    let a = Node::started("A");
    let b = Node::started("B");
    let logger = id("logger");

    for node in [&a, &b] {
        node.client.register_app_entry(&logger).unwrap();
        node.client.subscribe_with_completion(vec![logger.clone()], |_| {});
    }
    pump(&mut authority, &[&a, &b]);

    let b_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&b_events);
    let _sub = b.store().observe(move |e: &StoreEvent| sink.lock().push(e.id().clone()));

    a.store()
        .set(&id("logger.A.x"), Data::signed(IntWidth::I32, 1), Provenance::Local)
        .unwrap();
    b.store()
        .set(&id("logger.B.y"), Data::signed(IntWidth::I32, 2), Provenance::Local)
        .unwrap();
    pump(&mut authority, &[&a, &b]);

    // the authority sees both
    assert!(authority.store.has(&id("logger.A.x")));
    assert!(authority.store.has(&id("logger.B.y")));

    // each app only sees its own slice
    assert!(a.store().has(&id("logger.A.x")));
    assert!(!a.store().has(&id("logger.B.y")));
    assert!(b.store().has(&id("logger.B.y")));
    assert!(!b.store().has(&id("logger.A.x")));
    assert!(!b_events.lock().contains(&id("logger.A.x")));

    // a late subscriber receives only its own slice as well
    let c = Node::started("C");
    c.client.register_app_entry(&logger).unwrap();
    c.client.subscribe_with_completion(vec![logger.clone()], |_| {});
    pump(&mut authority, &[&a, &b, &c]);
    assert!(!c.store().has(&id("logger.A.x")));
    assert!(!c.store().has(&id("logger.B.y")));
}

#[test]
fn changes_flow_between_clients_without_echo() {
    let mut authority = Authority::new();
    authority
        .store
        .set(&id("plant"), Data::Struct, Provenance::Local)
        .unwrap();

    let a = Node::started("A");
    let b = Node::started("B");
    for node in [&a, &b] {
        node.client.subscribe_with_completion(vec![id("plant")], |_| {});
    }
    pump(&mut authority, &[&a, &b]);
    let before = authority.received.len();

    a.store()
        .set(&id("plant.temp"), Data::signed(IntWidth::I16, 21), Provenance::Local)
        .unwrap();
    pump(&mut authority, &[&a, &b]);

    assert_eq!(
        b.store().get(&id("plant.temp")).unwrap().data,
        Data::signed(IntWidth::I16, 21)
    );
    let after: Vec<&(usize, Message)> = authority.received[before..].iter().collect();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].0, 0);

    // removal reaches the other subscriber
    a.store().remove(&id("plant.temp"), Provenance::Local).unwrap();
    pump(&mut authority, &[&a, &b]);
    assert!(!b.store().has(&id("plant.temp")));
    assert!(!authority.store.has(&id("plant.temp")));
}

#[test]
fn reconnect_pushes_state_then_resubscribes() {
    let node = Node::started("svc");
    node.store()
        .set(&id("a"), Data::Bool(true), Provenance::Local)
        .unwrap();
    node.store()
        .set(&id("b.c"), Data::text("x"), Provenance::Local)
        .unwrap();
    node.store()
        .set(&id("b.empty"), Data::text(""), Provenance::Local)
        .unwrap();
    node.executor.run_until_idle();
    node.transport.take_sent_messages().unwrap();

    node.transport.drop_connection();
    node.executor.run_until_idle();
    assert_eq!(node.client.state(), ConnectionState::Disconnected);
    assert_eq!(node.client.queued_messages(), 2);

    node.executor.fire_next_timer();
    let sent = node.transport.take_sent_messages().unwrap();
    assert_eq!(sent.len(), 2);

    let Message::ValueChanged { values } = &sent[0] else {
        panic!("expected ValueChanged first, got {:?}", sent[0]);
    };
    let pushed: Vec<&ValueId> = values.iter().map(ValueUpdate::id).collect();
    assert_eq!(pushed, vec![&id("a"), &id("b.c")]);

    let Message::Subscribe { ids, .. } = &sent[1] else {
        panic!("expected Subscribe second, got {:?}", sent[1]);
    };
    assert_eq!(ids, &vec![id("a"), id("b.c")]);
}

#[test]
fn reconnect_replays_app_entries_first() {
    let node = Node::started("svc");
    node.client.register_app_entry(&id("logger")).unwrap();
    node.store()
        .set(&id("logger.svc.level"), Data::text("info"), Provenance::Local)
        .unwrap();
    node.executor.run_until_idle();
    node.transport.take_sent_messages().unwrap();

    node.transport.drop_connection();
    node.executor.run_until_idle();
    node.executor.fire_next_timer();

    let sent = node.transport.take_sent_messages().unwrap();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[0],
        Message::ValueChanged {
            values: vec![
                ValueUpdate::AddToContainer {
                    container: id("logger"),
                    key: "svc".into(),
                },
                ValueUpdate::set(node.store().get(&id("logger.svc")).unwrap()),
            ],
        }
    );
    assert!(matches!(sent[1], Message::ValueChanged { .. }));
    assert!(matches!(sent[2], Message::Subscribe { .. }));
}

#[test]
fn stale_queue_is_dropped_on_disconnect() {
    let node = Node::started("svc");
    node.transport.drop_connection();
    node.executor.run_until_idle();

    // queued after the resync, so it survives until the reconnect
    node.client.unsubscribe_all();
    assert_eq!(node.client.queued_messages(), 1);

    node.executor.fire_next_timer();
    assert_eq!(
        node.transport.take_sent_messages().unwrap(),
        vec![Message::Unsubscribe { sequence_no: 1 }]
    );

    // queued before the loss is noticed, so the resync drops it
    node.transport.drop_connection();
    node.client.unsubscribe_all();
    assert_eq!(node.client.queued_messages(), 1);
    node.executor.run_until_idle();
    assert_eq!(node.client.queued_messages(), 0);
    assert!(node.transport.take_sent_messages().unwrap().is_empty());
}

#[test]
fn backoff_through_client() {
    let node = Node::new("svc");
    node.transport.set_reachable(false);
    node.client.start();
    for _ in 0..5 {
        node.executor.fire_next_timer();
    }
    let armed: Vec<u128> = node
        .executor
        .armed_delays()
        .iter()
        .map(Duration::as_millis)
        .collect();
    assert_eq!(armed, vec![250, 500, 1000, 2000, 4000, 250]);

    node.transport.set_reachable(true);
    node.executor.fire_next_timer();
    assert_eq!(node.client.state(), ConnectionState::Connected);
    assert!(node.executor.pending_timers().is_empty());
}

#[test]
fn multi_get_and_multi_set() {
    let mut authority = Authority::new();
    authority
        .store
        .set(&id("cfg.port"), Data::unsigned(IntWidth::U16, 80), Provenance::Local)
        .unwrap();
    let node = Node::started("svc");

    let got = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&got);
    node.client
        .multi_get(vec![id("cfg.port")], move |ok| flag.store(ok, Ordering::SeqCst));
    pump(&mut authority, &[&node]);
    assert!(got.load(Ordering::SeqCst));
    assert_eq!(
        node.store().get(&id("cfg.port")).unwrap().data.as_integer(),
        Some(80)
    );

    let set = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&set);
    node.client.multi_set(
        vec![Value::new(id("cfg.host"), Data::text("example"))],
        move |ok| flag.store(ok, Ordering::SeqCst),
    );
    pump(&mut authority, &[&node]);
    assert!(set.load(Ordering::SeqCst));
    assert_eq!(
        authority.store.get(&id("cfg.host")).unwrap().data,
        Data::text("example")
    );
}

#[test]
fn not_found_result_removes_local_placeholder() {
    let mut authority = Authority::new();
    let node = Node::started("svc");

    let outcome = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&outcome);
    node.client
        .subscribe_with_completion(vec![id("ghost")], move |ok| *sink.lock() = Some(ok));
    assert!(node.store().has(&id("ghost")));
    pump(&mut authority, &[&node]);

    assert_eq!(*outcome.lock(), Some(false));
    assert!(!node.store().has(&id("ghost")));
}
