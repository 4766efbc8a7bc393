//! Integration tests for the value store.

use parking_lot::Mutex;
use std::sync::Arc;
use vstore_core::{
    Access, ContainerOrder, ContainerSchema, Data, IntWidth, Interval, Kind, Provenance,
    SetError, SetStatus, StoreEvent, TemplateEntry, ValueId, ValueStore,
};

fn id(s: &str) -> ValueId {
    ValueId::parse(s).unwrap()
}

fn record(store: &ValueStore) -> (Arc<Mutex<Vec<StoreEvent>>>, vstore_core::Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let sub = store.observe(move |e| sink.lock().push(e.clone()));
    (events, sub)
}

#[test]
fn bounded_integer_lifecycle() {
    let store = ValueStore::new();
    let port = id("net.http.port");
    store
        .declare(
            &port,
            Data::Unsigned(Interval::bounded(IntWidth::U16, 80, 1, 1024)),
            Access::ReadWrite,
        )
        .unwrap();

    let ok = store
        .set(&port, Data::unsigned(IntWidth::U16, 443), Provenance::Local)
        .unwrap();
    assert_eq!(ok, SetStatus::Success);

    let err = store
        .set(&port, Data::unsigned(IntWidth::U16, 8080), Provenance::Local)
        .unwrap_err();
    assert!(matches!(err.set_error(), Some(SetError::RangeError { .. })));
    assert_eq!(store.get(&port).unwrap().data.as_integer(), Some(443));
}

#[test]
fn signedness_and_width_are_enforced() {
    let store = ValueStore::new();
    let level = id("net.http.level");
    store
        .declare(
            &level,
            Data::Unsigned(Interval::bounded(IntWidth::U8, 5, 1, 10)),
            Access::ReadWrite,
        )
        .unwrap();
    let (events, _sub) = record(&store);

    let err = store
        .set(&level, Data::Signed(Interval::new(IntWidth::U8, -5)), Provenance::Remote)
        .unwrap_err();
    assert!(matches!(err.set_error(), Some(SetError::InvalidType { .. })));
    assert_eq!(
        store.get(&level).unwrap().data,
        Data::Unsigned(Interval::bounded(IntWidth::U8, 5, 1, 10))
    );

    // A value that does not fit its own width is never created.
    let fresh = id("net.http.retries");
    let err = store
        .set(&fresh, Data::unsigned(IntWidth::U8, 1000), Provenance::Remote)
        .unwrap_err();
    assert!(matches!(err.set_error(), Some(SetError::RangeError { .. })));
    assert!(!store.has(&fresh));
    assert!(events.lock().is_empty());
}

#[test]
fn enum_value_accepts_only_declared_enumerators() {
    let store = ValueStore::new();
    let mode = id("system.mode");
    store
        .declare(
            &mode,
            Data::enumeration(0, [("Idle", 0), ("Run", 1)]),
            Access::ReadWrite,
        )
        .unwrap();

    assert_eq!(
        store
            .set(&mode, Data::enumeration(1, [("Idle", 0), ("Run", 1)]), Provenance::Remote)
            .unwrap(),
        SetStatus::Success
    );
    let err = store
        .set(&mode, Data::enumeration(7, Vec::<(&str, i64)>::new()), Provenance::Remote)
        .unwrap_err();
    assert_eq!(err.set_error(), Some(&SetError::EnumError { value: 7 }));
}

#[test]
fn same_value_emits_nothing() {
    let store = ValueStore::new();
    store
        .set(&id("tags"), Data::Set(vec!["b".into(), "a".into()]), Provenance::Local)
        .unwrap();
    let (events, _sub) = record(&store);

    let status = store
        .set(
            &id("tags"),
            Data::Set(vec!["a".into(), "b".into(), "a".into()]),
            Provenance::Local,
        )
        .unwrap();
    assert_eq!(status, SetStatus::SameValue);
    assert!(events.lock().is_empty());
}

#[test]
fn provenance_flows_to_events() {
    let store = ValueStore::new();
    let (events, _sub) = record(&store);

    store.set(&id("a"), Data::Bool(true), Provenance::Remote).unwrap();
    store.set(&id("a"), Data::Bool(false), Provenance::Local).unwrap();
    store.remove(&id("a"), Provenance::Remote).unwrap();

    let provenance: Vec<Provenance> = events.lock().iter().map(|e| e.provenance()).collect();
    assert_eq!(
        provenance,
        vec![Provenance::Remote, Provenance::Local, Provenance::Remote]
    );
}

#[test]
fn container_instances_follow_template() {
    let store = ValueStore::new();
    let schema = ContainerSchema::new(id("logger"), ContainerOrder::Ordered)
        .with_entry(TemplateEntry::new(
            id("logger.+.level"),
            Data::enumeration(0, [("Info", 0), ("Debug", 1)]),
        ))
        .unwrap()
        .with_entry(TemplateEntry::new(id("logger.+.file"), Data::text("")))
        .unwrap();
    store.declare_container(schema).unwrap();

    for key in ["svc", "api"] {
        store.add_to_container(&id("logger"), key, Provenance::Local).unwrap();
    }
    assert_eq!(store.keys(&id("logger")).unwrap(), vec!["svc", "api"]);
    assert_eq!(store.kind(&id("logger.api.level")), Some(Kind::Enum));
    assert_eq!(store.children(&id("logger.svc")).len(), 2);

    // removing an instance subtree directly also drops the key
    store.remove(&id("logger.svc"), Provenance::Local).unwrap();
    assert_eq!(store.keys(&id("logger")).unwrap(), vec!["api"]);
}

#[test]
fn observer_per_id() {
    let store = ValueStore::new();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    let sub = store.observe_id(id("a.b"), move |_| *counter.lock() += 1);

    store.set(&id("a.b"), Data::Bool(true), Provenance::Local).unwrap();
    store.set(&id("a.c"), Data::Bool(true), Provenance::Local).unwrap();
    assert_eq!(*hits.lock(), 1);

    drop(sub);
    store.set(&id("a.b"), Data::Bool(false), Provenance::Local).unwrap();
    assert_eq!(*hits.lock(), 1);
}
