//! The value store.
//!
//! Values live in an arena keyed by [`HashToken`]. There are no parent
//! back-references: the parent of a value is found by truncating its
//! [`ValueId`], and subtrees are found through an ordered path index.
//!
//! Every mutation carries a [`Provenance`] and produces [`StoreEvent`]s.
//! Events are dispatched after the store lock is released, so observers may
//! read or mutate the store from inside a callback.

use crate::container::ContainerSchema;
use crate::data::{Access, ContainerOrder, Data, Kind, Provenance};
use crate::error::{SetError, StoreError, StoreResult};
use crate::id::{HashToken, ValueId};
use crate::observer::{ObserverList, Subscription};
use crate::typed::SetStatus;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// A change observed on the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A value was created.
    Added {
        /// Snapshot of the new value.
        value: Value,
        /// Origin of the mutation.
        provenance: Provenance,
    },
    /// A value's payload was replaced.
    Changed {
        /// Snapshot after the change.
        value: Value,
        /// Origin of the mutation.
        provenance: Provenance,
    },
    /// A value was deleted.
    Removed {
        /// ID of the deleted value.
        id: ValueId,
        /// Its hash token.
        token: HashToken,
        /// Origin of the mutation.
        provenance: Provenance,
    },
    /// A key was added to a container.
    ContainerAdded {
        /// Container ID.
        container: ValueId,
        /// New key.
        key: String,
        /// Origin of the mutation.
        provenance: Provenance,
    },
    /// A key was erased from a container.
    ContainerRemoved {
        /// Container ID.
        container: ValueId,
        /// Erased key.
        key: String,
        /// Origin of the mutation.
        provenance: Provenance,
    },
}

impl StoreEvent {
    /// Returns the ID the event concerns (the container for key events).
    pub fn id(&self) -> &ValueId {
        match self {
            StoreEvent::Added { value, .. } | StoreEvent::Changed { value, .. } => &value.id,
            StoreEvent::Removed { id, .. } => id,
            StoreEvent::ContainerAdded { container, .. }
            | StoreEvent::ContainerRemoved { container, .. } => container,
        }
    }

    /// Returns the origin of the mutation.
    pub fn provenance(&self) -> Provenance {
        match self {
            StoreEvent::Added { provenance, .. }
            | StoreEvent::Changed { provenance, .. }
            | StoreEvent::Removed { provenance, .. }
            | StoreEvent::ContainerAdded { provenance, .. }
            | StoreEvent::ContainerRemoved { provenance, .. } => *provenance,
        }
    }
}

struct Node {
    value: Value,
    keys: Vec<String>,
}

#[derive(Default)]
struct StoreInner {
    nodes: HashMap<HashToken, Node>,
    index: BTreeSet<ValueId>,
    schemas: HashMap<HashToken, ContainerSchema>,
}

impl StoreInner {
    fn node(&self, id: &ValueId) -> Option<&Node> {
        self.nodes
            .get(&id.token())
            .filter(|node| node.value.id == *id)
    }

    fn node_mut(&mut self, id: &ValueId) -> Option<&mut Node> {
        self.nodes
            .get_mut(&id.token())
            .filter(|node| node.value.id == *id)
    }

    fn contains(&self, id: &ValueId) -> bool {
        self.node(id).is_some()
    }

    fn insert(&mut self, value: Value) -> StoreResult<()> {
        let token = value.token();
        if let Some(existing) = self.nodes.get(&token) {
            if existing.value.id != value.id {
                return Err(StoreError::TokenCollision {
                    existing: existing.value.id.clone(),
                    incoming: value.id,
                });
            }
        }
        self.index.insert(value.id.clone());
        self.nodes.insert(
            token,
            Node {
                value,
                keys: Vec::new(),
            },
        );
        Ok(())
    }

    /// IDs of `id` and all its descendants, in path order.
    fn subtree(&self, id: &ValueId) -> Vec<ValueId> {
        self.index
            .range(id.clone()..)
            .take_while(|candidate| candidate.starts_with(id))
            .cloned()
            .collect()
    }

    fn erase(&mut self, id: &ValueId) -> Option<Value> {
        self.index.remove(id);
        if !self.contains(id) {
            return None;
        }
        let token = id.token();
        self.schemas.remove(&token);
        self.nodes.remove(&token).map(|node| node.value)
    }

    /// Drops `id`'s leaf from its parent's key list, if the parent is a
    /// container holding it.
    fn unlink_from_parent(&mut self, id: &ValueId) {
        let (Some(parent), Some(leaf)) = (id.parent(), id.leaf()) else {
            return;
        };
        if let Some(node) = self.node_mut(&parent) {
            node.keys.retain(|key| key != leaf);
        }
    }
}

/// Mapping from [`ValueId`] to [`Value`] with change notification.
pub struct ValueStore {
    inner: Mutex<StoreInner>,
    observers: ObserverList<StoreEvent>,
}

impl ValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            observers: ObserverList::new(),
        }
    }

    /// Registers an observer for every event.
    #[must_use = "dropping the subscription removes the observer"]
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Registers an observer for events concerning `id` only.
    #[must_use = "dropping the subscription removes the observer"]
    pub fn observe_id<F>(&self, id: ValueId, callback: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(move |event: &StoreEvent| {
            if *event.id() == id {
                callback(event);
            }
        })
    }

    fn dispatch(&self, events: Vec<StoreEvent>) {
        for event in &events {
            self.observers.notify(event);
        }
    }

    /// Declares a value as its owner (schema initialization).
    ///
    /// Creates the value when absent; otherwise updates its access mode and
    /// replaces the payload without an access check.
    pub fn declare(&self, id: &ValueId, data: Data, access: Access) -> StoreResult<SetStatus> {
        self.apply(id, data, Some(access), Provenance::Local, false)
    }

    /// Sets a value's payload, creating the value when absent.
    ///
    /// A `Local` write to a read-only value is rejected with
    /// [`SetError::AccessError`]; `Remote` writes come from the owning
    /// authority and are not access-checked.
    pub fn set(&self, id: &ValueId, data: Data, provenance: Provenance) -> StoreResult<SetStatus> {
        self.apply(id, data, None, provenance, true)
    }

    /// Sets a value from a full [`Value`]; the access mode is used only when
    /// the value is created.
    pub fn set_value(&self, value: &Value, provenance: Provenance) -> StoreResult<SetStatus> {
        self.apply(
            &value.id,
            value.data.clone(),
            Some(value.access),
            provenance,
            true,
        )
    }

    fn apply(
        &self,
        id: &ValueId,
        data: Data,
        access: Option<Access>,
        provenance: Provenance,
        check_access: bool,
    ) -> StoreResult<SetStatus> {
        let event = {
            let mut inner = self.inner.lock();
            if let Some(node) = inner.node_mut(id) {
                if check_access && !provenance.is_remote() && node.value.is_read_only() {
                    warn!(id = %id, "rejected local write to read-only value");
                    return Err(StoreError::rejected(id, SetError::AccessError));
                }
                if !check_access {
                    if let Some(access) = access {
                        node.value.access = access;
                    }
                }
                match node.value.set(&data) {
                    Ok(SetStatus::Success) => StoreEvent::Changed {
                        value: node.value.clone(),
                        provenance,
                    },
                    Ok(SetStatus::SameValue) => return Ok(SetStatus::SameValue),
                    Err(e) => {
                        warn!(id = %id, error = %e, "rejected set");
                        return Err(StoreError::rejected(id, e));
                    }
                }
            } else {
                let mut value =
                    Value::with_access(id.clone(), Data::Unset, access.unwrap_or_default());
                value.set(&data).map_err(|e| StoreError::rejected(id, e))?;
                inner.insert(value.clone())?;
                debug!(id = %id, kind = %value.kind(), "value created");
                StoreEvent::Added { value, provenance }
            }
        };
        self.dispatch(vec![event]);
        Ok(SetStatus::Success)
    }

    /// Returns a snapshot of a value.
    pub fn get(&self, id: &ValueId) -> Option<Value> {
        self.inner.lock().node(id).map(|node| node.value.clone())
    }

    /// Returns true if the value exists.
    pub fn has(&self, id: &ValueId) -> bool {
        self.inner.lock().contains(id)
    }

    /// Returns the kind of a value.
    pub fn kind(&self, id: &ValueId) -> Option<Kind> {
        self.inner.lock().node(id).map(|node| node.value.kind())
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Returns true if the store holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of every value, in path order.
    pub fn values(&self) -> Vec<Value> {
        let inner = self.inner.lock();
        inner
            .index
            .iter()
            .filter_map(|id| inner.node(id).map(|node| node.value.clone()))
            .collect()
    }

    /// Returns the direct children of `id` that exist in the store.
    pub fn children(&self, id: &ValueId) -> Vec<ValueId> {
        let depth = id.depth() + 1;
        self.inner
            .lock()
            .subtree(id)
            .into_iter()
            .filter(|child| child.depth() == depth)
            .collect()
    }

    /// Returns true if any value exists strictly below `id`.
    pub fn has_children(&self, id: &ValueId) -> bool {
        self.inner.lock().subtree(id).iter().any(|c| c != id)
    }

    /// Returns `id` itself or its closest ancestor that exists.
    pub fn nearest_existing(&self, id: &ValueId) -> Option<ValueId> {
        let inner = self.inner.lock();
        let mut candidate = Some(id.clone());
        while let Some(current) = candidate {
            if inner.contains(&current) {
                return Some(current);
            }
            candidate = current.parent();
        }
        None
    }

    /// Removes a value and its whole subtree.
    ///
    /// Emits one `Removed` event per erased value, deepest first. Returns
    /// `false` if the value did not exist.
    pub fn remove(&self, id: &ValueId, provenance: Provenance) -> StoreResult<bool> {
        let events = {
            let mut inner = self.inner.lock();
            if !inner.contains(id) {
                return Ok(false);
            }
            let mut doomed = inner.subtree(id);
            doomed.reverse();
            inner.unlink_from_parent(id);
            doomed
                .into_iter()
                .filter_map(|victim| inner.erase(&victim))
                .map(|value| StoreEvent::Removed {
                    token: value.token(),
                    id: value.id,
                    provenance,
                })
                .collect::<Vec<_>>()
        };
        debug!(id = %id, count = events.len(), "subtree removed");
        self.dispatch(events);
        Ok(true)
    }

    /// Removes a value after checking the carried hash token.
    ///
    /// Returns `false` for a duplicate removal (value already gone).
    pub fn remove_with_token(
        &self,
        id: &ValueId,
        token: HashToken,
        provenance: Provenance,
    ) -> StoreResult<bool> {
        if id.token() != token {
            return Err(StoreError::TokenMismatch {
                id: id.clone(),
                token,
            });
        }
        self.remove(id, provenance)
    }

    /// Declares a container and registers its schema.
    pub fn declare_container(&self, schema: ContainerSchema) -> StoreResult<()> {
        schema.validate()?;
        self.declare(&schema.id, Data::Container(schema.order), Access::ReadWrite)?;
        self.inner.lock().schemas.insert(schema.id.token(), schema);
        Ok(())
    }

    /// Returns a container's schema.
    pub fn container_schema(&self, id: &ValueId) -> Option<ContainerSchema> {
        self.inner.lock().schemas.get(&id.token()).cloned()
    }

    /// Returns every registered container schema, in path order.
    pub fn container_schemas(&self) -> Vec<ContainerSchema> {
        let inner = self.inner.lock();
        let mut schemas: Vec<ContainerSchema> = inner.schemas.values().cloned().collect();
        schemas.sort_by(|a, b| a.id.cmp(&b.id));
        schemas
    }

    /// Unregisters a container's schema; the container value stays.
    pub fn remove_container_schema(&self, id: &ValueId) -> Option<ContainerSchema> {
        self.inner.lock().schemas.remove(&id.token())
    }

    /// Adds `key` to a container and instantiates its template.
    ///
    /// Emits `ContainerAdded` followed by `Added` for the instance root and
    /// each template value. A remote directive for an unknown container
    /// creates the container. Returns `false` if the key already existed.
    pub fn add_to_container(
        &self,
        container: &ValueId,
        key: &str,
        provenance: Provenance,
    ) -> StoreResult<bool> {
        let instance = container.join(key)?;
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if !inner.contains(container) {
                if !provenance.is_remote() {
                    return Err(StoreError::NotFound(container.clone()));
                }
                let value = Value::new(container.clone(), Data::Container(ContainerOrder::Ordered));
                inner.insert(value.clone())?;
                events.push(StoreEvent::Added { value, provenance });
            }

            let node = inner
                .node_mut(container)
                .ok_or_else(|| StoreError::NotFound(container.clone()))?;
            if node.value.kind() != Kind::Container {
                return Err(StoreError::NotAContainer(container.clone()));
            }
            if node.keys.iter().any(|k| k == key) {
                return Ok(false);
            }
            node.keys.push(key.to_string());
            events.push(StoreEvent::ContainerAdded {
                container: container.clone(),
                key: key.to_string(),
                provenance,
            });

            let mut created = vec![(instance.clone(), Data::Struct, Access::ReadWrite)];
            if let Some(schema) = inner.schemas.get(&container.token()) {
                created.extend(schema.instantiate(key));
            }
            for (id, data, access) in created {
                if inner.contains(&id) {
                    continue;
                }
                let value = Value::with_access(id, data, access);
                inner.insert(value.clone())?;
                events.push(StoreEvent::Added { value, provenance });
            }
        }
        debug!(container = %container, key, "container key added");
        self.dispatch(events);
        Ok(true)
    }

    /// Erases `key` from a container together with its instance subtree.
    ///
    /// Emits a single `ContainerRemoved`; the erased children do not produce
    /// individual `Removed` events. Returns `false` if the key was absent.
    pub fn remove_from_container(
        &self,
        container: &ValueId,
        key: &str,
        provenance: Provenance,
    ) -> StoreResult<bool> {
        let instance = container.join(key)?;
        {
            let mut inner = self.inner.lock();
            let node = inner
                .node_mut(container)
                .ok_or_else(|| StoreError::NotFound(container.clone()))?;
            if node.value.kind() != Kind::Container {
                return Err(StoreError::NotAContainer(container.clone()));
            }
            let Some(position) = node.keys.iter().position(|k| k == key) else {
                return Ok(false);
            };
            node.keys.remove(position);
            for victim in inner.subtree(&instance) {
                inner.erase(&victim);
            }
        }
        debug!(container = %container, key, "container key removed");
        self.dispatch(vec![StoreEvent::ContainerRemoved {
            container: container.clone(),
            key: key.to_string(),
            provenance,
        }]);
        Ok(true)
    }

    /// Returns a container's keys: insertion order for ordered containers,
    /// sorted for unordered ones.
    pub fn keys(&self, container: &ValueId) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        let node = inner
            .node(container)
            .ok_or_else(|| StoreError::NotFound(container.clone()))?;
        match node.value.data {
            Data::Container(ContainerOrder::Ordered) => Ok(node.keys.clone()),
            Data::Container(ContainerOrder::Unordered) => {
                let mut keys = node.keys.clone();
                keys.sort();
                Ok(keys)
            }
            _ => Err(StoreError::NotAContainer(container.clone())),
        }
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::TemplateEntry;
    use crate::data::IntWidth;
    use std::sync::Arc;

    fn id(s: &str) -> ValueId {
        ValueId::parse(s).unwrap()
    }

    fn recorder(store: &ValueStore) -> (Arc<Mutex<Vec<StoreEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = store.observe(move |e| sink.lock().push(e.clone()));
        (events, sub)
    }

    #[test]
    fn set_creates_then_changes() {
        let store = ValueStore::new();
        let (events, _sub) = recorder(&store);

        store.set(&id("a.b"), Data::text("x"), Provenance::Local).unwrap();
        store.set(&id("a.b"), Data::text("y"), Provenance::Remote).unwrap();
        let same = store.set(&id("a.b"), Data::text("y"), Provenance::Remote).unwrap();
        assert_eq!(same, SetStatus::SameValue);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StoreEvent::Added { provenance: Provenance::Local, .. }));
        assert!(matches!(&events[1], StoreEvent::Changed { provenance: Provenance::Remote, .. }));
    }

    #[test]
    fn rejected_set_keeps_previous_value() {
        let store = ValueStore::new();
        store
            .set(&id("n"), Data::signed(IntWidth::I32, 1), Provenance::Local)
            .unwrap();
        let err = store
            .set(&id("n"), Data::text("nope"), Provenance::Local)
            .unwrap_err();
        assert!(matches!(err.set_error(), Some(SetError::InvalidType { .. })));
        assert_eq!(store.get(&id("n")).unwrap().data, Data::signed(IntWidth::I32, 1));
    }

    #[test]
    fn read_only_rejects_local_but_not_remote() {
        let store = ValueStore::new();
        store
            .declare(&id("ro"), Data::Bool(false), Access::ReadOnly)
            .unwrap();
        let err = store.set(&id("ro"), Data::Bool(true), Provenance::Local).unwrap_err();
        assert_eq!(err.set_error(), Some(&SetError::AccessError));
        assert_eq!(
            store.set(&id("ro"), Data::Bool(true), Provenance::Remote).unwrap(),
            SetStatus::Success
        );
    }

    #[test]
    fn remove_erases_subtree_deepest_first() {
        let store = ValueStore::new();
        store.set(&id("a"), Data::Struct, Provenance::Local).unwrap();
        store.set(&id("a.b"), Data::Bool(true), Provenance::Local).unwrap();
        store.set(&id("a.b.c"), Data::Bool(true), Provenance::Local).unwrap();
        store.set(&id("ab"), Data::Bool(true), Provenance::Local).unwrap();
        let (events, _sub) = recorder(&store);

        assert!(store.remove(&id("a"), Provenance::Remote).unwrap());
        assert!(!store.has(&id("a.b.c")));
        assert!(store.has(&id("ab")));

        let removed: Vec<String> = events
            .lock()
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(removed, vec!["a.b.c", "a.b", "a"]);
        assert!(!store.remove(&id("a"), Provenance::Remote).unwrap());
    }

    #[test]
    fn remove_with_token_checks_token() {
        let store = ValueStore::new();
        store.set(&id("x"), Data::Bool(true), Provenance::Local).unwrap();
        let err = store
            .remove_with_token(&id("x"), id("y").token(), Provenance::Remote)
            .unwrap_err();
        assert!(matches!(err, StoreError::TokenMismatch { .. }));
        assert!(store
            .remove_with_token(&id("x"), id("x").token(), Provenance::Remote)
            .unwrap());
        assert!(!store
            .remove_with_token(&id("x"), id("x").token(), Provenance::Remote)
            .unwrap());
    }

    #[test]
    fn container_add_and_remove() {
        let store = ValueStore::new();
        let schema = ContainerSchema::new(id("logger"), ContainerOrder::Ordered)
            .with_entry(TemplateEntry::new(id("logger.+.level"), Data::text("info")))
            .unwrap();
        store.declare_container(schema).unwrap();
        let (events, _sub) = recorder(&store);

        assert!(store.add_to_container(&id("logger"), "svc", Provenance::Local).unwrap());
        assert!(!store.add_to_container(&id("logger"), "svc", Provenance::Local).unwrap());
        assert_eq!(store.keys(&id("logger")).unwrap(), vec!["svc"]);
        assert_eq!(store.kind(&id("logger.svc")), Some(Kind::Struct));
        assert_eq!(
            store.get(&id("logger.svc.level")).unwrap().data,
            Data::text("info")
        );
        assert!(matches!(&events.lock()[0], StoreEvent::ContainerAdded { key, .. } if key == "svc"));

        events.lock().clear();
        assert!(store
            .remove_from_container(&id("logger"), "svc", Provenance::Local)
            .unwrap());
        assert!(!store.has(&id("logger.svc.level")));
        assert!(store.keys(&id("logger")).unwrap().is_empty());
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn unordered_keys_are_sorted() {
        let store = ValueStore::new();
        store
            .declare_container(ContainerSchema::new(id("c"), ContainerOrder::Unordered))
            .unwrap();
        for key in ["b", "c", "a"] {
            store.add_to_container(&id("c"), key, Provenance::Local).unwrap();
        }
        assert_eq!(store.keys(&id("c")).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn add_to_unknown_container() {
        let store = ValueStore::new();
        let err = store
            .add_to_container(&id("c"), "k", Provenance::Local)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        assert!(store.add_to_container(&id("c"), "k", Provenance::Remote).unwrap());
        assert_eq!(store.kind(&id("c")), Some(Kind::Container));

        store.set(&id("leaf"), Data::Bool(true), Provenance::Local).unwrap();
        let err = store
            .add_to_container(&id("leaf"), "k", Provenance::Local)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAContainer(_)));
    }

    #[test]
    fn observer_may_mutate_store() {
        let store = Arc::new(ValueStore::new());
        let inner = Arc::clone(&store);
        let _sub = store.observe_id(id("trigger"), move |_| {
            inner
                .set(&id("derived"), Data::Bool(true), Provenance::Local)
                .unwrap();
        });
        store.set(&id("trigger"), Data::Bool(true), Provenance::Local).unwrap();
        assert!(store.has(&id("derived")));
    }

    #[test]
    fn tree_queries() {
        let store = ValueStore::new();
        store.set(&id("a.b"), Data::Bool(true), Provenance::Local).unwrap();
        store.set(&id("a.b.c"), Data::Bool(true), Provenance::Local).unwrap();
        assert_eq!(store.nearest_existing(&id("a.b.x.y")), Some(id("a.b")));
        assert_eq!(store.nearest_existing(&id("z")), None);
        assert_eq!(store.children(&id("a.b")), vec![id("a.b.c")]);
        assert!(store.has_children(&id("a.b")));
        assert!(!store.has_children(&id("a.b.c")));
        assert_eq!(store.values().len(), 2);
    }
}
