//! Message handler.
//!
//! Translates between local store events and protocol messages:
//!
//! - Outbound: local additions and changes become `ValueChanged`, removals
//!   become `ValueRemoved`. Changes that arrived from the wire are not echoed
//!   back; removals always propagate.
//! - Inbound: `ValueChanged`, `ValueRemoved` and `Result` are applied to the
//!   store with `Remote` provenance, subject to the ancestor filter.
//!
//! The ancestor filter hides other applications' subtrees under shared
//! roots such as `logger`: with `logger` filtered and this application
//! named `A`, `logger.A.*` is visible while `logger.B.*` is not.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use vstore_core::{
    HashToken, Kind, ObserverList, Provenance, StoreEvent, Subscription, Value, ValueId,
    ValueStore,
};
use vstore_sync_protocol::{Message, ResultStatus, ValueUpdate};

/// Outcome of a sequence-numbered request, dispatched after a `Result`
/// message has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultEvent {
    /// Sequence number of the request.
    pub sequence_no: u32,
    /// True for a successful result.
    pub success: bool,
}

/// Client-side message translation and ancestor filtering.
pub struct MessageHandler {
    store: Arc<ValueStore>,
    app_name: String,
    filters: Mutex<HashSet<HashToken>>,
    results: ObserverList<ResultEvent>,
}

impl MessageHandler {
    /// Creates a handler for the application `app_name`.
    pub fn new(store: Arc<ValueStore>, app_name: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            filters: Mutex::new(HashSet::new()),
            results: ObserverList::new(),
        }
    }

    /// Returns the application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Returns the store this handler applies messages to.
    pub fn store(&self) -> &Arc<ValueStore> {
        &self.store
    }

    /// Hides other applications' subtrees below `root`.
    pub fn insert_app_name_filter(&self, root: &ValueId) {
        self.filters.lock().insert(root.token());
    }

    /// Removes the filter on `root`.
    pub fn remove_app_name_filter(&self, root: &ValueId) {
        self.filters.lock().remove(&root.token());
    }

    /// Returns true if `root` is a filter root.
    pub fn has_app_name_filter(&self, root: &ValueId) -> bool {
        self.filters.lock().contains(&root.token())
    }

    /// Returns true if `id` is this application's own entry under its
    /// parent, i.e. `id == parent(id) + app_name`.
    pub fn is_app_name_match(&self, id: &ValueId) -> bool {
        id.leaf() == Some(self.app_name.as_str())
    }

    /// Returns true if `id` lies in another application's slice of a shared
    /// root.
    ///
    /// Never filtered while the filter set is empty. Filtered when neither
    /// `id` nor any of its ancestors exists locally.
    pub fn is_app_name_filtered(&self, id: &ValueId) -> bool {
        let filters = self.filters.lock();
        if filters.is_empty() {
            return false;
        }
        if self.store.nearest_existing(id).is_none() {
            return true;
        }

        let mut current = id.clone();
        while let Some(parent) = current.parent() {
            if filters.contains(&parent.token()) {
                return !self.is_app_name_match(&current);
            }
            current = parent;
        }
        false
    }

    /// Registers an observer for result outcomes.
    #[must_use = "dropping the subscription removes the observer"]
    pub fn observe_results<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ResultEvent) + Send + Sync + 'static,
    {
        self.results.subscribe(callback)
    }

    /// Builds the outbound message for a store event, if any.
    pub fn outbound(&self, event: &StoreEvent) -> Option<Message> {
        if let StoreEvent::Removed { id, token, .. } = event {
            return Some(Message::ValueRemoved {
                ids: vec![id.clone()],
                tokens: vec![*token],
            });
        }
        if event.provenance().is_remote() {
            return None;
        }
        let update = match event {
            StoreEvent::Added { value, .. } | StoreEvent::Changed { value, .. } => {
                if value.kind() == Kind::Unset {
                    return None;
                }
                ValueUpdate::set(value.clone())
            }
            StoreEvent::ContainerAdded { container, key, .. } => ValueUpdate::AddToContainer {
                container: container.clone(),
                key: key.clone(),
            },
            StoreEvent::ContainerRemoved { container, key, .. } => {
                ValueUpdate::RemoveFromContainer {
                    container: container.clone(),
                    key: key.clone(),
                }
            }
            StoreEvent::Removed { .. } => return None,
        };
        Some(Message::ValueChanged {
            values: vec![update],
        })
    }

    /// Applies an inbound message.
    pub fn handle(&self, message: &Message) {
        match message {
            Message::ValueChanged { values } => {
                for update in values {
                    self.value_update(update);
                }
            }
            Message::ValueRemoved { ids, tokens } => self.values_removed(ids, tokens),
            Message::Result {
                sequence_no,
                status,
                values,
            } => self.result(*sequence_no, *status, values),
            Message::SyncCompleted => debug!("sync completed"),
            other => debug!(type_code = other.type_code(), "ignoring client-bound request"),
        }
    }

    /// Applies one update; returns true if it was handled.
    pub fn value_update(&self, update: &ValueUpdate) -> bool {
        match update {
            ValueUpdate::AddToContainer { container, key } => {
                match self.store.add_to_container(container, key, Provenance::Remote) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(container = %container, key, error = %e, "add to container failed");
                        false
                    }
                }
            }
            ValueUpdate::RemoveFromContainer { container, key } => {
                match self
                    .store
                    .remove_from_container(container, key, Provenance::Remote)
                {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(container = %container, key, error = %e, "remove from container failed");
                        false
                    }
                }
            }
            ValueUpdate::Set { value } => self.apply_value(value),
        }
    }

    fn apply_value(&self, value: &Value) -> bool {
        if self.is_app_name_filtered(&value.id) {
            debug!(id = %value.id, "filtered");
            return false;
        }
        if matches!(
            self.store.kind(&value.id),
            Some(Kind::Struct) | Some(Kind::Container)
        ) {
            return true;
        }
        match self.store.set_value(value, Provenance::Remote) {
            Ok(_) => true,
            Err(e) => {
                // The local mirror stays diverged until the authority pushes again.
                warn!(id = %value.id, error = %e, "inbound update rejected");
                false
            }
        }
    }

    fn values_removed(&self, ids: &[ValueId], tokens: &[HashToken]) {
        for (i, id) in ids.iter().enumerate() {
            let result = match tokens.get(i) {
                Some(token) => self.store.remove_with_token(id, *token, Provenance::Remote),
                None => self.store.remove(id, Provenance::Remote),
            };
            match result {
                Ok(true) => {}
                Ok(false) => debug!(id = %id, "remove of unknown value"),
                Err(e) => warn!(id = %id, error = %e, "remove rejected"),
            }
        }
    }

    fn result(&self, sequence_no: u32, status: ResultStatus, values: &[Value]) {
        match status {
            ResultStatus::Success => {
                for value in values {
                    self.apply_value(value);
                }
            }
            ResultStatus::NotFound => {
                for value in values {
                    if let Err(e) = self.store.remove(&value.id, Provenance::Remote) {
                        warn!(id = %value.id, error = %e, "remove rejected");
                    }
                }
            }
            ResultStatus::Other(code) => {
                warn!(sequence_no, code, "request failed");
            }
        }
        self.results.notify(&ResultEvent {
            sequence_no,
            success: status.is_success(),
        });
    }
}
