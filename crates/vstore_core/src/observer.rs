//! Observer lists with owned subscription handles.
//!
//! Each observed entity owns an [`ObserverList`]. Registering a callback
//! returns a [`Subscription`]; dropping the subscription (or calling
//! [`Subscription::unsubscribe`]) removes the callback. The subscription only
//! holds a weak reference to the list, so a callback never outlives the
//! entity it observes.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    observers: Vec<(u64, Callback<E>)>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<E> Detach for Mutex<Registry<E>> {
    fn detach(&self, id: u64) {
        self.lock().observers.retain(|(observer_id, _)| *observer_id != id);
    }
}

/// A list of callbacks notified with events of type `E`.
pub struct ObserverList<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> ObserverList<E> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Registers a callback.
    #[must_use = "dropping the subscription removes the observer"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.inner.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.observers.push((id, Arc::new(callback)));
            id
        };
        let registry: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Invokes every registered callback with `event`.
    ///
    /// Callbacks run after the list lock is released, so a callback may
    /// subscribe, unsubscribe or trigger further notifications.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .inner
            .lock()
            .observers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    /// Returns the number of registered callbacks.
    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Returns true if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for ObserverList<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned handle of one registered callback.
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    /// Removes the callback now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Returns true while the observed list is still alive.
    pub fn is_attached(&self) -> bool {
        self.registry.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
