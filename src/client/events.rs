//! Typed event subscriptions.
//!
//! One registry per event kind. Subscribing returns a [`Subscription`];
//! dropping it (or calling [`Subscription::unsubscribe`]) removes the
//! callback. Callbacks run synchronously on the task that emits the event,
//! so they should be quick and must not block.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::error::DisconnectCause;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            callbacks: BTreeMap::new(),
        }
    }
}

/// Subscriber set for one event kind.
pub struct EventChannel<T> {
    name: &'static str,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register `callback`; it stays registered until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.insert(id, Arc::new(callback));
            id
        };
        trace!("Subscribed to {} events (#{})", self.name, id);

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.lock().callbacks.remove(&id);
                }
            })),
        }
    }

    /// Invoke every callback with `event`.
    ///
    /// The lock is released before calling out, so a callback may subscribe
    /// or unsubscribe without deadlocking.
    pub fn emit(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self.registry.lock().callbacks.values().cloned().collect();
        trace!("Emitting {} event to {} subscriber(s)", self.name, callbacks.len());
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().callbacks.len()
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.registry.lock().callbacks.len())
            .finish()
    }
}

/// Handle that keeps a callback registered.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keep the callback registered for as long as the emitter lives.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// The three event kinds a connection emits.
#[derive(Debug)]
pub struct ConnectionEvents {
    pub connected: EventChannel<()>,
    pub disconnected: EventChannel<DisconnectCause>,
    pub push: EventChannel<String>,
}

impl Default for ConnectionEvents {
    fn default() -> Self {
        Self {
            connected: EventChannel::new("connected"),
            disconnected: EventChannel::new("disconnected"),
            push: EventChannel::new("push"),
        }
    }
}
