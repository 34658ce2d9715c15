// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event bus: per-plugin listener registries and fan-out.
//
// Every plugin owns one `ListenerRegistry`. No lock is held while a
// listener runs, so a listener for one plugin may freely notify another.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, error};

use tether_core::error::{BridgeError, Result};
use tether_core::types::{EventMessage, ListenerId, OutboundMessage};

use crate::executor::panic_message;
use crate::sink::MessageSink;

/// Receives notifications for the events it is registered on.
pub trait Listener: Send + Sync {
    fn id(&self) -> ListenerId;

    fn on_event(&self, plugin_name: &str, event_name: &str, payload: &Value);
}

struct FnListener<F> {
    id: ListenerId,
    f: F,
}

impl<F> Listener for FnListener<F>
where
    F: Fn(&str, &str, &Value) + Send + Sync,
{
    fn id(&self) -> ListenerId {
        self.id
    }

    fn on_event(&self, plugin_name: &str, event_name: &str, payload: &Value) {
        (self.f)(plugin_name, event_name, payload)
    }
}

/// Wrap a closure as a listener with a fresh id.
pub fn listener_fn<F>(f: F) -> Arc<dyn Listener>
where
    F: Fn(&str, &str, &Value) + Send + Sync + 'static,
{
    Arc::new(FnListener {
        id: ListenerId::new(),
        f,
    })
}

/// Listener registered from the web layer through `addListener`.
/// Forwards every notification outbound as an event message.
pub(crate) struct WebListener {
    id: ListenerId,
    sink: Arc<dyn MessageSink>,
}

impl WebListener {
    pub(crate) fn new(id: ListenerId, sink: Arc<dyn MessageSink>) -> Self {
        Self { id, sink }
    }
}

impl Listener for WebListener {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn on_event(&self, plugin_name: &str, event_name: &str, payload: &Value) {
        self.sink.send(OutboundMessage::Event(EventMessage {
            plugin_name: plugin_name.to_owned(),
            event_name: event_name.to_owned(),
            payload: payload.clone(),
            listener_id: self.id,
        }));
    }
}

/// One notification waiting for delivery, with its listener snapshot.
struct Delivery {
    event_name: String,
    payload: Value,
    listeners: Vec<Arc<dyn Listener>>,
}

#[derive(Default)]
struct Listeners {
    by_event: HashMap<String, Vec<Arc<dyn Listener>>>,
    retained: HashMap<String, Value>,
    pending: VecDeque<Delivery>,
    // Set while some thread is draining `pending`.
    draining: bool,
}

/// Listeners of one plugin, keyed by event name.
///
/// Notifications are queued in `notify` order and delivered by whichever
/// thread finds the queue idle. A notify issued while another thread is
/// delivering for this plugin (or from inside one of its listeners) is
/// queued and returns at once; the delivering thread reaches it next.
pub struct ListenerRegistry {
    plugin_name: String,
    listeners: Mutex<Listeners>,
}

impl ListenerRegistry {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Add a listener. Returns `false` if that listener id is already
    /// registered for the event.
    ///
    /// A payload retained for this event is delivered to the new listener
    /// before `add` returns, unless another thread is delivering for this
    /// plugin; it then reaches the listener in queue order.
    pub fn add(&self, event_name: &str, listener: Arc<dyn Listener>) -> bool {
        let mut state = self.listeners.lock();
        let list = state.by_event.entry(event_name.to_owned()).or_default();
        if list.iter().any(|l| l.id() == listener.id()) {
            return false;
        }
        list.push(Arc::clone(&listener));
        debug!(plugin = %self.plugin_name, event = event_name, listener = %listener.id(), "listener added");

        let retained = state.retained.remove(event_name);
        if let Some(payload) = retained {
            self.enqueue(
                state,
                Delivery {
                    event_name: event_name.to_owned(),
                    payload,
                    listeners: vec![listener],
                },
            );
        }
        true
    }

    /// Remove a listener. Unknown ids are ignored and return `false`.
    pub fn remove(&self, event_name: &str, listener_id: ListenerId) -> bool {
        let mut state = self.listeners.lock();
        let Some(list) = state.by_event.get_mut(event_name) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id() != listener_id);
        let removed = list.len() != before;
        if list.is_empty() {
            state.by_event.remove(event_name);
        }
        removed
    }

    /// Drop every listener of this plugin. Retained payloads are kept.
    pub fn remove_all(&self) {
        self.listeners.lock().by_event.clear();
    }

    /// Drop listeners, retained payloads and undelivered notifications.
    pub fn clear(&self) {
        let mut state = self.listeners.lock();
        state.by_event.clear();
        state.retained.clear();
        state.pending.clear();
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners
            .lock()
            .by_event
            .get(event_name)
            .map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listener_count(event_name) > 0
    }

    /// Deliver `payload` to every listener of `event_name`, in registration
    /// order. Returns how many listeners the notification is addressed to.
    ///
    /// The listener set is snapshotted first; listeners added or removed
    /// during delivery take effect from the next notification.
    pub fn notify(&self, event_name: &str, payload: &Value) -> usize {
        let state = self.listeners.lock();
        let listeners = state.by_event.get(event_name).cloned().unwrap_or_default();
        let count = listeners.len();
        if count > 0 {
            self.enqueue(
                state,
                Delivery {
                    event_name: event_name.to_owned(),
                    payload: payload.clone(),
                    listeners,
                },
            );
        }
        count
    }

    /// Like `notify`, but with no listeners the payload is kept and handed
    /// to the first listener added for `event_name`. Only the latest payload
    /// per event is kept.
    pub fn notify_retained(&self, event_name: &str, payload: Value) -> usize {
        let mut state = self.listeners.lock();
        let listeners = state.by_event.get(event_name).cloned().unwrap_or_default();
        if listeners.is_empty() {
            debug!(plugin = %self.plugin_name, event = event_name, "no listeners; payload retained");
            state.retained.insert(event_name.to_owned(), payload);
            return 0;
        }
        let count = listeners.len();
        self.enqueue(
            state,
            Delivery {
                event_name: event_name.to_owned(),
                payload,
                listeners,
            },
        );
        count
    }

    /// Queue a delivery taken under `state`, then drain the queue unless
    /// another caller already is.
    fn enqueue(&self, mut state: MutexGuard<'_, Listeners>, delivery: Delivery) {
        state.pending.push_back(delivery);
        if state.draining {
            return;
        }
        state.draining = true;
        drop(state);

        loop {
            let next = {
                let mut state = self.listeners.lock();
                match state.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            for listener in &next.listeners {
                self.deliver(listener, &next.event_name, &next.payload);
            }
        }
    }

    fn deliver(&self, listener: &Arc<dyn Listener>, event_name: &str, payload: &Value) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            listener.on_event(&self.plugin_name, event_name, payload)
        }));
        if let Err(payload) = result {
            error!(
                plugin = %self.plugin_name,
                event = event_name,
                listener = %listener.id(),
                panic = %panic_message(payload.as_ref()),
                "listener panicked"
            );
        }
    }
}

/// Listener registries for every loaded plugin.
#[derive(Default)]
pub struct EventBus {
    registries: HashMap<String, Arc<ListenerRegistry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the registry for a plugin, or return the existing one.
    pub fn ensure(&mut self, plugin_name: &str) -> Arc<ListenerRegistry> {
        Arc::clone(
            self.registries
                .entry(plugin_name.to_owned())
                .or_insert_with(|| Arc::new(ListenerRegistry::new(plugin_name))),
        )
    }

    pub fn registry(&self, plugin_name: &str) -> Result<&Arc<ListenerRegistry>> {
        self.registries
            .get(plugin_name)
            .ok_or_else(|| BridgeError::UnknownPlugin(plugin_name.to_owned()))
    }

    pub fn add_listener(
        &self,
        plugin_name: &str,
        event_name: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<bool> {
        Ok(self.registry(plugin_name)?.add(event_name, listener))
    }

    pub fn remove_listener(
        &self,
        plugin_name: &str,
        event_name: &str,
        listener_id: ListenerId,
    ) -> Result<bool> {
        Ok(self.registry(plugin_name)?.remove(event_name, listener_id))
    }

    pub fn remove_all_listeners(&self, plugin_name: &str) -> Result<()> {
        self.registry(plugin_name)?.remove_all();
        Ok(())
    }

    pub fn notify(&self, plugin_name: &str, event_name: &str, payload: &Value) -> Result<usize> {
        Ok(self.registry(plugin_name)?.notify(event_name, payload))
    }

    pub fn notify_retained(
        &self,
        plugin_name: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<usize> {
        Ok(self.registry(plugin_name)?.notify_retained(event_name, payload))
    }

    /// Clear every registry. Used at teardown.
    pub fn clear(&self) {
        for registry in self.registries.values() {
            registry.clear();
        }
    }
}
