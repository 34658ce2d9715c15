// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge instance: owns the registry, dispatcher, event bus and plugins for
// one web view.
//
// Lifecycle:
//   build    -> register methods (plugin + built-in listener methods),
//               freeze the registry, load each plugin
//   running  -> dispatch / notify from any thread
//   teardown -> cancel outstanding calls, tear plugins down in reverse load
//               order, drop every listener

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tracing::{error, info, instrument};
use uuid::Uuid;

use tether_core::config::{BridgeConfig, InstanceDescriptor};
use tether_core::error::{BridgeError, Result};
use tether_core::types::{
    CallEnvelope, CallRecord, CallState, CallbackId, ExecutionContext, ListenerId,
};

use crate::channel::ResultChannel;
use crate::dispatcher::Dispatcher;
use crate::events::{EventBus, Listener, ListenerRegistry, WebListener};
use crate::executor::{Scheduler, panic_message};
use crate::plugin::{Plugin, PluginContext};
use crate::registry::{MethodDescriptor, MethodRegistry};
use crate::sink::MessageSink;

/// Methods every plugin answers to without declaring them.
pub const ADD_LISTENER: &str = "addListener";
pub const REMOVE_LISTENER: &str = "removeListener";
pub const REMOVE_ALL_LISTENERS: &str = "removeAllListeners";

/// State shared between the bridge handle and plugin contexts.
pub(crate) struct BridgeShared {
    config: BridgeConfig,
    descriptor: Arc<InstanceDescriptor>,
    dispatcher: Dispatcher,
    events: EventBus,
    plugins: Vec<Arc<dyn Plugin>>,
    torn_down: AtomicBool,
}

impl BridgeShared {
    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Idempotent. Returns `false` if teardown already happened.
    fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cancelled = self.dispatcher.cancel_all();
        for plugin in self.plugins.iter().rev() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| plugin.teardown())) {
                error!(
                    plugin = plugin.name(),
                    panic = %panic_message(payload.as_ref()),
                    "plugin teardown panicked"
                );
            }
        }
        self.events.clear();
        info!(cancelled, "bridge torn down");
        true
    }
}

/// Assembles a `Bridge`.
pub struct BridgeBuilder {
    config: BridgeConfig,
    descriptor: InstanceDescriptor,
    plugins: Vec<Arc<dyn Plugin>>,
    scheduler: Option<Scheduler>,
    sink: Arc<dyn MessageSink>,
}

impl BridgeBuilder {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            config: BridgeConfig::default(),
            descriptor: InstanceDescriptor::default(),
            plugins: Vec::new(),
            scheduler: None,
            sink,
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn descriptor(mut self, descriptor: InstanceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Use custom executors instead of the ones built from the config.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Register every method, then load every plugin in the order added.
    ///
    /// Fails on a duplicate plugin name, a duplicate method or a plugin whose
    /// `load` fails. Plugins already loaded are torn down again.
    #[instrument(skip_all, fields(plugins = self.plugins.len()))]
    pub fn build(self) -> Result<Bridge> {
        let mut registry = MethodRegistry::new();
        let mut events = EventBus::new();

        for plugin in &self.plugins {
            let name = plugin.name().to_owned();
            if registry.has_plugin(&name) {
                return Err(BridgeError::PluginLoad {
                    plugin: name,
                    reason: "a plugin with this name is already registered".into(),
                });
            }
            for descriptor in Arc::clone(plugin).methods() {
                registry.register(&name, descriptor)?;
            }
            let listeners = events.ensure(&name);
            for descriptor in listener_methods(listeners, &self.sink) {
                // A plugin may provide its own listener methods.
                if registry.lookup(&name, descriptor.name()).is_none() {
                    registry.register(&name, descriptor)?;
                }
            }
        }

        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Scheduler::from_config(&self.config)?,
        };
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            scheduler,
            Arc::clone(&self.sink),
            self.config.finished_call_history,
        );
        let shared = Arc::new(BridgeShared {
            config: self.config,
            descriptor: Arc::new(self.descriptor),
            dispatcher,
            events,
            plugins: self.plugins,
            torn_down: AtomicBool::new(false),
        });

        for plugin in &shared.plugins {
            let context = PluginContext::new(
                plugin.name(),
                Arc::clone(&shared.descriptor),
                Arc::downgrade(&shared),
            );
            if let Err(err) = plugin.load(&context) {
                error!(plugin = plugin.name(), error = %err, "plugin failed to load");
                shared.teardown();
                return Err(BridgeError::PluginLoad {
                    plugin: plugin.name().to_owned(),
                    reason: err.to_string(),
                });
            }
            info!(plugin = plugin.name(), "plugin loaded");
        }

        info!(
            methods = shared.dispatcher.registry().len(),
            "bridge ready"
        );
        Ok(Bridge { shared })
    }
}

/// Built-in `addListener` / `removeListener` / `removeAllListeners` for one
/// plugin. They run on the caller's context.
fn listener_methods(
    listeners: Arc<ListenerRegistry>,
    sink: &Arc<dyn MessageSink>,
) -> Vec<MethodDescriptor> {
    let add = {
        let listeners = Arc::clone(&listeners);
        let sink = Arc::clone(sink);
        MethodDescriptor::new(ADD_LISTENER, ExecutionContext::Caller, move |call| {
            let event_name = call.require_str("eventName")?.to_owned();
            let id = ListenerId::new();
            // Answer first so a retained event arrives after the listener id.
            call.resolve(json!({ "listenerId": id }))?;
            listeners.add(&event_name, Arc::new(WebListener::new(id, Arc::clone(&sink))));
            Ok(())
        })
    };

    let remove = {
        let listeners = Arc::clone(&listeners);
        MethodDescriptor::new(REMOVE_LISTENER, ExecutionContext::Caller, move |call| {
            let event_name = call.require_str("eventName")?;
            let raw = call.require_str("listenerId")?;
            let id = Uuid::parse_str(raw)
                .map(ListenerId)
                .map_err(|e| BridgeError::BadArguments(format!("`listenerId`: {e}")))?;
            listeners.remove(event_name, id);
            call.resolve_empty()
        })
    };

    let remove_all =
        MethodDescriptor::new(REMOVE_ALL_LISTENERS, ExecutionContext::Caller, move |call| {
            listeners.remove_all();
            call.resolve_empty()
        });

    vec![add, remove, remove_all]
}

/// A running plugin bridge.
///
/// Dropping the bridge tears it down.
pub struct Bridge {
    shared: Arc<BridgeShared>,
}

impl Bridge {
    pub fn builder(sink: Arc<dyn MessageSink>) -> BridgeBuilder {
        BridgeBuilder::new(sink)
    }

    /// Route one envelope. See `Dispatcher::dispatch`.
    pub fn dispatch(&self, envelope: CallEnvelope) -> Result<ResultChannel> {
        if self.shared.is_torn_down() {
            return Err(BridgeError::Cancelled(envelope.callback_id.to_string()));
        }
        self.shared.dispatcher.dispatch(envelope)
    }

    pub fn call_state(&self, callback_id: &CallbackId) -> Option<CallState> {
        self.shared.dispatcher.call_state(callback_id)
    }

    pub fn outstanding(&self) -> Vec<CallRecord> {
        self.shared.dispatcher.outstanding()
    }

    /// Register a native listener. Returns `false` if it was already there.
    pub fn add_listener(
        &self,
        plugin_name: &str,
        event_name: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<bool> {
        self.shared
            .events
            .add_listener(plugin_name, event_name, listener)
    }

    pub fn remove_listener(
        &self,
        plugin_name: &str,
        event_name: &str,
        listener_id: ListenerId,
    ) -> Result<bool> {
        self.shared
            .events
            .remove_listener(plugin_name, event_name, listener_id)
    }

    pub fn remove_all_listeners(&self, plugin_name: &str) -> Result<()> {
        self.shared.events.remove_all_listeners(plugin_name)
    }

    pub fn notify(&self, plugin_name: &str, event_name: &str, payload: &Value) -> Result<usize> {
        self.shared.events.notify(plugin_name, event_name, payload)
    }

    pub fn notify_retained(
        &self,
        plugin_name: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<usize> {
        self.shared
            .events
            .notify_retained(plugin_name, event_name, payload)
    }

    pub fn registry(&self) -> &MethodRegistry {
        self.shared.dispatcher.registry()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.shared.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn descriptor(&self) -> &InstanceDescriptor {
        &self.shared.descriptor
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.is_torn_down()
    }

    /// Cancel outstanding calls and tear plugins down. Safe to call twice.
    #[instrument(skip(self))]
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}
