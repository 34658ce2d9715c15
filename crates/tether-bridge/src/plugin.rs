// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugin lifecycle.
//
// A plugin declares its bridged methods, is loaded once when the bridge is
// built and torn down once with it. It reaches the bridge only through its
// `PluginContext`, which holds a non-owning handle: a plugin outliving the
// bridge finds it gone instead of keeping it alive.

use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;

use tether_core::config::InstanceDescriptor;
use tether_core::error::{BridgeError, Result};

use crate::bridge::BridgeShared;
use crate::registry::MethodDescriptor;

/// A native plugin exposed to the web layer.
pub trait Plugin: Send + Sync + 'static {
    /// Name the web layer addresses the plugin by.
    fn name(&self) -> &str;

    /// Bridged methods. Called once, before `load`.
    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor>;

    /// One-time setup after registration. An error aborts the bridge build.
    fn load(&self, _context: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called once at bridge teardown, after every
    /// outstanding call has been cancelled.
    fn teardown(&self) {}
}

/// A plugin's view of the bridge it is loaded into.
#[derive(Clone)]
pub struct PluginContext {
    plugin_name: String,
    descriptor: Arc<InstanceDescriptor>,
    bridge: Weak<BridgeShared>,
}

impl PluginContext {
    pub(crate) fn new(
        plugin_name: &str,
        descriptor: Arc<InstanceDescriptor>,
        bridge: Weak<BridgeShared>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.to_owned(),
            descriptor,
            bridge,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn descriptor(&self) -> &InstanceDescriptor {
        &self.descriptor
    }

    /// This plugin's section of the app descriptor, if any.
    pub fn config(&self) -> Option<&Value> {
        self.descriptor.plugin_config(&self.plugin_name)
    }

    /// Decode this plugin's config section. A missing section yields the
    /// default; a malformed one is a `Config` error.
    pub fn decode_config<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self.config() {
            None => Ok(T::default()),
            Some(section) => serde_json::from_value(section.clone()).map_err(|e| {
                BridgeError::Config(format!("plugins.{}: {e}", self.plugin_name))
            }),
        }
    }

    fn bridge(&self, event_name: &str) -> Result<Arc<BridgeShared>> {
        self.bridge
            .upgrade()
            .filter(|shared| !shared.is_torn_down())
            .ok_or_else(|| {
                BridgeError::Cancelled(format!("{}.{event_name}", self.plugin_name))
            })
    }

    /// Push an event to this plugin's listeners. Returns how many were
    /// called, or `Cancelled` once the bridge is gone.
    pub fn notify_listeners(&self, event_name: &str, payload: Value) -> Result<usize> {
        self.bridge(event_name)?
            .events()
            .notify(&self.plugin_name, event_name, &payload)
    }

    /// Push an event, keeping it for the first listener if nobody listens yet.
    pub fn notify_retained(&self, event_name: &str, payload: Value) -> Result<usize> {
        self.bridge(event_name)?
            .events()
            .notify_retained(&self.plugin_name, event_name, payload)
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.bridge(event_name)
            .ok()
            .and_then(|shared| {
                shared
                    .events()
                    .registry(&self.plugin_name)
                    .ok()
                    .map(|r| r.has_listeners(event_name))
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_name", &self.plugin_name)
            .field("bridge_alive", &(self.bridge.strong_count() > 0))
            .finish()
    }
}
