// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Method registry: (plugin name, method name) -> descriptor.
//
// Filled while plugins load, then frozen behind an `Arc` for the lifetime of
// the bridge. Lookups never take a lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use tether_core::error::{BridgeError, Result};
use tether_core::types::{ExecutionContext, ResultMode};

use crate::call::PluginCall;

/// Native entry point for one bridged method.
///
/// The handler owns the call: it must eventually emit a terminal result on
/// the call's channel, or return `Err` and let the dispatcher do it.
pub type Handler = Arc<dyn Fn(PluginCall) -> Result<()> + Send + Sync>;

/// Everything the dispatcher needs to route a call.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    context: ExecutionContext,
    mode: ResultMode,
    handler: Handler,
}

impl MethodDescriptor {
    /// Single-result method.
    pub fn new<F>(name: impl Into<String>, context: ExecutionContext, handler: F) -> Self
    where
        F: Fn(PluginCall) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            context,
            mode: ResultMode::Single,
            handler: Arc::new(handler),
        }
    }

    /// Streaming method: partial results are allowed before the terminal one.
    pub fn streaming<F>(name: impl Into<String>, context: ExecutionContext, handler: F) -> Self
    where
        F: Fn(PluginCall) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            mode: ResultMode::Stream,
            ..Self::new(name, context, handler)
        }
    }

    /// Single-result method backed by a plugin method.
    pub fn bind<P>(
        name: impl Into<String>,
        context: ExecutionContext,
        plugin: &Arc<P>,
        method: fn(&P, PluginCall) -> Result<()>,
    ) -> Self
    where
        P: Send + Sync + 'static,
    {
        let plugin = Arc::clone(plugin);
        Self::new(name, context, move |call| method(&plugin, call))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn mode(&self) -> ResultMode {
        self.mode
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub(crate) fn invoke(&self, call: PluginCall) -> Result<()> {
        (self.handler)(call)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Lookup table of every bridged method.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    plugins: HashMap<String, HashMap<String, MethodDescriptor>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one method under `plugin_name`.
    ///
    /// A second registration of the same (plugin, method) pair fails with
    /// `DuplicateMethod` and leaves the first one in place.
    pub fn register(&mut self, plugin_name: &str, descriptor: MethodDescriptor) -> Result<()> {
        let methods = self.plugins.entry(plugin_name.to_owned()).or_default();
        if methods.contains_key(descriptor.name()) {
            return Err(BridgeError::DuplicateMethod {
                plugin: plugin_name.to_owned(),
                method: descriptor.name().to_owned(),
            });
        }
        debug!(
            plugin = plugin_name,
            method = descriptor.name(),
            context = %descriptor.context(),
            "method registered"
        );
        methods.insert(descriptor.name().to_owned(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, plugin_name: &str, method_name: &str) -> Option<&MethodDescriptor> {
        self.plugins.get(plugin_name)?.get(method_name)
    }

    pub fn has_plugin(&self, plugin_name: &str) -> bool {
        self.plugins.contains_key(plugin_name)
    }

    /// Registered plugin names, sorted.
    pub fn plugins(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Method names of one plugin, sorted. Empty for an unknown plugin.
    pub fn methods(&self, plugin_name: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .plugins
            .get(plugin_name)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Total number of registered methods.
    pub fn len(&self) -> usize {
        self.plugins.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
