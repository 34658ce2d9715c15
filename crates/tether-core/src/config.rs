// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration and the opaque app instance descriptor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Runtime settings for a bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound on background worker threads.
    pub background_workers: usize,
    /// Name given to the primary-context thread.
    pub primary_thread_name: String,
    /// How many finished calls are remembered for `call_state` lookups.
    pub finished_call_history: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            background_workers: 4,
            primary_thread_name: "tether-primary".into(),
            finished_call_history: 256,
        }
    }
}

/// Server section of the app descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerDescriptor {
    /// Remote URL the web view loads instead of bundled assets.
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// App identity and per-plugin settings handed to the bridge at startup.
///
/// The bridge does not interpret any of this. Plugins read their own section
/// from `plugins`; everything unknown is kept in `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceDescriptor {
    pub app_id: String,
    pub app_name: String,
    pub web_dir: String,
    pub server: ServerDescriptor,
    pub plugins: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InstanceDescriptor {
    /// Config section for one plugin (keyed by the plugin's bridge name).
    pub fn plugin_config(&self, plugin_name: &str) -> Option<&Value> {
        self.plugins.get(plugin_name)
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server.url.as_deref()
    }
}
