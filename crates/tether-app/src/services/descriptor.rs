// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// App descriptor loading.
//
// The descriptor is the app's `capacitor.config.json`-shaped file. Bridge
// runtime settings may ride along under a top-level `tether` key.

use std::path::{Path, PathBuf};

use tracing::info;

use tether_core::config::{BridgeConfig, InstanceDescriptor};
use tether_core::error::{BridgeError, Result};

/// Environment variable naming the descriptor file.
pub const CONFIG_ENV: &str = "TETHER_CONFIG";

/// Key under which bridge settings live in the descriptor.
const BRIDGE_KEY: &str = "tether";

/// Pick the descriptor path: command-line argument first, then environment.
pub fn descriptor_path(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
    arg.or(env)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Load the descriptor from `path`, or defaults when no path is given.
///
/// A named file that is missing or malformed is an error.
pub fn load_descriptor(path: Option<&Path>) -> Result<InstanceDescriptor> {
    let Some(path) = path else {
        info!("no app descriptor given; using defaults");
        return Ok(InstanceDescriptor::default());
    };
    let data = std::fs::read_to_string(path)?;
    let descriptor: InstanceDescriptor = serde_json::from_str(&data)
        .map_err(|e| BridgeError::Config(format!("{}: {e}", path.display())))?;
    info!(
        path = %path.display(),
        app_id = %descriptor.app_id,
        plugins = descriptor.plugins.len(),
        "app descriptor loaded"
    );
    Ok(descriptor)
}

/// Bridge settings from the descriptor's `tether` section, or defaults.
pub fn bridge_config(descriptor: &InstanceDescriptor) -> Result<BridgeConfig> {
    match descriptor.extra.get(BRIDGE_KEY) {
        None => Ok(BridgeConfig::default()),
        Some(section) => serde_json::from_value(section.clone())
            .map_err(|e| BridgeError::Config(format!("{BRIDGE_KEY}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn argument_wins_over_environment() {
        assert_eq!(
            descriptor_path(Some("a.json".into()), Some("b.json".into())),
            Some(PathBuf::from("a.json"))
        );
        assert_eq!(
            descriptor_path(None, Some("b.json".into())),
            Some(PathBuf::from("b.json"))
        );
        assert_eq!(descriptor_path(None, Some("  ".into())), None);
    }

    #[test]
    fn loads_capacitor_style_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "appId": "ai.tether.demo",
                "appName": "Demo",
                "webDir": "dist",
                "server": {{ "url": "http://localhost:5173" }},
                "plugins": {{ "GoogleAuth": {{ "scopes": ["profile", "email"] }} }},
                "tether": {{ "background_workers": 2 }}
            }}"#
        )
        .expect("write");

        let descriptor = load_descriptor(Some(file.path())).expect("load");
        assert_eq!(descriptor.app_id, "ai.tether.demo");
        assert_eq!(descriptor.server_url(), Some("http://localhost:5173"));
        assert!(descriptor.plugin_config("GoogleAuth").is_some());

        let config = bridge_config(&descriptor).expect("config");
        assert_eq!(config.background_workers, 2);
        assert_eq!(config.primary_thread_name, "tether-primary");
    }

    #[test]
    fn no_path_means_defaults() {
        let descriptor = load_descriptor(None).expect("defaults");
        assert!(descriptor.app_id.is_empty());
        assert_eq!(bridge_config(&descriptor).expect("config").background_workers, 4);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_descriptor(Some(&dir.path().join("absent.json"))).expect_err("missing");
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{ not json").expect("write");
        assert!(matches!(
            load_descriptor(Some(file.path())),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn malformed_bridge_section_is_config_error() {
        let descriptor: InstanceDescriptor =
            serde_json::from_str(r#"{ "tether": { "background_workers": "many" } }"#)
                .expect("descriptor");
        assert!(matches!(bridge_config(&descriptor), Err(BridgeError::Config(_))));
    }
}
