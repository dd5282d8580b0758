//! Host application overrides
//!
//! Jupyter reads `jupyter_server_config.json` at boot: a JSON object keyed by
//! configurable class name (`ServerApp`, `LabApp`, ...) whose members are trait
//! values. [`HostConfig`] holds the overrides this layer ships and renders
//! them, together with the server proxy registrations, into that document.

use crate::server_proxy::ServerProxyEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// File name Jupyter looks for in its config directories
pub const HOST_CONFIG_FILE: &str = "jupyter_server_config.json";

/// Host log verbosity, using the names the host's logging module accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// Overrides applied to the host at startup.
///
/// # Security Warning
///
/// The shipped values are intended for throwaway hosted sandboxes: hidden
/// files are served and, with `allow_remote_access`, the host header check
/// is disabled. Do not reuse them for a server reachable by untrusted users.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// `ServerApp.log_level`
    #[serde(default)]
    pub log_level: LogLevel,

    /// `LabApp.dev_mode`
    #[serde(default = "default_true")]
    pub dev_mode: bool,

    /// `LabApp.extensions_in_dev_mode`
    #[serde(default = "default_true")]
    pub extensions_in_dev_mode: bool,

    /// `LabApp.skip_dev_build`
    #[serde(default = "default_true")]
    pub skip_dev_build: bool,

    /// `ContentsManager.allow_hidden`
    #[serde(default = "default_true")]
    pub allow_hidden: bool,

    /// `ServerApp.allow_remote_access` (disables host header validation)
    #[serde(default = "default_true")]
    pub allow_remote_access: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            dev_mode: true,
            extensions_in_dev_mode: true,
            skip_dev_build: true,
            allow_hidden: true,
            allow_remote_access: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl HostConfig {
    /// Render the host configuration document.
    ///
    /// `servers` becomes `ServerProxy.servers`; the section is omitted when
    /// there are no supervised servers.
    pub fn to_document(&self, servers: &BTreeMap<String, ServerProxyEntry>) -> Value {
        let mut doc = Map::new();
        doc.insert(
            "ServerApp".to_string(),
            json!({
                "log_level": self.log_level,
                "allow_remote_access": self.allow_remote_access,
            }),
        );
        doc.insert(
            "LabApp".to_string(),
            json!({
                "dev_mode": self.dev_mode,
                "extensions_in_dev_mode": self.extensions_in_dev_mode,
                "skip_dev_build": self.skip_dev_build,
            }),
        );
        doc.insert(
            "ContentsManager".to_string(),
            json!({ "allow_hidden": self.allow_hidden }),
        );
        if !servers.is_empty() {
            doc.insert("ServerProxy".to_string(), json!({ "servers": servers }));
        }

        Value::Object(doc)
    }
}
