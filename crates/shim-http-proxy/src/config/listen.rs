//! Listen and metrics configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Interface to bind (default: 127.0.0.1, the proxy is a dev tool)
    #[serde(default = "default_listen_host")]
    pub host: String,
    /// Port to bind; 0 asks the OS for an ephemeral port
    #[serde(default = "default_listen_port")]
    pub port: u16,
    /// How long `stop()` waits for in-flight connections before closing them
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    7171
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path served on the proxy listener, outside of every route prefix
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_path() -> String {
    "/__shim/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}
