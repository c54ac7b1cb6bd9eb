/// Configuration management for the Nodeloop engine
///
/// Handles server binding and runtime parameters such as the tick cadence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Engine configuration
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Engine runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler tick period in milliseconds (default: 10, minimum: 1)
    ///
    /// Independent of any node's own interval; it only sets the resolution
    /// at which time-based nodes are evaluated.
    pub tick_interval_ms: u64,
    /// Panel the editor shows when a request names none
    pub main_panel_id: String,
}

impl EngineConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("NODELOOP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("NODELOOP_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            engine: EngineConfig {
                tick_interval_ms: std::env::var("NODELOOP_TICK_MS")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(10),
                main_panel_id: std::env::var("NODELOOP_MAIN_PANEL")
                    .unwrap_or_else(|_| crate::graph::MAIN_PANEL_ID.to_string()),
            },
        }
    }
}
