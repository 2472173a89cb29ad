use crate::monitor_paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `api_base_url` after the file is read.
pub const API_URL_ENV: &str = "SHIFT_MONITOR_API_URL";
/// Overrides `feed_url` after the file is read.
pub const FEED_URL_ENV: &str = "SHIFT_MONITOR_FEED_URL";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    /// Base of `token/`, `token/refresh/` and every business endpoint.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Push channel carrying the live shift envelopes.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    /// How long the reload flag stays raised after a shift completes.
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// Backoff used by `watch` when the live feed drops.
/// All fields have defaults so a partial `reconnect:` block is valid.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReconnectPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000/api/".to_string()
}

fn default_feed_url() -> String {
    "ws://127.0.0.1:8000/ws/shift/".to_string()
}

fn default_reload_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            feed_url: default_feed_url(),
            reload_delay_ms: default_reload_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads the configuration from `path`, or `~/.shift-monitor/config.yaml`
    /// when no path is given. A missing default file yields the defaults; an
    /// explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = monitor_paths::config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: MonitorConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(FEED_URL_ENV) {
            if !url.trim().is_empty() {
                self.feed_url = url.trim().to_string();
            }
        }
    }

    /// Relative endpoint paths are joined onto the base, so it must end in `/`.
    fn normalize(&mut self) {
        if !self.api_base_url.ends_with('/') {
            self.api_base_url.push('/');
        }
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
