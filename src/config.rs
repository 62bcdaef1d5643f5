//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ClientError, Result};

/// Settings for a [`ConnectionManager`](crate::ConnectionManager).
///
/// Durations are stored in milliseconds so the struct round-trips through
/// YAML or JSON unchanged.
///
/// ```rust
/// use camlink::ClientConfig;
///
/// let config = ClientConfig::from_yaml(
///     "url: ws://192.168.1.20:8765/ws\nreconnect_delay_ms: 5000\n",
/// )
/// .unwrap();
/// assert_eq!(config.reconnect_delay().as_secs(), 5);
/// assert_eq!(config.device, "browser");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub url: String,

    /// Role announced in the register message
    pub device: String,

    /// Delay before a reconnect attempt after the channel closes
    pub reconnect_delay_ms: u64,

    /// Window over which the frame rate is computed
    pub rate_window_ms: u64,

    /// Upper bound on a single transport handshake
    pub connect_timeout_ms: u64,

    /// Release the displayed frame when the channel closes
    pub clear_frames_on_disconnect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/ws".to_string(),
            device: "browser".to_string(),
            reconnect_delay_ms: 3000,
            rate_window_ms: 1000,
            connect_timeout_ms: 10_000,
            clear_frames_on_disconnect: true,
        }
    }
}

impl ClientConfig {
    /// Default settings for the given endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ClientError::config("<document>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_clear_frames_on_disconnect(mut self, clear: bool) -> Self {
        self.clear_frames_on_disconnect = clear;
        self
    }

    /// Check the endpoint scheme and that every duration is non-zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::config("url", format!("expected ws:// or wss://, got '{}'", self.url)));
        }
        if self.device.is_empty() {
            return Err(ClientError::config("device", "must not be empty"));
        }

        for (field, value) in [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("rate_window_ms", self.rate_window_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(ClientError::config(field, "must be greater than zero"));
            }
        }

        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
