//! Client-side connection manager for single-endpoint camera streams.
//!
//! Camlink keeps one WebSocket to a camera relay server open, registers the
//! client on every (re)connect and splits the inbound traffic in two: JSON
//! control messages go to an [`EventBus`], binary JPEG frames go to a
//! [`FrameSink`] and a [`RateCounter`].
//!
//! # Features
//!
//! - **Self-healing channel**: a fixed-delay reconnect loop that never stacks attempts
//! - **Typed control plane**: `status`, `camera_health` and `server_stats` payloads
//! - **Bounded frame memory**: exactly one live frame handle at any time
//! - **Pluggable transport**: [`Connector`]/[`Link`] traits with a tokio-tungstenite default
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use camlink::{Camlink, ClientConfig, Event, EventName};
//! use camlink::types::Command;
//!
//! #[tokio::main]
//! async fn main() -> camlink::Result<()> {
//!     let manager = Camlink::connect(ClientConfig::new("ws://camera.local:8765/ws"))?;
//!
//!     manager.on(EventName::Status, |event| {
//!         if let Event::Status(report) = event {
//!             println!("camera connected: {:?}", report.camera_connected);
//!         }
//!         Ok(())
//!     });
//!
//!     manager.wait_for_state(camlink::types::ConnectionState::Open).await;
//!     manager.send(Command::new("quality", 12));
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Configuration
pub mod config;

// Inbound fan-out
pub mod bus;
pub mod rate;
pub mod sink;

// Channel management
pub mod connection;
pub mod transport;
pub mod transports;

// Core exports
pub use error::*;
pub use types::*;

pub use bus::{Connectivity, DispatchReport, Event, EventBus, EventName, HandlerResult};
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use rate::RateCounter;
pub use sink::{FrameHandle, FrameSink, FrameStore, MemoryFrameStore};
pub use transport::{Connector, Link};
pub use transports::ws::{WsConnector, WsLink};

/// Unified entry point for camera connections.
///
/// # Examples
///
/// ```rust,no_run
/// use camlink::{Camlink, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> camlink::Result<()> {
///     let manager = Camlink::connect(ClientConfig::default())?;
///     // Use manager...
///     manager.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct Camlink;

impl Camlink {
    /// Build a WebSocket-backed manager and start connecting.
    ///
    /// Returns immediately; the handshake, registration and any reconnects
    /// happen in the background. Observe progress through
    /// [`ConnectionManager::state_updates`] or the `Connectivity` event.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URL is not `ws://` or `wss://`
    /// - The device name is empty
    /// - A configured delay, window or timeout is zero
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: ClientConfig) -> Result<ConnectionManager<WsConnector>> {
        let manager = ConnectionManager::new(config, WsConnector::new())?;
        manager.connect();
        Ok(manager)
    }

    /// Load a YAML configuration and connect with it.
    ///
    /// ```rust,no_run
    /// # #[tokio::main]
    /// # async fn main() -> camlink::Result<()> {
    /// let manager = camlink::Camlink::connect_with_yaml("url: ws://10.0.0.5:8765/ws\ndevice: kiosk\n")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect_with_yaml(yaml: &str) -> Result<ConnectionManager<WsConnector>> {
        Self::connect(ClientConfig::from_yaml(yaml)?)
    }
}
