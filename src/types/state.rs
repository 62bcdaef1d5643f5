//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the managed connection.
///
/// `Idle → Connecting → Open → Closed → Connecting → ...`. `Disconnected`
/// is only entered through an explicit `disconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, never connected
    #[default]
    Idle,

    /// Transport handshake in progress
    Connecting,

    /// Registered and exchanging messages
    Open,

    /// Transport gone; a reconnect attempt is scheduled
    Closed,

    /// Explicitly torn down; no reconnect will be attempted
    Disconnected,
}

impl ConnectionState {
    /// Whether a transport is live or being established.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Whether outbound messages can be sent.
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
