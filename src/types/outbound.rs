//! Outbound JSON messages

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Value carried by a camera command.
///
/// Integers and floats are kept apart so `5` goes over the wire as `5`,
/// not `5.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for CommandValue {
    fn from(value: i64) -> Self {
        CommandValue::Integer(value)
    }
}

impl From<i32> for CommandValue {
    fn from(value: i32) -> Self {
        CommandValue::Integer(value.into())
    }
}

impl From<u32> for CommandValue {
    fn from(value: u32) -> Self {
        CommandValue::Integer(value.into())
    }
}

impl From<f64> for CommandValue {
    fn from(value: f64) -> Self {
        CommandValue::Float(value)
    }
}

impl From<&str> for CommandValue {
    fn from(value: &str) -> Self {
        CommandValue::Text(value.to_string())
    }
}

impl From<String> for CommandValue {
    fn from(value: String) -> Self {
        CommandValue::Text(value)
    }
}

/// A camera control command issued by a UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub value: CommandValue,
    /// Epoch milliseconds at which the command was issued
    pub issued_at: u64,
}

impl Command {
    /// Create a command stamped with the current time
    pub fn new(name: impl Into<String>, value: impl Into<CommandValue>) -> Self {
        Self { name: name.into(), value: value.into(), issued_at: epoch_millis() }
    }

    /// Restart the camera
    pub fn reboot() -> Self {
        Self::new("reboot", 1)
    }

    /// Reset the image sensor
    pub fn sensor_reset() -> Self {
        Self::new("sensor_reset", "")
    }
}

/// Messages written by the client to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Sent once per successful open, identifying the client role
    Register { device: String, timestamp: u64 },

    Command { cmd: String, val: CommandValue, timestamp: u64 },

    /// Ask the server for an immediate `server_stats` reply
    RequestStats,
}

impl OutboundMessage {
    pub fn register(device: impl Into<String>) -> Self {
        OutboundMessage::Register { device: device.into(), timestamp: epoch_millis() }
    }

    /// Serialize to the JSON text sent on the wire
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Command> for OutboundMessage {
    fn from(command: Command) -> Self {
        OutboundMessage::Command { cmd: command.name, val: command.value, timestamp: command.issued_at }
    }
}
