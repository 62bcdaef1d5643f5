//! Error types for the camera connection client.
//!
//! Every failure the client can observe maps onto one [`ClientError`] variant.
//! None of them are fatal: transport failures feed the reconnect loop, decode
//! failures drop a single message, and send rejections are reported back to the
//! caller.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the endpoint could not be reached or refused the handshake
//! - **Transport Errors**: an established channel failed while reading or writing
//! - **Decode Errors**: a text message was not a valid control envelope
//! - **Send Rejections**: an outbound command was issued while the channel was not open
//! - **Configuration Errors**: invalid endpoint or timing settings
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use camlink::ClientError;
//!
//! let error = ClientError::connection_failed("camera server unreachable");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::ConnectionState;

/// Result type alias for client operations.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Main error type for client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    #[error("Failed to connect to camera endpoint: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport error during {operation}")]
    Transport {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Channel is not open (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid configuration for '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Handler for '{event}' failed: {details}")]
    Handler { event: String, details: String },
}

impl ClientError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection { .. } => true,
            ClientError::Transport { .. } => true,
            ClientError::Timeout { .. } => true,
            ClientError::NotConnected { .. } => true,
            ClientError::Decode { .. } => false,
            ClientError::Config { .. } => false,
            ClientError::Handler { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ClientError::Connection { .. } => vec![
                "Ensure the camera server is running",
                "Check the WebSocket URL and port",
                "Wait for the automatic reconnect attempt",
            ],
            ClientError::Transport { .. } => vec![
                "Wait for the automatic reconnect attempt",
                "Check network stability between client and server",
            ],
            ClientError::Decode { .. } => vec![
                "Check that server and client agree on the message envelope",
                "Inspect the raw message in debug logs",
            ],
            ClientError::NotConnected { .. } => vec![
                "Wait for the connection to reopen before sending",
                "Check connectivity with is_connected() first",
            ],
            ClientError::Timeout { .. } => vec![
                "Increase the connect timeout",
                "Verify the server is responding",
            ],
            ClientError::Config { .. } => vec![
                "Use a ws:// or wss:// URL",
                "Use non-zero durations for delays and windows",
            ],
            ClientError::Handler { .. } => vec![
                "Check the subscriber for unexpected payload shapes",
                "Return errors instead of panicking inside handlers",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        ClientError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ClientError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for transport errors.
    pub fn transport(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClientError::Transport { operation: operation.into(), source: Some(Box::new(source)) }
    }

    /// Helper constructor for transport errors without an underlying cause.
    pub fn transport_closed(operation: impl Into<String>) -> Self {
        ClientError::Transport { operation: operation.into(), source: None }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, details: impl Into<String>) -> Self {
        ClientError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClientError::Config { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for subscriber failures.
    pub fn handler(event: impl Into<String>, details: impl Into<String>) -> Self {
        ClientError::Handler { event: event.into(), details: details.into() }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode { context: "control message".to_string(), details: err.to_string() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::transport("websocket", err)
    }
}
