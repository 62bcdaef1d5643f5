//! Core types for the camera connection client.
//!
//! ## Architecture
//!
//! - [`ConnectionState`] is the lifecycle of the single managed channel
//! - [`Inbound`] is a raw transport message before classification
//! - [`ControlMessage`] is a decoded JSON control message, exhaustively classified
//! - [`Frame`] is a binary JPEG payload with zero-copy shared data
//! - [`OutboundMessage`] and [`Command`] are what the client writes to the channel
//!
//! ## Usage Example
//!
//! ```rust
//! use camlink::types::{ControlMessage, OutboundMessage, Command};
//!
//! let msg = ControlMessage::decode(r#"{"type":"status","camera_connected":true}"#).unwrap();
//! assert_eq!(msg.kind(), "status");
//!
//! let wire = OutboundMessage::from(Command::new("fps", 15)).to_json().unwrap();
//! assert!(wire.contains(r#""cmd":"fps""#));
//! ```

mod control;
mod frame;
mod inbound;
mod outbound;
mod state;

pub use control::*;
pub use frame::Frame;
pub use inbound::Inbound;
pub use outbound::*;
pub use state::ConnectionState;
