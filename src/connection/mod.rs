//! Connection lifecycle for the camera channel
//!
//! [`ConnectionManager`] owns the transport link and drives the
//! `Idle -> Connecting -> Open -> Closed -> Connecting ...` cycle, with
//! `Disconnected` as the resting state after an explicit `disconnect()`.

mod manager;

pub use manager::ConnectionManager;
