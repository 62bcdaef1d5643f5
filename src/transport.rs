//! Transport traits for the camera channel

use crate::Result;
use crate::types::Inbound;

/// Opens links to the camera endpoint.
///
/// A connector is reused for every (re)connect attempt. Implementations
/// handle their own handshake; the manager bounds it with the configured
/// connect timeout.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Established channel type
    type Link: Link;

    /// Perform the handshake with `url`
    async fn connect(&self, url: &str) -> Result<Self::Link>;
}

/// One established bidirectional channel.
///
/// The link is owned exclusively by the connection manager; nothing else
/// closes it.
#[async_trait::async_trait]
pub trait Link: Send + 'static {
    /// Wait for the next inbound message
    ///
    /// Returns:
    /// - `Ok(Some(message))` - Binary or text message received
    /// - `Ok(None)` - Channel closed (locally or by the peer)
    /// - `Err(e)` - Channel failed
    ///
    /// Must be cancel-safe: the manager drops this future whenever an
    /// outbound write or a cancellation wins the race.
    async fn recv(&mut self) -> Result<Option<Inbound>>;

    /// Write one text message
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the channel; closing an already closed link is not an error
    async fn close(&mut self) -> Result<()>;
}
