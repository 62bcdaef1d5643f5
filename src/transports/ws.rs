//! WebSocket transport over tokio-tungstenite

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::transport::{Connector, Link};
use crate::types::Inbound;
use crate::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `ws://` endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    type Link = WsLink;

    async fn connect(&self, url: &str) -> Result<WsLink> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ClientError::connection_failed_with_source(url, Box::new(e)))?;

        debug!("WebSocket handshake with {} completed ({})", url, response.status());
        Ok(WsLink { stream })
    }
}

/// An open WebSocket
pub struct WsLink {
    stream: WsStream,
}

#[async_trait::async_trait]
impl Link for WsLink {
    async fn recv(&mut self) -> Result<Option<Inbound>> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(ClientError::transport("receive", e)),
            };

            match message {
                Message::Binary(data) => return Ok(Some(Inbound::Binary(data.to_vec()))),
                Message::Text(text) => return Ok(Some(Inbound::Text(text.to_string()))),
                Message::Close(frame) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return Ok(None);
                }
                // Pongs are queued by tungstenite and flushed on the next read
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("Skipping WebSocket control frame");
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await.map_err(|e| ClientError::transport("send", e))
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(ClientError::transport("close", e)),
        }
    }
}
