//! Scripted in-process transport for tests and benchmarks
//!
//! [`MockConnector`] plays the camera server. Each accepted connection hands
//! the test a [`MockServer`] that can push text and binary messages, close
//! the link or fail it, and records everything the client wrote.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::transport::{Connector, Link};
use crate::types::Inbound;
use crate::{ClientError, Result};

/// What the next connect attempt does
#[derive(Debug, Clone)]
enum Plan {
    Accept,
    Refuse(String),
    /// Never completes; only a timeout or cancellation ends the attempt
    Hang,
}

#[derive(Debug)]
enum ServerEvent {
    Message(Inbound),
    Close,
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    plan: Mutex<VecDeque<Plan>>,
    servers: Mutex<Vec<MockServer>>,
    attempts: AtomicUsize,
    live_links: AtomicUsize,
    max_live_links: AtomicUsize,
}

/// Connector whose attempts succeed unless scripted otherwise
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` attempts with an immediate error
    pub fn refuse_next(&self, count: usize) {
        let mut plan = self.state.plan.lock().unwrap();
        for _ in 0..count {
            plan.push_back(Plan::Refuse("connection refused".to_string()));
        }
    }

    /// Make the next attempt hang until it is timed out or cancelled
    pub fn hang_next(&self) {
        self.state.plan.lock().unwrap().push_back(Plan::Hang);
    }

    /// Connect attempts seen so far, including refused ones
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::Acquire)
    }

    /// Links currently alive on the client side
    pub fn live_links(&self) -> usize {
        self.state.live_links.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously alive links ever observed
    pub fn max_live_links(&self) -> usize {
        self.state.max_live_links.load(Ordering::Acquire)
    }

    /// Accepted connections so far
    pub fn accepted(&self) -> usize {
        self.state.servers.lock().unwrap().len()
    }

    /// Server side of the `index`-th accepted connection
    pub fn server(&self, index: usize) -> MockServer {
        self.state.servers.lock().unwrap()[index].clone()
    }

    /// Server side of the most recently accepted connection
    pub fn latest_server(&self) -> MockServer {
        self.state.servers.lock().unwrap().last().cloned().expect("no connection accepted yet")
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Link = MockLink;

    async fn connect(&self, url: &str) -> Result<MockLink> {
        self.state.attempts.fetch_add(1, Ordering::AcqRel);
        let plan = self.state.plan.lock().unwrap().pop_front().unwrap_or(Plan::Accept);

        match plan {
            Plan::Accept => {}
            Plan::Refuse(reason) => return Err(ClientError::connection_failed(format!("{url}: {reason}"))),
            Plan::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let side = Arc::new(ServerSide {
            tx,
            received: Mutex::new(Vec::new()),
            closed_by_client: AtomicBool::new(false),
            stall_close: AtomicBool::new(false),
        });
        self.state.servers.lock().unwrap().push(MockServer { side: Arc::clone(&side) });

        let live = self.state.live_links.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.max_live_links.fetch_max(live, Ordering::AcqRel);

        Ok(MockLink { events: rx, side, state: Arc::clone(&self.state), closed: false })
    }
}

#[derive(Debug)]
struct ServerSide {
    tx: mpsc::UnboundedSender<ServerEvent>,
    received: Mutex<Vec<String>>,
    closed_by_client: AtomicBool,
    stall_close: AtomicBool,
}

/// Test handle on the server end of one connection
#[derive(Debug, Clone)]
pub struct MockServer {
    side: Arc<ServerSide>,
}

impl MockServer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.side.tx.send(ServerEvent::Message(Inbound::Text(text.into())));
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        let _ = self.side.tx.send(ServerEvent::Message(Inbound::Binary(data.into())));
    }

    /// Close the connection from the server side
    pub fn close(&self) {
        let _ = self.side.tx.send(ServerEvent::Close);
    }

    /// Fail the connection with a transport error
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.side.tx.send(ServerEvent::Fail(reason.into()));
    }

    /// Never complete the client's close handshake on this connection
    pub fn stall_close(&self) {
        self.side.stall_close.store(true, Ordering::Release);
    }

    /// Text messages the client wrote, in order
    pub fn received(&self) -> Vec<String> {
        self.side.received.lock().unwrap().clone()
    }

    /// Client messages parsed as JSON
    pub fn received_json(&self) -> Vec<serde_json::Value> {
        self.received().iter().map(|text| serde_json::from_str(text).expect("client sent invalid JSON")).collect()
    }

    /// Whether the client closed this connection
    pub fn is_closed_by_client(&self) -> bool {
        self.side.closed_by_client.load(Ordering::Acquire)
    }
}

/// Client end of a mock connection
#[derive(Debug)]
pub struct MockLink {
    events: mpsc::UnboundedReceiver<ServerEvent>,
    side: Arc<ServerSide>,
    state: Arc<MockState>,
    closed: bool,
}

#[async_trait::async_trait]
impl Link for MockLink {
    async fn recv(&mut self) -> Result<Option<Inbound>> {
        if self.closed {
            return Ok(None);
        }

        match self.events.recv().await {
            Some(ServerEvent::Message(message)) => Ok(Some(message)),
            Some(ServerEvent::Close) | None => {
                self.closed = true;
                Ok(None)
            }
            Some(ServerEvent::Fail(reason)) => {
                self.closed = true;
                Err(ClientError::transport("recv", std::io::Error::other(reason)))
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(ClientError::transport_closed("send"));
        }
        self.side.received.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.side.closed_by_client.store(true, Ordering::Release);
        if self.side.stall_close.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.state.live_links.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_refusals_then_accept() {
        let connector = MockConnector::new();
        connector.refuse_next(2);

        assert!(connector.connect("ws://mock").await.is_err());
        assert!(connector.connect("ws://mock").await.is_err());
        let link = connector.connect("ws://mock").await.unwrap();

        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.accepted(), 1);
        assert_eq!(connector.live_links(), 1);

        drop(link);
        assert_eq!(connector.live_links(), 0);
        assert_eq!(connector.max_live_links(), 1);
    }

    #[tokio::test]
    async fn server_messages_reach_the_link() {
        let connector = MockConnector::new();
        let mut link = connector.connect("ws://mock").await.unwrap();
        let server = connector.latest_server();

        server.send_text("{}");
        server.send_binary(vec![0xFF, 0xD8]);
        server.fail("reset by peer");

        assert_eq!(link.recv().await.unwrap(), Some(Inbound::Text("{}".to_string())));
        assert_eq!(link.recv().await.unwrap(), Some(Inbound::Binary(vec![0xFF, 0xD8])));
        assert!(link.recv().await.is_err());
        assert_eq!(link.recv().await.unwrap(), None);
        assert!(link.send_text("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn client_writes_are_recorded() {
        let connector = MockConnector::new();
        let mut link = connector.connect("ws://mock").await.unwrap();

        link.send_text(r#"{"type":"request_stats"}"#.to_string()).await.unwrap();
        link.close().await.unwrap();

        let server = connector.server(0);
        assert_eq!(server.received_json()[0]["type"], "request_stats");
        assert!(server.is_closed_by_client());
    }
}
