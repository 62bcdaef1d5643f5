//! End-to-end tests against a local WebSocket server
//!
//! A tokio-tungstenite server on 127.0.0.1 plays the camera relay, so the
//! real [`WsConnector`] handshake and message framing are exercised.

use camlink::types::{Command, ConnectionState};
use camlink::{ClientConfig, ConnectionManager, Event, EventName, WsConnector};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accept every connection and hand the upgraded socket to the test
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(socket) = accept_async(stream).await {
                let _ = tx.send(socket);
            }
        }
    });

    (format!("ws://{addr}/ws"), rx)
}

async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<ServerSocket>) -> ServerSocket {
    timeout(WAIT, sockets.recv()).await.expect("client never connected").expect("server stopped")
}

async fn next_json(socket: &mut ServerSocket) -> serde_json::Value {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("client sent nothing")
            .expect("socket closed")
            .expect("socket failed");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("client sent invalid JSON");
        }
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn manager(url: &str) -> ConnectionManager<WsConnector> {
    let config = ClientConfig::new(url).with_device("kiosk").with_reconnect_delay(Duration::from_millis(200));
    ConnectionManager::new(config, WsConnector::new()).expect("valid config")
}

#[tokio::test]
async fn registers_and_demultiplexes_traffic() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, mut sockets) = spawn_server().await;
    let manager = manager(&url);

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&statuses);
    manager.on(EventName::Status, move |event| {
        if let Event::Status(report) = event {
            recorder.lock().unwrap().push(report.camera_connected);
        }
        Ok(())
    });

    manager.connect();
    let mut server = next_socket(&mut sockets).await;

    let register = next_json(&mut server).await;
    assert_eq!(register["type"], "register");
    assert_eq!(register["device"], "kiosk");

    server.send(Message::text(r#"{"type":"status","camera_connected":true}"#.to_string())).await.unwrap();
    server.send(Message::binary(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00])).await.unwrap();

    eventually(|| manager.sink().current().is_some()).await;
    eventually(|| !statuses.lock().unwrap().is_empty()).await;

    let frame = manager.sink().current().unwrap();
    assert!(frame.frame().is_jpeg());
    assert_eq!(frame.frame().len(), 5);
    assert_eq!(*statuses.lock().unwrap(), vec![Some(true)]);
    assert!(manager.is_camera_connected());

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn commands_reach_the_server() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, mut sockets) = spawn_server().await;
    let manager = manager(&url);

    manager.connect();
    let mut server = next_socket(&mut sockets).await;
    timeout(WAIT, manager.wait_for_state(ConnectionState::Open)).await.unwrap();

    assert!(manager.send(Command::new("quality", 10)));
    assert!(manager.request_stats());

    assert_eq!(next_json(&mut server).await["type"], "register");
    let command = next_json(&mut server).await;
    assert_eq!(command["type"], "command");
    assert_eq!(command["cmd"], "quality");
    assert_eq!(command["val"], 10);
    assert_eq!(next_json(&mut server).await["type"], "request_stats");

    manager.disconnect().await;
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, mut sockets) = spawn_server().await;
    let manager = manager(&url);

    manager.connect();
    let mut first = next_socket(&mut sockets).await;
    assert_eq!(next_json(&mut first).await["type"], "register");
    first.close(None).await.unwrap();

    let mut second = next_socket(&mut sockets).await;
    assert_eq!(next_json(&mut second).await["type"], "register");
    timeout(WAIT, manager.wait_for_state(ConnectionState::Open)).await.unwrap();
    assert_eq!(manager.connect_attempts(), 2);

    manager.disconnect().await;
}

#[tokio::test]
async fn unreachable_endpoint_keeps_retrying() {
    let _ = tracing_subscriber::fmt::try_init();
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let manager = manager(&format!("ws://127.0.0.1:{port}/ws"));

    manager.connect();
    eventually(|| manager.connect_attempts() >= 2).await;
    assert_ne!(manager.state(), ConnectionState::Open);
    assert!(manager.pending_reconnects() <= 1);

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
