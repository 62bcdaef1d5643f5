//! Connection manager: lifecycle, demultiplexing and reconnect policy

use futures::Stream;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::{Connectivity, Event, EventBus, EventName, HandlerResult};
use crate::config::ClientConfig;
use crate::rate::RateCounter;
use crate::sink::{FrameSink, FrameStore, MemoryFrameStore};
use crate::transport::{Connector, Link};
use crate::types::{
    Command, ConnectionState, ControlMessage, Frame, Inbound, OutboundMessage, epoch_millis,
};
use crate::{ClientError, Result};

/// Upper bound on the close handshake before the link is dropped anyway
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the single channel to the camera endpoint.
///
/// The manager runs one supervisor task per [`connect`](Self::connect). The
/// supervisor owns the transport link and loops through connect, session,
/// close and a fixed reconnect delay until [`disconnect`](Self::disconnect)
/// cancels it. Inbound text is decoded and published on the [`EventBus`];
/// inbound binary goes to the [`FrameSink`] and the [`RateCounter`].
///
/// Construct one manager at the application root and hand out references.
pub struct ConnectionManager<C: Connector, S: FrameStore = MemoryFrameStore> {
    shared: Arc<Shared<C, S>>,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared<C: Connector, S: FrameStore> {
    config: ClientConfig,
    connector: C,
    bus: EventBus,
    sink: FrameSink<S>,
    rate: Arc<RateCounter>,
    state: watch::Sender<ConnectionState>,
    supervisor: Mutex<Option<Supervisor>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    camera_connected: AtomicBool,
    registered_at: AtomicU64,
    frame_sequence: AtomicU64,
    connect_attempts: AtomicU64,
    pending_reconnects: AtomicUsize,
    ticker_started: AtomicBool,
    ticker_cancel: CancellationToken,
}

/// Marks a reconnect delay in progress for as long as it lives
struct PendingReconnect<'a>(&'a AtomicUsize);

impl<'a> PendingReconnect<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for PendingReconnect<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<C: Connector> ConnectionManager<C, MemoryFrameStore> {
    /// Create a manager that keeps frames in memory.
    pub fn new(config: ClientConfig, connector: C) -> Result<Self> {
        Self::with_store(config, connector, MemoryFrameStore::new())
    }
}

impl<C: Connector, S: FrameStore> ConnectionManager<C, S> {
    /// Create a manager with a custom frame store.
    ///
    /// The manager starts `Idle`; nothing is spawned until `connect()`.
    pub fn with_store(config: ClientConfig, connector: C, store: S) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(ConnectionState::Idle);
        let rate = Arc::new(RateCounter::new(config.rate_window()));

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                connector,
                bus: EventBus::new(),
                sink: FrameSink::new(store),
                rate,
                state,
                supervisor: Mutex::new(None),
                outbound: Mutex::new(None),
                camera_connected: AtomicBool::new(false),
                registered_at: AtomicU64::new(0),
                frame_sequence: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
                pending_reconnects: AtomicUsize::new(0),
                ticker_started: AtomicBool::new(false),
                ticker_cancel: CancellationToken::new(),
            }),
        })
    }

    /// Start connecting.
    ///
    /// No-op while `Connecting` or `Open`. From `Closed` the pending
    /// reconnect delay is cancelled and a new attempt starts immediately.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let shared = &self.shared;
        let mut slot = shared.lock_supervisor();

        let state = *shared.state.borrow();
        if state.is_active() {
            debug!("connect() ignored: connection already {}", state);
            return;
        }

        // The replaced supervisor holds no link once Closed; the new one
        // still waits for it to finish before opening its own.
        let previous = slot.take().map(|supervisor| {
            supervisor.cancel.cancel();
            supervisor.handle
        });

        shared.start_ticker();
        shared.set_state(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(shared).supervise(cancel.clone(), previous));
        *slot = Some(Supervisor { cancel, handle });
    }

    /// Close the channel and stop reconnecting.
    ///
    /// Cancels any pending reconnect delay, closes the transport if open and
    /// waits until the link is gone. The manager ends `Disconnected`.
    /// Calling this when nothing is running is a no-op.
    pub async fn disconnect(&self) {
        let supervisor = {
            let mut slot = self.shared.lock_supervisor();
            let Some(supervisor) = slot.take() else {
                debug!("disconnect() ignored: not connected");
                return;
            };

            supervisor.cancel.cancel();
            self.shared.set_state(ConnectionState::Disconnected);
            supervisor
        };

        info!("Disconnecting from {}", self.shared.config.url);
        if let Err(e) = supervisor.handle.await {
            warn!("Connection supervisor ended abnormally: {}", e);
        }
    }

    /// Send a message if the channel is open.
    ///
    /// Returns `false` without sending when the state is not `Open`.
    /// Delivery is best-effort: nothing is queued or acknowledged.
    pub fn send(&self, message: impl Into<OutboundMessage>) -> bool {
        match self.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Send rejected: {}", e);
                false
            }
        }
    }

    /// Like [`send`](Self::send) but reports why a message was rejected.
    pub fn try_send(&self, message: impl Into<OutboundMessage>) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(ClientError::NotConnected { state });
        }

        let text = message.into().to_json()?;
        let sent = match self.shared.lock_outbound().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        };

        if sent { Ok(()) } else { Err(ClientError::NotConnected { state: self.state() }) }
    }

    /// Send a camera command
    pub fn send_command(&self, command: Command) -> bool {
        self.send(command)
    }

    /// Ask the server for a `server_stats` reply
    pub fn request_stats(&self) -> bool {
        self.send(OutboundMessage::RequestStats)
    }

    /// Register a handler on the event bus
    pub fn on<F>(&self, name: EventName, handler: F)
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(name, handler);
    }

    /// Event bus carrying control and connectivity events
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Sink holding the currently displayed frame
    pub fn sink(&self) -> &FrameSink<S> {
        &self.shared.sink
    }

    /// Frame arrival counter behind [`frame_rate`](Self::frame_rate)
    pub fn rate_counter(&self) -> &RateCounter {
        &self.shared.rate
    }

    /// Frames per second over the last completed window
    pub fn frame_rate(&self) -> f64 {
        self.shared.rate.current_rate()
    }

    /// Validated configuration this manager was built with
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Stream of state transitions, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = ConnectionState> + 'static {
        WatchStream::new(self.shared.state.subscribe())
    }

    /// Wait until the manager reaches `target`
    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut updates = self.shared.state.subscribe();
        // The sender lives in `shared`, which outlives this borrow
        let _ = updates.wait_for(|state| *state == target).await;
    }

    /// Whether commands can be sent right now
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Whether the camera itself is believed to be streaming
    pub fn is_camera_connected(&self) -> bool {
        self.shared.camera_connected.load(Ordering::Acquire)
    }

    /// Epoch milliseconds of the last register message, if any was sent
    pub fn last_registered_at(&self) -> Option<u64> {
        match self.shared.registered_at.load(Ordering::Acquire) {
            0 => None,
            at => Some(at),
        }
    }

    /// Reconnect delays currently running (0 or 1)
    pub fn pending_reconnects(&self) -> usize {
        self.shared.pending_reconnects.load(Ordering::Acquire)
    }

    /// Transport handshakes attempted so far
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::Acquire)
    }
}

impl<C: Connector, S: FrameStore> Drop for ConnectionManager<C, S> {
    fn drop(&mut self) {
        debug!("Dropping connection manager");
        if let Some(supervisor) = self.shared.lock_supervisor().take() {
            supervisor.cancel.cancel();
        }
        self.shared.ticker_cancel.cancel();
    }
}

impl<C: Connector, S: FrameStore> std::fmt::Debug for ConnectionManager<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .field("camera_connected", &self.is_camera_connected())
            .field("pending_reconnects", &self.pending_reconnects())
            .finish()
    }
}

impl<C: Connector, S: FrameStore> Shared<C, S> {
    /// Reconnect loop. Runs until `cancel` fires.
    async fn supervise(self: Arc<Self>, cancel: CancellationToken, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout();

        loop {
            if !self.transition(&cancel, ConnectionState::Connecting) {
                break;
            }

            let attempt = self.connect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
            info!("Connecting to {} (attempt {})", url, attempt);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = tokio::time::timeout(timeout, self.connector.connect(&url)) => result,
            };

            match result {
                Ok(Ok(link)) => {
                    if self.run_session(link, &cancel).await.is_cancelled() {
                        break;
                    }
                }
                Ok(Err(e)) => warn!("Connection attempt {} failed: {}", attempt, e),
                Err(_) => {
                    let error = ClientError::Timeout { duration: timeout };
                    warn!("Connection attempt {} failed: {}", attempt, error);
                }
            }

            if !self.transition(&cancel, ConnectionState::Closed) {
                break;
            }

            let delay = self.config.reconnect_delay();
            info!("Reconnecting to {} in {:?}", url, delay);

            let _pending = PendingReconnect::start(&self.pending_reconnects);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Connection supervisor for {} stopped", url);
    }

    /// Register, then pump messages until the link closes or `cancel` fires.
    async fn run_session(&self, mut link: C::Link, cancel: &CancellationToken) -> SessionEnd {
        let registered_at = epoch_millis();
        let register = OutboundMessage::Register { device: self.config.device.clone(), timestamp: registered_at };

        let sent = match register.to_json() {
            Ok(text) => link.send_text(text).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Registration failed: {}", e);
            let _ = link.close().await;
            return SessionEnd::Closed;
        }
        self.registered_at.store(registered_at, Ordering::Release);

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.lock_outbound() = Some(tx);

        if !self.transition(cancel, ConnectionState::Open) {
            self.lock_outbound().take();
            let _ = link.close().await;
            return SessionEnd::Cancelled;
        }

        info!("Connected to {} as '{}'", self.config.url, self.config.device);
        self.bus.publish(&Event::Connectivity(Connectivity::Connected));

        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                Some(text) = rx.recv() => {
                    if let Err(e) = link.send_text(text).await {
                        warn!("Send failed, closing connection: {}", e);
                        break SessionEnd::Closed;
                    }
                }
                inbound = link.recv() => match inbound {
                    Ok(Some(message)) => self.handle_inbound(message),
                    Ok(None) => {
                        info!("Connection to {} closed", self.config.url);
                        break SessionEnd::Closed;
                    }
                    Err(e) => {
                        warn!("Connection to {} failed: {}", self.config.url, e);
                        break SessionEnd::Closed;
                    }
                },
            }
        };

        self.lock_outbound().take();
        // The session is `Closed` as soon as the link ends, before the close handshake
        if !end.is_cancelled() {
            self.transition(cancel, ConnectionState::Closed);
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, link.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error closing link: {}", e),
            Err(_) => debug!("Closing link timed out after {:?}", CLOSE_TIMEOUT),
        }
        drop(link);

        self.session_closed();
        end
    }

    fn handle_inbound(&self, message: Inbound) {
        match message {
            Inbound::Binary(bytes) => self.handle_frame(bytes),
            Inbound::Text(text) => self.handle_control(&text),
        }
    }

    fn handle_frame(&self, bytes: Vec<u8>) {
        let sequence = self.frame_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let frame = Frame::new(bytes, sequence);
        if !frame.is_jpeg() {
            debug!("Frame {} has no JPEG marker ({} bytes)", sequence, frame.len());
        }

        self.sink.publish(frame);
        self.rate.record_arrival();

        if !self.camera_connected.swap(true, Ordering::AcqRel) {
            info!("Camera stream online");
            self.bus.publish(&Event::Connectivity(Connectivity::CameraOnline));
        }
    }

    fn handle_control(&self, text: &str) {
        let message = match ControlMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed control message: {}", e);
                return;
            }
        };

        if let ControlMessage::Status(report) = &message
            && let Some(connected) = report.camera_connected
        {
            self.camera_connected.store(connected, Ordering::Release);
        }

        let kind = message.kind().to_string();
        match Event::from_control(message) {
            Some(event) => {
                self.bus.publish(&event);
            }
            None => debug!("Ignoring control message of unknown kind '{}'", kind),
        }
        trace!("Handled '{}' control message", kind);
    }

    fn session_closed(&self) {
        self.camera_connected.store(false, Ordering::Release);
        if self.config.clear_frames_on_disconnect {
            self.sink.clear();
        }
        self.bus.publish(&Event::Connectivity(Connectivity::Disconnected));
    }

    /// Apply a supervisor-driven transition unless the supervisor was cancelled.
    fn transition(&self, cancel: &CancellationToken, next: ConnectionState) -> bool {
        let _slot = self.lock_supervisor();
        if cancel.is_cancelled() {
            return false;
        }
        self.set_state(next);
        true
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Connection state: {} -> {}", current, next);
            *current = next;
            true
        });
    }

    fn start_ticker(&self) {
        if !self.ticker_started.swap(true, Ordering::AcqRel) {
            Arc::clone(&self.rate).spawn_ticker(self.ticker_cancel.clone());
        }
    }

    fn lock_supervisor(&self) -> MutexGuard<'_, Option<Supervisor>> {
        self.supervisor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Link closed or failed; the supervisor schedules a reconnect
    Closed,
    /// `disconnect()` or a newer `connect()` took over
    Cancelled,
}

impl SessionEnd {
    fn is_cancelled(self) -> bool {
        self == SessionEnd::Cancelled
    }
}
