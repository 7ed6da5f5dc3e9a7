//! Session Handle
//!
//! Owns one connection to the relay and the small state machine around it:
//!
//! ```text
//! Disconnected --connect()--> Connecting --handshake ok--> Connected
//!      ^                          |                            |
//!      +------ failure -----------+--- disconnect()/close/error+
//! ```
//!
//! Every public operation returns immediately; outcomes arrive as
//! [`SessionEvent`]s on subscriber channels. There is no automatic reconnect.

use chat_protocol::{Envelope, Frame};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ConnectError;
use crate::state::{ConnectionState, SessionEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where to connect and how to present ourselves.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay URL, e.g. `ws://127.0.0.1:3000` (the socket path is added when absent)
    pub server_url: String,
    /// `Origin` header to send; browsers always send one, other clients may not
    pub origin: Option<String>,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Handle to one client session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

struct Shared {
    config: SessionConfig,
    state_tx: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

/// Mutable session state. Every transition and every emitted event happens
/// under this lock, which is what keeps subscriber order consistent.
#[derive(Default)]
struct Control {
    state: ConnectionState,
    display_name: Option<String>,
    /// Bumped per connect so a stale transport task cannot touch a newer session
    epoch: u64,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl Control {
    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, control: &mut Control, state: ConnectionState) {
        control.state = state;
        self.state_tx.send_replace(state);
    }

    fn teardown(&self, control: &mut Control) {
        if let Some(cancel) = control.cancel.take() {
            cancel.cancel();
        }
        // Dropping the sender discards anything not yet written
        control.outbound = None;
        self.transition(control, ConnectionState::Disconnected);
        control.emit(SessionEvent::Disconnected);
    }

    fn mark_connected(&self, epoch: u64) -> bool {
        let mut control = self.lock();
        if control.epoch != epoch || control.state != ConnectionState::Connecting {
            return false;
        }
        self.transition(&mut control, ConnectionState::Connected);
        control.emit(SessionEvent::Connected);
        true
    }

    fn deliver(&self, epoch: u64, envelope: Envelope) {
        let mut control = self.lock();
        if control.epoch != epoch || control.state != ConnectionState::Connected {
            return;
        }
        control.emit(SessionEvent::Message(envelope));
    }

    /// Transport-side end of a connection attempt or session.
    fn finish(&self, epoch: u64) {
        let mut control = self.lock();
        if control.epoch != epoch || control.state == ConnectionState::Disconnected {
            return;
        }
        self.teardown(&mut control);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = control.cancel.take() {
            debug!("Last session handle dropped, closing connection");
            cancel.cancel();
        }
    }
}

impl SessionHandle {
    pub fn new(config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                state_tx,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Observe state changes (latest value only).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Display name attached at the last `connect`.
    pub fn display_name(&self) -> Option<String> {
        self.shared.lock().display_name.clone()
    }

    /// Register a subscriber. It sees every event emitted from now on, in
    /// the order the session produced them.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().subscribers.push(tx);
        rx
    }

    /// Start connecting as `display_name`. No-op unless `Disconnected`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, display_name: &str) {
        let mut control = self.shared.lock();
        if control.state != ConnectionState::Disconnected {
            debug!("connect ignored while {}", control.state);
            return;
        }

        control.epoch += 1;
        let epoch = control.epoch;
        control.display_name = Some(display_name.to_string());

        let cancel = CancellationToken::new();
        control.cancel = Some(cancel.clone());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        control.outbound = Some(outbound_tx);

        self.shared
            .transition(&mut control, ConnectionState::Connecting);
        drop(control);

        tokio::spawn(run_connection(
            Arc::downgrade(&self.shared),
            self.shared.config.clone(),
            epoch,
            display_name.to_string(),
            cancel,
            outbound_rx,
        ));
    }

    /// Connect again with the display name used last time.
    ///
    /// Returns false when there is no previous name to reuse.
    pub fn reconnect(&self) -> bool {
        match self.display_name() {
            Some(name) => {
                self.connect(&name);
                true
            }
            None => false,
        }
    }

    /// Tear the connection down now. No-op when already `Disconnected`.
    pub fn disconnect(&self) {
        let mut control = self.shared.lock();
        if control.state == ConnectionState::Disconnected {
            return;
        }
        info!("Disconnecting from relay");
        self.shared.teardown(&mut control);
    }

    /// Queue `text` as a chat message from this session's display name.
    ///
    /// Dropped (returns false) unless `Connected`, and when `text` is blank.
    /// The body is trimmed before sending.
    pub fn send(&self, text: &str) -> bool {
        let control = self.shared.lock();
        if control.state != ConnectionState::Connected {
            debug!("send dropped while {}", control.state);
            return false;
        }
        let (Some(name), Some(outbound)) = (&control.display_name, &control.outbound) else {
            return false;
        };
        let Some(envelope) = Envelope::outgoing(name, text) else {
            return false;
        };
        outbound.send(envelope).is_ok()
    }
}

async fn open(config: &SessionConfig, display_name: &str) -> Result<WsStream, ConnectError> {
    let url = chat_protocol::handshake_url(&config.server_url, display_name)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(ConnectError::from_tungstenite)?;
    if let Some(origin) = &config.origin {
        let value = HeaderValue::from_str(origin).map_err(|e| ConnectError::Other(e.into()))?;
        request.headers_mut().insert(header::ORIGIN, value);
    }

    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(ConnectError::from_tungstenite)?;
    Ok(ws_stream)
}

/// Drives one connection attempt. Holds the session weakly so dropping the
/// last handle cancels it.
async fn run_connection(
    shared: Weak<Shared>,
    config: SessionConfig,
    epoch: u64,
    display_name: String,
    cancel: CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
) {
    let ws_stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = open(&config, &display_name) => match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(user = %display_name, "Connection to {} failed: {}", config.server_url, e);
                finish(&shared, epoch);
                return;
            }
        },
    };

    let connected = shared.upgrade().is_some_and(|s| s.mark_connected(epoch));
    if !connected {
        return;
    }
    info!(user = %display_name, "Connected to {}", config.server_url);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Session cancelled locally");
                break;
            }

            Some(envelope) = outbound.recv() => {
                let json = match Frame::ChatMessage(envelope).to_json() {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize envelope: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(tungstenite::Message::Text(json.into())).await {
                    debug!("Send failed: {}", e);
                    break;
                }
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match Frame::<Envelope>::from_json(text.as_str()) {
                            Ok(frame) => match shared.upgrade() {
                                Some(s) => s.deliver(epoch, frame.into_payload()),
                                None => break,
                            },
                            Err(e) => debug!("Ignoring unreadable frame: {}", e),
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        info!("Relay closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("Connection lost: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    finish(&shared, epoch);
}

fn finish(shared: &Weak<Shared>, epoch: u64) {
    if let Some(s) = shared.upgrade() {
        s.finish(epoch);
    }
}
