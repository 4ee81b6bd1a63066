//! Connection manager: keeps one WebSocket to the server alive
//!
//! The manager connects, watches the server heartbeat, reconnects with a
//! linear backoff when the link dies and surfaces everything it hears as
//! `ConnectionEvent`s on a broadcast channel. Commands are only transmitted
//! while the socket is open; anything sent in between is dropped.

use crate::connection::{ConnectionState, ConnectionStatus, Inbound, ReconnectBackoff};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{
    Activities, Command, Effect, GameState, ProtocolError, DEFAULT_PORT, HEARTBEAT_TIMEOUT_MS,
    MAX_RECONNECT_DELAY_MS, RECONNECT_STEP_MS, WS_PATH,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server, including the `/ws` path
    pub url: String,
    /// Silence after which the connection is considered dead
    pub heartbeat_timeout: Duration,
    pub reconnect_step: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}{}", DEFAULT_PORT, WS_PATH),
            heartbeat_timeout: Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
            reconnect_step: Duration::from_millis(RECONNECT_STEP_MS),
            max_reconnect_delay: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
        }
    }
}

/// Notifications surfaced to subscribers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    Disconnected,
    GameState(GameState),
    Activities(Activities),
    Effect(Effect),
}

struct Shared {
    config: ClientConfig,
    events: broadcast::Sender<ConnectionEvent>,
    status: watch::Sender<ConnectionStatus>,
    /// Present only while the socket is open
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        // Err only means nobody is subscribed
        let _ = self.events.send(event);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle to a managed connection; clones share the same socket
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                events,
                status,
                outbound: RwLock::new(None),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Returns a receiver for every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Spawns the connection task
    pub fn start(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(run(shared))
    }

    /// Serializes and transmits a command if the socket is open
    ///
    /// Returns whether the command was handed to the socket; commands sent
    /// while disconnected are dropped.
    pub async fn send_command(&self, command: &Command) -> Result<bool, ClientError> {
        let text = command.encode()?;
        let outbound = self.shared.outbound.read().await;
        match outbound.as_ref() {
            Some(sender) => Ok(sender.send(text).is_ok()),
            None => {
                debug!("Dropping {} while disconnected", command.name());
                Ok(false)
            }
        }
    }

    /// Closes the socket and stops reconnecting
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
    }
}

/// Connect, serve, back off, repeat until closed
async fn run(shared: Arc<Shared>) {
    let config = &shared.config;
    let mut state = ConnectionState::new(ReconnectBackoff::new(
        config.reconnect_step,
        config.max_reconnect_delay,
    ));

    while !shared.is_closed() {
        state.begin_attempt();
        shared.status.send_replace(state.status());
        shared.emit(ConnectionEvent::Connecting);
        info!("Attempting connection to server at {}", config.url);

        let attempt = tokio::select! {
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
            _ = shared.shutdown.notified() => break,
        };

        match attempt {
            Ok((ws_stream, _response)) => {
                info!("Connected to server");
                // Commands must be accepted by the time subscribers see Connected
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
                *shared.outbound.write().await = Some(outbound_tx);

                state.opened();
                shared.status.send_replace(state.status());
                shared.emit(ConnectionEvent::Connected);

                serve(&shared, &mut state, ws_stream, outbound_rx).await;
            }
            Err(e) => warn!("Connection to {} failed: {}", config.url, e),
        }

        if shared.is_closed() {
            break;
        }

        let delay = state.lost();
        shared.status.send_replace(state.status());
        shared.emit(ConnectionEvent::Disconnected);

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shared.shutdown.notified() => break,
        }
    }

    shared.status.send_replace(ConnectionStatus::Disconnected);
    info!("Connection closed");
}

/// Pumps one open socket until it dies, times out or is closed
async fn serve(
    shared: &Shared,
    state: &mut ConnectionState,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let heartbeat_timeout = shared.config.heartbeat_timeout;
    let timeout = sleep(heartbeat_timeout);
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match state.receive(text.as_str()) {
                        Inbound::Heartbeat => {
                            timeout.as_mut().reset(Instant::now() + heartbeat_timeout);
                        }
                        Inbound::State(game_state) => {
                            shared.emit(ConnectionEvent::GameState(game_state));
                        }
                        Inbound::Activities(activities) => {
                            shared.emit(ConnectionEvent::Activities(activities));
                        }
                        Inbound::Effect(effect) => shared.emit(ConnectionEvent::Effect(effect)),
                        Inbound::Stale { time, last } => {
                            debug!("Dropping stale snapshot ({} < {})", time, last);
                        }
                        Inbound::Malformed(e) => error!("Received malformed message: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Socket error: {}", e);
                        break;
                    }
                }
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                    error!("Failed to send command: {}", e);
                    break;
                }
            }

            _ = &mut timeout => {
                error!("Missed heartbeat, closing socket");
                break;
            }

            _ = shared.shutdown.notified() => break,
        }
    }

    *shared.outbound.write().await = None;
    let _ = ws_sender.close().await;
}
