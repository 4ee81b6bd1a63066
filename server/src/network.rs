//! Server network layer: WebSocket accept loop, per-connection tasks and the
//! broadcast hub
//!
//! One hub task owns the game engine and the connection registry. Connection
//! tasks only do socket I/O and their own heartbeat; everything they read is
//! forwarded to the hub over an mpsc channel, so each message is handled to
//! completion (decode, mutate, broadcast) before the next one is looked at.

use crate::client_manager::{Client, ClientManager};
use crate::game::{apply_command, GameEngine, Role};
use crate::validation::validate_effect;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Command, Event, GameState, ProtocolError, HEARTBEAT_INTERVAL_MS, WS_PATH};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Period of the per-connection heartbeat
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", shared::DEFAULT_PORT),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
        }
    }
}

/// Messages sent from connection tasks to the hub
#[derive(Debug)]
pub enum HubMessage {
    Connected {
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    },
    Received {
        client_id: u32,
        text: String,
    },
    Closed {
        client_id: u32,
    },
}

/// Owns the engine and fans its output out to every connection
pub struct Hub {
    engine: GameEngine,
    clients: ClientManager,
    state_rx: broadcast::Receiver<GameState>,
}

impl Hub {
    pub fn new(engine: GameEngine) -> Self {
        let state_rx = engine.subscribe();
        Self {
            engine,
            clients: ClientManager::new(),
            state_rx,
        }
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Handles one message to completion
    pub fn handle(&mut self, message: HubMessage) {
        match message {
            HubMessage::Connected {
                client_id,
                addr,
                sender,
            } => {
                self.clients.add_client(Client::new(client_id, addr, sender));
                self.greet(client_id);
            }
            HubMessage::Received { client_id, text } => self.handle_text(client_id, &text),
            HubMessage::Closed { client_id } => {
                self.clients.remove_client(client_id);
            }
        }
        self.flush_state_changes();
    }

    /// Pushes the catalog, then the current snapshot, to a new connection
    fn greet(&self, client_id: u32) {
        let activities = Event::activities(self.engine.activities().as_ref().clone());
        let state = Event::game_state(self.engine.get_state());

        for event in [activities, state] {
            match event.encode() {
                Ok(text) => {
                    self.clients.send_to(client_id, &text);
                }
                Err(e) => error!("Failed to encode greeting for client {}: {}", client_id, e),
            }
        }
    }

    fn handle_text(&mut self, client_id: u32, text: &str) {
        let command = match Command::decode(text) {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping message from client {}: {}", client_id, e);
                return;
            }
        };
        debug!("Client {} sent {}", client_id, command.name());

        if let Command::SendEffect { effect } = &command {
            match validate_effect(effect, self.engine.activities()) {
                Ok(effect) => self.broadcast(&Event::effect(effect)),
                Err(e) => warn!("Dropping effect from client {}: {}", client_id, e),
            }
            return;
        }

        let role = self.role_of(client_id);
        if let Err(e) = apply_command(&mut self.engine, command, role) {
            warn!("Dropping command from client {}: {}", client_id, e);
        }
    }

    /// Host privilege is not verified; every connection acts as host
    fn role_of(&self, _client_id: u32) -> Role {
        Role::Host
    }

    /// Broadcasts one `GameState` event per snapshot the engine published
    fn flush_state_changes(&mut self) {
        loop {
            match self.state_rx.try_recv() {
                Ok(state) => self.broadcast(&Event::game_state(state)),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Skipped {} stale snapshots", skipped);
                }
                Err(_) => break,
            }
        }
    }

    fn broadcast(&self, event: &Event) {
        match event.encode() {
            Ok(text) => {
                let delivered = self.clients.broadcast(&text);
                debug!("Broadcast to {} clients", delivered);
            }
            Err(e) => error!("Failed to encode event: {}", e),
        }
    }
}

/// Main server coordinating the accept loop and the hub
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    hub: Hub,
}

impl Server {
    pub async fn bind(config: ServerConfig, engine: GameEngine) -> Result<Self, ServerError> {
        if config.heartbeat_interval.is_zero() {
            return Err(ServerError::ZeroHeartbeat);
        }
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            config,
            hub: Hub::new(engine),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the server until the task is dropped
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            config,
            mut hub,
        } = self;
        let (hub_tx, mut hub_rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(listener, hub_tx, config.heartbeat_interval));
        info!("Server started successfully");

        while let Some(message) = hub_rx.recv().await {
            hub.handle(message);
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Accepts TCP connections and spawns a task per connection
async fn accept_loop(
    listener: TcpListener,
    hub_tx: mpsc::UnboundedSender<HubMessage>,
    heartbeat: Duration,
) {
    let mut next_client_id: u32 = 1;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let client_id = next_client_id;
                next_client_id += 1;
                debug!("New TCP connection {} from {}", client_id, addr);

                let hub_tx = hub_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, addr, client_id, hub_tx, heartbeat).await
                    {
                        warn!("Connection {} from {} ended: {}", client_id, addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Rejects upgrades on any path other than the WebSocket path
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == WS_PATH {
        return Ok(response);
    }

    debug!("Rejecting upgrade on {}", request.uri().path());
    let mut error = ErrorResponse::new(Some("Not Found".to_string()));
    *error.status_mut() = StatusCode::NOT_FOUND;
    Err(error)
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    client_id: u32,
    hub_tx: mpsc::UnboundedSender<HubMessage>,
    heartbeat: Duration,
) -> Result<(), ServerError> {
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    if hub_tx
        .send(HubMessage::Connected {
            client_id,
            addr,
            sender: outbound_tx,
        })
        .is_err()
    {
        return Ok(());
    }

    let result = pump(ws_stream, client_id, &hub_tx, outbound_rx, heartbeat).await;
    let _ = hub_tx.send(HubMessage::Closed { client_id });
    result
}

/// Moves frames between the socket and the hub until either side closes
async fn pump(
    ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    client_id: u32,
    hub_tx: &mpsc::UnboundedSender<HubMessage>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    heartbeat: Duration,
) -> Result<(), ServerError> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut heartbeat = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.to_string();
                        if hub_tx.send(HubMessage::Received { client_id, text }).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Dropping binary frame from client {}", client_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(message) => ws_sender.send(message).await?,
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                let text = Event::heartbeat().encode()?;
                ws_sender.send(Message::Text(text.into())).await?;
            }
        }
    }

    // Best effort close; the peer may already be gone
    let _ = ws_sender.close().await;
    Ok(())
}
