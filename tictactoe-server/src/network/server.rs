//! WebSocket Game Server
//!
//! Async WebSocket server for the pairing lobby.
//! One task per connection answers requests strictly in arrival order;
//! REQUEST_MOVE is a long-poll parked on the event's `Notify`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::board::{Move, DEFAULT_SIDE, MAX_SIDE};
use crate::network::lobby::{Lobby, LobbyError, MoveTake};
use crate::network::protocol::{
    Credentials, EventId, EventStatus, MoveUpdate, Registration, Request, RequestType,
    Response, ResponsePayload,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long REQUEST_MOVE waits for the opponent before answering "no move yet".
    pub move_wait: Duration,
    /// Board side for new pairings.
    pub board_side: usize,
    /// How long finished events are kept.
    pub event_retention: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            move_wait: Duration::from_millis(5000),
            board_side: DEFAULT_SIDE,
            event_retention: Duration::from_secs(600),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `TICTACTOE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("TICTACTOE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("TICTACTOE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            move_wait: env_parse("TICTACTOE_MOVE_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.move_wait),
            board_side: env_parse("TICTACTOE_BOARD_SIDE")
                .map(bounded_board_side)
                .unwrap_or(defaults.board_side),
            event_retention: env_parse("TICTACTOE_EVENT_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.event_retention),
            version: defaults.version,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn bounded_board_side(side: usize) -> usize {
    let bounded = side.clamp(1, MAX_SIDE);
    if bounded != side {
        warn!("Board side {} out of range, using {}", side, bounded);
    }
    bounded
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Why a single request failed.
#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error(transparent)]
    Lobby(#[from] LobbyError),
    #[error("Malformed request data: {0}")]
    BadData(#[from] serde_json::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Logged-in user, if any.
    username: Option<String>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Users and events.
    lobby: Arc<RwLock<Lobby>>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let lobby = Lobby::new(config.board_side);

        Self {
            config,
            lobby: Arc::new(RwLock::new(lobby)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let local_addr = listener.local_addr()?;
        info!("Game server v{} listening on {}", self.config.version, local_addr);

        let cleanup_lobby = self.lobby.clone();
        let retention = self.config.event_retention;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_lobby, retention).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let lobby = self.lobby.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    username: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                                Ok(text) => text,
                                Err(_) => {
                                    debug!("Non UTF-8 frame from {}", addr);
                                    Self::reply(&msg_tx, Response::failure(0, "Invalid request format")).await;
                                    continue;
                                }
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = msg_tx.send(Message::Pong(payload)).await;
                                continue;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => continue,
                        };

                        let request = match Request::from_json(&text) {
                            Ok(r) => r,
                            Err(e) => {
                                debug!("Invalid request from {}: {}", addr, e);
                                Self::reply(&msg_tx, Response::failure(0, "Invalid request format")).await;
                                continue;
                            }
                        };

                        {
                            let mut clients = clients.write().await;
                            if let Some(client) = clients.get_mut(&addr) {
                                client.last_activity = Instant::now();
                            }
                        }

                        let response = Self::handle_request(addr, request, &clients, &lobby, &config).await;
                        Self::reply(&msg_tx, response).await;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // let queued replies drain before the socket goes away
            drop(msg_tx);
            let _ = sender_task.await;

            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                if let Some(username) = client.username {
                    lobby.write().await.logout(&username);
                }
                debug!("Client {} was connected for {:?}", addr, client.connected_at.elapsed());
            }

            info!("Client {} cleaned up", addr);
        });
    }

    async fn reply(sender: &mpsc::Sender<Message>, response: Response) {
        match response.to_json() {
            Ok(text) => {
                let _ = sender.send(Message::Text(text)).await;
            }
            Err(e) => error!("Failed to serialize response: {}", e),
        }
    }

    /// Handle one request and build its response.
    async fn handle_request(
        addr: SocketAddr,
        request: Request,
        clients: &Clients,
        lobby: &Arc<RwLock<Lobby>>,
        config: &ServerConfig,
    ) -> Response {
        let id = request.id;
        debug!("Request {} {:?} from {}", id, request.request_type, addr);

        let current_user = clients.read().await.get(&addr).and_then(|c| c.username.clone());

        let result = match (request.request_type, current_user) {
            (RequestType::Register, _) => Self::handle_register(&request, lobby).await,
            (RequestType::Login, None) => Self::handle_login(addr, &request, clients, lobby).await,
            (RequestType::Login, Some(_)) => Err(LobbyError::ConnectionInUse.into()),
            (_, None) => Err(LobbyError::NotLoggedIn.into()),
            (request_type, Some(username)) => {
                Self::handle_user_request(addr, request_type, &request, &username, clients, lobby, config).await
            }
        };

        match result {
            Ok(payload) => Response::success(id, payload),
            Err(e) => {
                debug!("Request {} from {} failed: {}", id, addr, e);
                Response::failure(id, e.to_string())
            }
        }
    }

    async fn handle_register(
        request: &Request,
        lobby: &Arc<RwLock<Lobby>>,
    ) -> Result<ResponsePayload, RequestError> {
        let registration: Registration = request.decode_data()?;
        let user = lobby.write().await.register(&registration)?;
        Ok(ResponsePayload::User(user))
    }

    async fn handle_login(
        addr: SocketAddr,
        request: &Request,
        clients: &Clients,
        lobby: &Arc<RwLock<Lobby>>,
    ) -> Result<ResponsePayload, RequestError> {
        let credentials: Credentials = request.decode_data()?;
        let user = lobby.write().await.login(&credentials)?;

        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&addr) {
            client.username = Some(user.username.clone());
        }
        Ok(ResponsePayload::User(user))
    }

    /// Requests that need a logged-in connection.
    async fn handle_user_request(
        addr: SocketAddr,
        request_type: RequestType,
        request: &Request,
        username: &str,
        clients: &Clients,
        lobby: &Arc<RwLock<Lobby>>,
        config: &ServerConfig,
    ) -> Result<ResponsePayload, RequestError> {
        let payload = match request_type {
            RequestType::Logout => {
                lobby.write().await.logout(username);
                if let Some(client) = clients.write().await.get_mut(&addr) {
                    client.username = None;
                }
                ResponsePayload::None
            }
            RequestType::UpdatePairing => {
                ResponsePayload::Pairing(lobby.read().await.update_pairing(username))
            }
            RequestType::SendInvitation => {
                let opponent: String = request.decode_data()?;
                ResponsePayload::Event(lobby.write().await.send_invitation(username, &opponent)?)
            }
            RequestType::AcceptInvitation => {
                let event_id: EventId = request.decode_data()?;
                ResponsePayload::Event(lobby.write().await.accept_invitation(username, event_id)?)
            }
            RequestType::DeclineInvitation => {
                let event_id: EventId = request.decode_data()?;
                ResponsePayload::Event(lobby.write().await.decline_invitation(username, event_id)?)
            }
            RequestType::AcknowledgeResponse => {
                let event_id: EventId = request.decode_data()?;
                ResponsePayload::Event(lobby.write().await.acknowledge_response(username, event_id)?)
            }
            RequestType::RequestMove => {
                ResponsePayload::Move(Self::await_move(username, lobby, config.move_wait).await)
            }
            RequestType::SendMove => {
                let mv: Move = request.decode_data()?;
                lobby.write().await.send_move(username, mv)?;
                ResponsePayload::None
            }
            RequestType::AbortGame => {
                lobby.write().await.end_game(username, EventStatus::Aborted)?;
                ResponsePayload::None
            }
            RequestType::CompleteGame => {
                lobby.write().await.end_game(username, EventStatus::Completed)?;
                ResponsePayload::None
            }
            RequestType::Login | RequestType::Register => {
                return Err(LobbyError::ConnectionInUse.into());
            }
        };
        Ok(payload)
    }

    /// Long-poll for the opponent's next move.
    async fn await_move(username: &str, lobby: &Arc<RwLock<Lobby>>, wait: Duration) -> MoveUpdate {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let mut guard = lobby.write().await;
            let notify = match guard.take_move(username) {
                MoveTake::Ready(mv) => return MoveUpdate { mv: Some(mv), active: true },
                MoveTake::Inactive => return MoveUpdate { mv: None, active: false },
                MoveTake::Waiting(notify) => notify,
            };
            // registered before the lock is released so no wake-up is missed
            let notified = notify.notified();
            drop(guard);

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return MoveUpdate { mv: None, active: true };
            }
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(lobby: Arc<RwLock<Lobby>>, retention: Duration) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
            let cutoff = chrono::Utc::now() - retention;
            let purged = lobby.write().await.purge_finished(cutoff);
            if purged > 0 {
                info!("Purged {} finished events", purged);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get logged-in user count.
    pub async fn online_count(&self) -> usize {
        self.lobby.read().await.online_count()
    }

    /// Get tracked event count.
    pub async fn event_count(&self) -> usize {
        self.lobby.read().await.event_count()
    }
}
