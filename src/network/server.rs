//! WebSocket Game Server
//!
//! Async WebSocket server for player connections.
//! Authenticates during the handshake, then routes each client message to the
//! player's fishing session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, accept_hdr_async};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::catalog::{Catalog, CatalogError, InMemoryCatalog, LocationId};
use crate::game::services::{PlayerId, PlayerServices};
use crate::network::auth::{authenticate, query_param, token_from_query, AuthConfig, AuthError};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::network::scheduler::{emit, Outbound, SessionHandle};
use crate::network::session::SessionManager;

/// Called with each player once their connection is authenticated.
pub type ConnectHook = Arc<dyn Fn(PlayerId) + Send + Sync>;

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Listener could not bind.
    #[error("bind failed: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Catalog file unreadable or invalid.
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
}

/// Load the catalog named by the config, or the demo catalog.
pub fn load_catalog(config: &ServerConfig) -> Result<InMemoryCatalog, GameServerError> {
    match &config.catalog_path {
        Some(path) => {
            let catalog = InMemoryCatalog::load(path)?;
            info!(
                path = %path.display(),
                locations = catalog.location_count(),
                fish = catalog.fish_count(),
                "Catalog loaded"
            );
            Ok(catalog)
        }
        None => {
            info!("No catalog configured, using demo catalog");
            Ok(InMemoryCatalog::demo())
        }
    }
}

/// Open time of each live connection, keyed by peer address.
type Registry = Arc<RwLock<HashMap<SocketAddr, Instant>>>;

/// WebSocket front end for fishing sessions.
pub struct GameServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    connections: Registry,
    on_connect: Option<ConnectHook>,
    stop: broadcast::Sender<()>,
}

impl GameServer {
    /// Server over the given catalog and profile services.
    pub fn new(config: ServerConfig, catalog: Arc<dyn Catalog>, services: Arc<dyn PlayerServices>) -> Self {
        let sessions = Arc::new(SessionManager::new(catalog, services, config.engine.clone()));
        let (stop, _) = broadcast::channel(1);

        Self {
            config,
            sessions,
            connections: Registry::default(),
            on_connect: None,
            stop,
        }
    }

    /// Run a hook for each authenticated player before any message is handled.
    pub fn on_connect(mut self, hook: impl Fn(PlayerId) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Bind `bind_addr` and serve until [`GameServer::shutdown`].
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Listening for anglers on {}", self.config.bind_addr);
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on a bound listener until shutdown, then stop
    /// every session.
    pub async fn serve(&self, listener: TcpListener) {
        if !self.config.auth.is_configured() {
            warn!("Authentication not configured, trusting the `player` query parameter");
        }

        let mut stop = self.stop.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr).await,
                    Err(e) => error!("accept failed: {}", e),
                },
                _ = stop.recv() => break,
            }
        }

        info!("Stopping {} session(s)", self.sessions.session_count().await);
        self.sessions.shutdown_all().await;
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let open = self.connections.read().await.len();
        if open >= self.config.max_connections {
            warn!(%addr, open, "At capacity, turning connection away");
            tokio::spawn(turn_away(stream, addr));
            return;
        }
        debug!(%addr, "TCP connection accepted");

        let ctx = ConnectionContext {
            addr,
            config: self.config.clone(),
            sessions: self.sessions.clone(),
            connections: self.connections.clone(),
            on_connect: self.on_connect.clone(),
            stop: self.stop.subscribe(),
        };
        tokio::spawn(ctx.run(stream));
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.stop.send(());
    }

    /// Open WebSocket connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Live fishing sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

/// Everything one connection task needs from the server.
struct ConnectionContext {
    addr: SocketAddr,
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    connections: Registry,
    on_connect: Option<ConnectHook>,
    stop: broadcast::Receiver<()>,
}

impl ConnectionContext {
    async fn run(mut self, stream: TcpStream) {
        let addr = self.addr;
        let mut identity = None;
        let auth = &self.config.auth;
        let callback = |req: &Request, response: Response| {
            identify(req, auth)
                .map(|player| {
                    identity = Some(player);
                    response
                })
                .map_err(|err| unauthorized(&err))
        };

        let ws = match accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(%addr, "Handshake failed: {}", e);
                return;
            }
        };
        let Some(player) = identity else { return };

        self.connections.write().await.insert(addr, Instant::now());
        if let Some(hook) = &self.on_connect {
            hook(player);
        }
        info!(player = %player, %addr, "Player connected");

        let (sink, mut frames) = ws.split();
        let (outbound, queue) = mpsc::channel::<ServerMessage>(64);
        let writer = spawn_writer(sink, queue);

        let mut connection = Connection { player, session: None };
        let greeting = format!("Connected to angler server v{}", self.config.version);
        if !emit(&outbound, ServerMessage::Connected { message: greeting }).await.is_stop() {
            self.read_frames(&mut connection, &mut frames, &outbound).await;
        }

        if let Some(session_id) = connection.session {
            self.sessions.close(&player, session_id).await;
        }
        writer.abort();

        let opened_at = self.connections.write().await.remove(&addr);
        let duration = opened_at.map(|at| at.elapsed());
        info!(player = %player, %addr, ?duration, "Player disconnected");
    }

    /// Route frames until the peer leaves, goes idle or the server stops.
    async fn read_frames<S>(&mut self, connection: &mut Connection, frames: &mut S, outbound: &Outbound)
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                frame = timeout(self.config.idle_timeout, frames.next()) => frame,
                _ = self.stop.recv() => return,
            };
            let Ok(frame) = frame else {
                info!(player = %connection.player, "Idle timeout");
                return;
            };
            if connection.on_frame(frame, &self.sessions, outbound).await.is_break() {
                return;
            }
        }
    }
}

/// Finish the handshake only to report a full server, then close.
async fn turn_away(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, "Handshake failed: {}", e);
            return;
        }
    };

    let full = ServerMessage::error(ErrorCode::ServerFull, "server is full, try again later");
    match full.to_json() {
        Ok(text) => {
            if let Err(e) = ws.send(Message::Text(text)).await {
                debug!(%addr, "Socket write failed: {}", e);
            }
        }
        Err(e) => error!(message = full.name(), "Encoding failed: {}", e),
    }
    if let Err(e) = ws.close(None).await {
        debug!(%addr, "Close failed: {}", e);
    }
}

/// Drain queued server messages onto the socket.
fn spawn_writer<S>(mut sink: S, mut queue: mpsc::Receiver<ServerMessage>) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::fmt::Display + Send,
{
    tokio::spawn(async move {
        while let Some(msg) = queue.recv().await {
            match msg.to_json() {
                Ok(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("Socket write failed: {}", e);
                        return;
                    }
                }
                Err(e) => error!(message = msg.name(), "Encoding failed: {}", e),
            }
        }
    })
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Resolve the connecting player from the handshake request.
///
/// Without auth configured the `player` query parameter is trusted, and a
/// connection without one gets a fresh anonymous id.
fn identify(req: &Request, auth: &AuthConfig) -> Result<PlayerId, AuthError> {
    let query = req.uri().query();

    if !auth.is_configured() {
        let name = query_param(query, "player").unwrap_or_else(|| Uuid::new_v4().to_string());
        return Ok(PlayerId::from_subject(&name));
    }

    let token = token_from_query(query).ok_or(AuthError::MissingToken)?;
    let (player, _claims) = authenticate(&token, auth)?;
    Ok(player)
}

fn unauthorized(err: &AuthError) -> ErrorResponse {
    debug!("Handshake rejected: {}", err);
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

// =============================================================================
// MESSAGE ROUTING
// =============================================================================

/// Per-connection routing state.
struct Connection {
    player: PlayerId,
    /// Session opened by this connection.
    session: Option<Uuid>,
}

impl Connection {
    async fn on_frame(
        &mut self,
        frame: Option<Result<Message, WsError>>,
        sessions: &SessionManager,
        outbound: &Outbound,
    ) -> ControlFlow<()> {
        let reply = match frame {
            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                Ok(msg) => self.handle(msg, sessions, outbound).await,
                Err(e) => {
                    debug!(player = %self.player, "Rejected client frame: {}", e);
                    Some(ServerMessage::error(ErrorCode::InvalidMessage, format!("invalid message: {}", e)))
                }
            },
            Some(Ok(Message::Binary(_))) => {
                Some(ServerMessage::error(ErrorCode::InvalidMessage, "binary frames are not supported"))
            }
            Some(Ok(Message::Close(_))) | None => return ControlFlow::Break(()),
            Some(Err(e)) => {
                debug!(player = %self.player, "Socket read failed: {}", e);
                return ControlFlow::Break(());
            }
            Some(Ok(_)) => None,
        };

        if let Some(reply) = reply {
            if emit(outbound, reply).await.is_stop() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Apply one client message, returning the direct reply if any.
    async fn handle(&mut self, msg: ClientMessage, sessions: &SessionManager, outbound: &Outbound) -> Option<ServerMessage> {
        debug!(player = %self.player, message = msg.name(), "Client message");

        if let ClientMessage::Join { location_id } = msg {
            return Some(self.join(location_id, sessions, outbound).await);
        }
        let Some(handle) = self.current(sessions).await else {
            return Some(not_joined());
        };

        // Past join, a message is a cast, a fight action or the hook.
        let reply = match (msg.cast_input(), msg.fight_action()) {
            (Some(input), _) => match handle.cast(input).await {
                Ok(cast) => ServerMessage::from(cast),
                Err(err) => ServerMessage::from(&err),
            },
            (None, Some(action)) => {
                return handle.apply_action(action).await.err().map(|err| ServerMessage::from(&err));
            }
            (None, None) => match handle.hook().await {
                Ok(event) => ServerMessage::from(event),
                Err(err) => ServerMessage::from(&err),
            },
        };
        Some(reply)
    }

    async fn join(&mut self, location_id: LocationId, sessions: &SessionManager, outbound: &Outbound) -> ServerMessage {
        self.session = None;

        match sessions.join(self.player, location_id, outbound.clone()).await {
            Ok(handle) => {
                self.session = Some(handle.id());
                let snapshot = handle.snapshot().await;
                ServerMessage::Joined {
                    location_id: snapshot.location_id,
                    location_name: snapshot.location_name,
                    state: snapshot.state,
                }
            }
            Err(err) => {
                debug!(player = %self.player, location = location_id, %err, "Join rejected");
                ServerMessage::from(&err)
            }
        }
    }

    /// The session this connection opened, if it is still the player's live one.
    async fn current(&self, sessions: &SessionManager) -> Option<Arc<SessionHandle>> {
        let session_id = self.session?;
        sessions
            .get(&self.player)
            .await
            .filter(|handle| handle.id() == session_id)
    }
}

fn not_joined() -> ServerMessage {
    ServerMessage::error(ErrorCode::NotJoined, "join a location first")
}

// =============================================================================
// TESTS
// =============================================================================
