//! WebSocket Gateway
//!
//! Accepts WebSocket connections, authenticates each one with a JWT and
//! forwards its requests to the execution host. Every committed event is
//! pushed to all authenticated connections.
//!
//! The gateway holds no protocol state of its own; the host is the single
//! writer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::clock::{Clock, SystemClock, Timestamp};
use crate::core::ids::Address;
use crate::error::Precondition;
use crate::host::handle::{HostError, HostHandle};
use crate::network::auth::{AuthError, Authenticator};
use crate::network::protocol::{
    parse_address, parse_amount, AuthResult, ClientMessage, ErrorCode, EventNotice, GameView,
    ReceiptInfo, ServerError, ServerMessage, SubmitFrame,
};

/// How long a refused client gets to finish its handshake.
const REFUSAL_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Drop connections silent for this long.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("RPS_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("RPS_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: std::env::var("RPS_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            ..defaults
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authenticator could not be built.
    #[error("Auth setup failed: {0}")]
    Auth(#[from] AuthError),

    /// Host task is gone.
    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

// =============================================================================
// REQUEST DISPATCH
// =============================================================================

/// Per-connection state.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Connection id, for logs.
    pub id: Uuid,
    /// Ledger address once authenticated.
    pub address: Option<Address>,
}

impl ClientSession {
    /// Fresh unauthenticated session.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            address: None,
        }
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a connection needs to answer requests.
#[derive(Clone)]
pub struct Dispatcher {
    host: HostHandle,
    auth: Option<Arc<Authenticator>>,
    version: String,
}

impl Dispatcher {
    /// Create a dispatcher. Without an authenticator every `auth` fails.
    pub fn new(host: HostHandle, auth: Option<Authenticator>, version: impl Into<String>) -> Self {
        Self {
            host,
            auth: auth.map(Arc::new),
            version: version.into(),
        }
    }

    /// Answer one client message. Every message gets exactly one reply.
    pub async fn handle(&self, session: &mut ClientSession, msg: ClientMessage, now: Timestamp) -> ServerMessage {
        let request_id = msg.request_id();

        if let ClientMessage::Auth(req) = &msg {
            return self.authenticate(session, &req.token, now);
        }
        if let ClientMessage::Ping { timestamp } = msg {
            return ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
            };
        }

        let Some(caller) = session.address else {
            return ServerMessage::rejected(request_id, ErrorCode::NotAuthenticated, "Must authenticate first");
        };

        let tx = match msg.to_transaction() {
            Ok(tx) => tx,
            Err(err) => return ServerMessage::rejected(request_id, ErrorCode::InvalidInput, err.to_string()),
        };
        if let Some(tx) = tx {
            return self.submit(caller, request_id.unwrap_or_default(), tx).await;
        }

        let result = match msg {
            ClientMessage::Approve(req) => self.approve(caller, req.request_id, &req.token, &req.amount).await,
            ClientMessage::GetGame { game_id } => match self.host.game(game_id).await {
                Ok(Some(game)) => Ok(ServerMessage::Game(GameView::from(&game))),
                Ok(None) => Ok(ServerMessage::rejected(
                    None,
                    ErrorCode::GameNotFound,
                    Precondition::GameNotFound(game_id).to_string(),
                )),
                Err(err) => Err(err),
            },
            ClientMessage::Balance { token } => match parse_address(&token) {
                Ok(token_addr) => self.host.balance(token_addr, caller).await.map(|(balance, allowance)| {
                    ServerMessage::Balance {
                        token,
                        balance: balance.to_string(),
                        allowance: allowance.to_string(),
                    }
                }),
                Err(err) => Ok(ServerMessage::rejected(None, ErrorCode::InvalidInput, err.to_string())),
            },
            _ => Ok(ServerMessage::rejected(request_id, ErrorCode::InvalidMessage, "Unsupported message")),
        };

        result.unwrap_or_else(|err| {
            error!(session = %session.id, error = %err, "host unavailable");
            ServerMessage::rejected(request_id, ErrorCode::InternalError, err.to_string())
        })
    }

    /// Answer one binary submission.
    pub async fn handle_frame(&self, session: &ClientSession, frame: SubmitFrame) -> ServerMessage {
        match session.address {
            Some(caller) => self.submit(caller, frame.request_id, frame.tx).await,
            None => ServerMessage::rejected(Some(frame.request_id), ErrorCode::NotAuthenticated, "Must authenticate first"),
        }
    }

    fn authenticate(&self, session: &mut ClientSession, token: &str, now: Timestamp) -> ServerMessage {
        let result = self
            .auth
            .as_ref()
            .ok_or(AuthError::NotConfigured)
            .and_then(|auth| auth.authenticate(token, now));

        match result {
            Ok(identity) => {
                info!(session = %session.id, address = %identity.address.short(), "Client authenticated");
                session.address = Some(identity.address);
                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    address: Some(identity.address.to_hex()),
                    error: None,
                    code: None,
                    server_version: self.version.clone(),
                })
            }
            Err(err) => {
                warn!(session = %session.id, error = %err, "Authentication failed");
                ServerMessage::AuthResult(AuthResult {
                    success: false,
                    address: None,
                    error: Some(err.to_string()),
                    code: Some(match err {
                        AuthError::Expired => ErrorCode::TokenExpired,
                        _ => ErrorCode::AuthFailed,
                    }),
                    server_version: self.version.clone(),
                })
            }
        }
    }

    async fn approve(
        &self,
        caller: Address,
        request_id: u64,
        token: &str,
        amount: &str,
    ) -> Result<ServerMessage, HostError> {
        let parsed = parse_address(token).and_then(|t| Ok((t, parse_amount(amount)?)));
        match parsed {
            Ok((token, amount)) => {
                self.host.approve(caller, token, amount).await?;
                Ok(ServerMessage::Approved { request_id })
            }
            Err(err) => Ok(ServerMessage::rejected(Some(request_id), ErrorCode::InvalidInput, err.to_string())),
        }
    }

    async fn submit(&self, caller: Address, request_id: u64, tx: crate::host::Transaction) -> ServerMessage {
        match self.host.execute(caller, tx).await {
            Ok(receipt) => ServerMessage::Receipt(ReceiptInfo::new(request_id, &receipt)),
            Err(HostError::Game(err)) => {
                ServerMessage::rejected(Some(request_id), ErrorCode::from(err.kind()), err.to_string())
            }
            Err(err @ HostError::Stopped) => {
                ServerMessage::rejected(Some(request_id), ErrorCode::InternalError, err.to_string())
            }
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The gateway server.
pub struct Gateway {
    config: ServerConfig,
    dispatcher: Dispatcher,
    clients: Arc<RwLock<BTreeMap<Uuid, SocketAddr>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    /// Create a gateway in front of `host`.
    pub fn new(config: ServerConfig, host: HostHandle, auth: Option<Authenticator>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let dispatcher = Dispatcher::new(host, auth, config.version.clone());

        Self {
            config,
            dispatcher,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until [`Gateway::shutdown`].
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve an already bound listener until [`Gateway::shutdown`].
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        info!("Gateway listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let session = ClientSession::new();
                            {
                                let mut clients = self.clients.write().await;
                                if clients.len() >= self.config.max_connections {
                                    warn!("Connection limit reached, rejecting {}", peer);
                                    tokio::spawn(Self::reject_overloaded(stream, peer));
                                    continue;
                                }
                                clients.insert(session.id, peer);
                            }

                            info!("New connection from {}", peer);
                            self.handle_connection(stream, peer, session);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received");
                }
            }
        }

        Ok(())
    }

    /// Tell a client over the limit why it is refused, then close.
    async fn reject_overloaded(stream: TcpStream, peer: SocketAddr) {
        let mut ws = match timeout(REFUSAL_HANDSHAKE_TIMEOUT, accept_async(stream)).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                debug!("WebSocket handshake failed for {}: {}", peer, e);
                return;
            }
            Err(_) => return,
        };

        let refusal = ServerMessage::Error(ServerError {
            code: ErrorCode::ServerOverloaded,
            message: "Connection limit reached".to_string(),
        });
        if let Ok(text) = refusal.to_json() {
            let _ = ws.send(Message::Text(text)).await;
        }
        let _ = ws.close(None).await;
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, mut session: ClientSession) {
        let clients = self.clients.clone();
        let dispatcher = self.dispatcher.clone();
        let idle_timeout = self.config.idle_timeout;
        let mut events_rx = dispatcher.host.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match timeout(idle_timeout, accept_async(stream)).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    error!("WebSocket handshake failed for {}: {}", peer, e);
                    clients.write().await.remove(&session.id);
                    return;
                }
                Err(_) => {
                    debug!("WebSocket handshake timed out for {}", peer);
                    clients.write().await.remove(&session.id);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let clock = SystemClock;

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Only client traffic resets the idle timer
            let idle = sleep(idle_timeout);
            tokio::pin!(idle);

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let reply = match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(client_msg) => Some(dispatcher.handle(&mut session, client_msg, clock.now()).await),
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", peer, e);
                                    Some(ServerMessage::Error(ServerError {
                                        code: ErrorCode::InvalidMessage,
                                        message: "Invalid message format".to_string(),
                                    }))
                                }
                            },
                            Some(Ok(Message::Binary(data))) => match SubmitFrame::from_bytes(&data) {
                                Ok(frame) => Some(dispatcher.handle_frame(&session, frame).await),
                                Err(e) => {
                                    debug!("Invalid frame from {}: {}", peer, e);
                                    Some(ServerMessage::Error(ServerError {
                                        code: ErrorCode::InvalidMessage,
                                        message: "Invalid binary frame".to_string(),
                                    }))
                                }
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", peer);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", peer, e);
                                break;
                            }
                            _ => None,
                        };

                        idle.as_mut().reset(Instant::now() + idle_timeout);
                        if let Some(reply) = reply {
                            if msg_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    event = events_rx.recv() => {
                        match event {
                            Ok(event) if session.address.is_some() => {
                                let _ = msg_tx.send(ServerMessage::Event(EventNotice::from(&event))).await;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(session = %session.id, skipped, "Event stream lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = &mut idle => {
                        info!("Client {} idle for {:?}, closing", peer, idle_timeout);
                        break;
                    }
                    _ = shutdown_rx.changed() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Flush queued replies, then close
            drop(msg_tx);
            let _ = sender_task.await;
            clients.write().await.remove(&session.id);
            info!("Client {} cleaned up", peer);
        });
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get connected client count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::moves::Move;
    use crate::game::outcome::Outcome;
    use crate::game::state::{GameState, Winner};
    use crate::host::executor::Host;
    use crate::ledger::InMemoryLedger;
    use crate::game::machine::ProtocolConfig;
    use crate::network::auth::{AuthConfig, TokenClaims};
    use crate::network::protocol::{ApproveRequest, AuthRequest, CreateGameRequest, JoinGameRequest, RevealRequest};
    use crate::proof::commitment::CommitmentPreimage;
    use crate::proof::public_inputs::ProofPublicInputs;
    use crate::proof::verify::DigestProofVerifier;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    const SECRET: &str = "gateway-test-secret-0123456789";
    const NOW: Timestamp = 1_800_000_000;

    fn token_addr() -> Address { Address::derive("wager-token") }

    fn jwt(sub: &str) -> String {
        let claims = TokenClaims { sub: sub.into(), exp: NOW + 600, iat: NOW, iss: None, aud: None };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn dispatcher() -> (Dispatcher, ManualClock) {
        let clock = ManualClock::new(NOW);
        let ledger = InMemoryLedger::with_genesis(
            &token_addr(),
            &[(Address::derive("alice"), 1_000), (Address::derive("bob"), 1_000)],
        )
        .unwrap();
        let host = Host::new(ProtocolConfig::default(), ledger, DigestProofVerifier, clock.clone());
        let (handle, _task) = HostHandle::spawn(host);
        let auth = Authenticator::new(&AuthConfig { secret: Some(SECRET.into()), ..Default::default() }).unwrap();
        (Dispatcher::new(handle, Some(auth), "test"), clock)
    }

    async fn login(dispatcher: &Dispatcher, sub: &str) -> ClientSession {
        let mut session = ClientSession::new();
        let reply = dispatcher
            .handle(&mut session, ClientMessage::Auth(AuthRequest { token: jwt(sub), client_version: String::new() }), NOW)
            .await;
        assert!(matches!(reply, ServerMessage::AuthResult(AuthResult { success: true, .. })));
        assert_eq!(session.address, Some(Address::derive(sub)));

        let reply = dispatcher
            .handle(
                &mut session,
                ClientMessage::Approve(ApproveRequest { request_id: 0, token: token_addr().to_hex(), amount: "1000".into() }),
                NOW,
            )
            .await;
        assert!(matches!(reply, ServerMessage::Approved { request_id: 0 }));
        session
    }

    fn expect_receipt(reply: ServerMessage, request_id: u64) -> EventNotice {
        match reply {
            ServerMessage::Receipt(info) => {
                assert_eq!(info.request_id, request_id);
                info.notice
            }
            other => panic!("expected receipt, got {other:?}"),
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
    }

    #[tokio::test]
    async fn test_requests_need_authentication() {
        let (dispatcher, _clock) = dispatcher();
        let mut session = ClientSession::new();

        let reply = dispatcher
            .handle(&mut session, ClientMessage::Withdraw { request_id: 3, game_id: 1 }, NOW)
            .await;
        match reply {
            ServerMessage::Rejected(r) => {
                assert_eq!(r.code, ErrorCode::NotAuthenticated);
                assert_eq!(r.request_id, Some(3));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let bad = dispatcher
            .handle(&mut session, ClientMessage::Auth(AuthRequest { token: "x.y.z".into(), client_version: String::new() }), NOW)
            .await;
        match bad {
            ServerMessage::AuthResult(result) => {
                assert!(!result.success);
                assert_eq!(result.code, Some(ErrorCode::AuthFailed));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(session.address.is_none());

        let expired = dispatcher
            .handle(&mut session, ClientMessage::Auth(AuthRequest { token: jwt("alice"), client_version: String::new() }), NOW + 601)
            .await;
        match expired {
            ServerMessage::AuthResult(result) => assert_eq!(result.code, Some(ErrorCode::TokenExpired)),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(session.address.is_none());
    }

    #[tokio::test]
    async fn test_round_over_dispatcher() {
        let (dispatcher, clock) = dispatcher();
        let mut alice = login(&dispatcher, "alice").await;
        let mut bob = login(&dispatcher, "bob").await;
        let preimage = CommitmentPreimage::generate(Move::Paper);

        let create = ClientMessage::CreateGame(CreateGameRequest {
            request_id: 1,
            token: token_addr().to_hex(),
            stake: "250".into(),
            commitment: preimage.commitment().to_hex(),
            timeout_secs: 600,
        });
        expect_receipt(dispatcher.handle(&mut alice, create, clock.now()).await, 1);

        let join = ClientMessage::JoinGame(JoinGameRequest { request_id: 2, game_id: 1, player_move: "rock".into() });
        expect_receipt(dispatcher.handle(&mut bob, join, clock.now()).await, 2);

        let proof = DigestProofVerifier::prove(ProofPublicInputs::from_round(Move::Paper, Move::Rock, Outcome::First));
        let reveal = ClientMessage::Reveal(RevealRequest {
            request_id: 3,
            game_id: 1,
            player_move: "paper".into(),
            salt: preimage.salt.to_hex(),
            proof: hex::encode(&proof.data),
            public_inputs: proof.public_inputs.to_m31_array(),
        });

        // Only the committer may reveal
        match dispatcher.handle(&mut bob, reveal.clone(), clock.now()).await {
            ServerMessage::Rejected(r) => assert_eq!(r.code, ErrorCode::PreconditionViolation),
            other => panic!("unexpected: {other:?}"),
        }
        expect_receipt(dispatcher.handle(&mut alice, reveal, clock.now()).await, 3);

        match dispatcher.handle(&mut bob, ClientMessage::GetGame { game_id: 1 }, clock.now()).await {
            ServerMessage::Game(view) => {
                assert_eq!(view.state, GameState::Settled);
                assert_eq!(view.winner, Some(Winner::Committer));
                assert_eq!(view.stake, "250");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let notice = expect_receipt(
            dispatcher.handle(&mut alice, ClientMessage::Withdraw { request_id: 4, game_id: 1 }, clock.now()).await,
            4,
        );
        assert_eq!(notice.sequence, 4);

        match dispatcher.handle(&mut alice, ClientMessage::Balance { token: token_addr().to_hex() }, clock.now()).await {
            ServerMessage::Balance { balance, .. } => assert_eq!(balance, "1250"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_protocol_errors_map_to_codes() {
        let (dispatcher, _clock) = dispatcher();
        let mut carol = ClientSession::new();
        carol.address = Some(Address::derive("carol"));

        let create = ClientMessage::CreateGame(CreateGameRequest {
            request_id: 9,
            token: token_addr().to_hex(),
            stake: "10".into(),
            commitment: CommitmentPreimage::generate(Move::Rock).commitment().to_hex(),
            timeout_secs: 600,
        });
        match dispatcher.handle(&mut carol, create, NOW).await {
            ServerMessage::Rejected(r) => assert_eq!(r.code, ErrorCode::InsufficientAllowance),
            other => panic!("unexpected: {other:?}"),
        }

        match dispatcher.handle(&mut carol, ClientMessage::GetGame { game_id: 5 }, NOW).await {
            ServerMessage::Rejected(r) => assert_eq!(r.code, ErrorCode::GameNotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_frame_submission() {
        let (dispatcher, _clock) = dispatcher();
        let alice = login(&dispatcher, "alice").await;

        let frame = SubmitFrame {
            request_id: 21,
            tx: crate::host::Transaction::CreateGame(crate::game::machine::CreateGame {
                token: token_addr(),
                stake: 5,
                commitment: CommitmentPreimage::generate(Move::Scissors).commitment(),
                timeout_secs: 120,
            }),
        };
        let decoded = SubmitFrame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        expect_receipt(dispatcher.handle_frame(&alice, decoded).await, 21);
    }

    #[tokio::test]
    async fn test_gateway_shutdown() {
        let (dispatcher, _clock) = dispatcher();
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        };
        let gateway = Arc::new(Gateway::new(config, dispatcher.host.clone(), None));

        let runner = gateway.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        gateway.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok());
        assert_eq!(gateway.connection_count().await, 0);
    }

    async fn serve_gateway(config: ServerConfig) -> (Arc<Gateway>, SocketAddr) {
        let (dispatcher, _clock) = dispatcher();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gateway = Arc::new(Gateway::new(config, dispatcher.host.clone(), None));

        let runner = gateway.clone();
        tokio::spawn(async move { runner.serve(listener).await });
        (gateway, addr)
    }

    async fn wait_for_count(gateway: &Gateway, expected: usize) {
        for _ in 0..100 {
            if gateway.connection_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("connection count never reached {expected}");
    }

    #[tokio::test]
    async fn test_idle_connection_closed_and_slot_freed() {
        let config = ServerConfig {
            max_connections: 1,
            idle_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let (gateway, addr) = serve_gateway(config).await;

        let (mut silent, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        assert_eq!(gateway.connection_count().await, 1);

        // The server closes the socket without any client traffic
        let closed = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match silent.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "idle socket left open");
        wait_for_count(&gateway, 0).await;

        // The freed slot admits a new client
        let (mut next, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        assert_eq!(gateway.connection_count().await, 1);
        next.send(Message::Text(ClientMessage::Ping { timestamp: 7 }.to_json().unwrap())).await.unwrap();
        match next.next().await {
            Some(Ok(Message::Text(text))) => {
                assert!(matches!(ServerMessage::from_json(&text).unwrap(), ServerMessage::Pong { timestamp: 7, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
        gateway.shutdown();
    }

    #[tokio::test]
    async fn test_connection_over_limit_gets_overloaded_error() {
        let config = ServerConfig {
            max_connections: 1,
            ..Default::default()
        };
        let (gateway, addr) = serve_gateway(config).await;

        let (_first, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        assert_eq!(gateway.connection_count().await, 1);

        let (mut second, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), second.next()).await.unwrap();
        match reply {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text).unwrap() {
                ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::ServerOverloaded),
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(gateway.connection_count().await, 1);
        gateway.shutdown();
    }
}
