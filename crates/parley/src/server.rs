//! `ParleyServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → session → chat →
//! rendezvous. The builder configures addresses, the admin secret, and
//! timing windows, and can fold externally supplied handler tables into
//! the dispatch registry before startup.

use std::sync::Arc;
use std::time::Duration;

use parley_chat::ChatState;
use parley_protocol::{
    Codec, CommandRegistry, JsonCodec, OutSystemMessage, code, frame, id,
};
use parley_rendezvous::{PendingTable, RelayConfig, RelayService};
use parley_session::{SessionConfig, SessionRegistry};
use parley_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::commands;
use crate::handler::{self, HandlerCtx};
use crate::ParleyError;

/// Shared server state passed to each connection handler task.
///
/// Lock order where more than one guard is needed: `chat` before
/// `sessions`; `pending` never overlaps either. Broadcast frames are
/// built under the `chat` guard and sent under the `sessions` guard.
pub(crate) struct ServerState {
    pub(crate) chat: Mutex<ChatState>,
    pub(crate) sessions: Mutex<SessionRegistry>,
    pub(crate) pending: Mutex<PendingTable>,
    pub(crate) registry: CommandRegistry<HandlerCtx>,
    pub(crate) codec: JsonCodec,
    /// The relay address advertised in rendezvous instructions.
    pub(crate) relay_addr: String,
    pub(crate) admin_secret: Option<String>,
}

/// Builder for configuring and starting a Parley server.
pub struct ParleyServerBuilder {
    bind_addr: String,
    relay_bind_addr: String,
    admin_secret: Option<String>,
    session_config: SessionConfig,
    relay_config: RelayConfig,
    rendezvous_window_secs: u64,
    plugins: Option<CommandRegistry<HandlerCtx>>,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:4080".to_string(),
            relay_bind_addr: "127.0.0.1:0".to_string(),
            admin_secret: None,
            session_config: SessionConfig::default(),
            relay_config: RelayConfig::default(),
            rendezvous_window_secs: 60,
            plugins: None,
        }
    }

    /// Sets the chat server's bind address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the rendezvous relay's bind address.
    pub fn relay_bind(mut self, addr: &str) -> Self {
        self.relay_bind_addr = addr.to_string();
        self
    }

    /// Enables the password-gated admin command.
    pub fn admin_secret(mut self, secret: &str) -> Self {
        self.admin_secret = Some(secret.to_string());
        self
    }

    /// Sets ping/pong liveness timing.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets relay timing (how long an unclaimed parked channel lives).
    pub fn relay_config(mut self, config: RelayConfig) -> Self {
        self.relay_config = config;
        self
    }

    /// Sets how long an unanswered rendezvous handshake may live.
    pub fn rendezvous_window(mut self, secs: u64) -> Self {
        self.rendezvous_window_secs = secs;
        self
    }

    /// Folds externally supplied handler registrations into the dispatch
    /// table. Later registrations win over built-ins.
    pub fn plugins(mut self, registry: CommandRegistry<HandlerCtx>) -> Self {
        self.plugins = Some(registry);
        self
    }

    /// Binds both listeners and assembles the server.
    pub async fn build(self) -> Result<ParleyServer, ParleyError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let relay = RelayService::bind(
            self.relay_bind_addr
                .parse()
                .map_err(|_| parley_transport::TransportError::ConnectionClosed(
                    format!("invalid relay address {}", self.relay_bind_addr),
                ))?,
            self.relay_config,
        )
        .await?;
        let relay_addr = relay.local_addr()?.to_string();

        let mut registry = commands::registry(JsonCodec);
        if let Some(plugins) = self.plugins {
            registry.merge(plugins);
        }

        let state = Arc::new(ServerState {
            chat: Mutex::new(ChatState::new()),
            sessions: Mutex::new(SessionRegistry::new()),
            pending: Mutex::new(PendingTable::new()),
            registry,
            codec: JsonCodec,
            relay_addr,
            admin_secret: self.admin_secret,
        });

        Ok(ParleyServer {
            transport,
            relay: Some(relay),
            state,
            session_config: self.session_config,
            rendezvous_window_secs: self.rendezvous_window_secs,
        })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parley server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParleyServer {
    transport: WebSocketTransport,
    relay: Option<RelayService>,
    state: Arc<ServerState>,
    session_config: SessionConfig,
    rendezvous_window_secs: u64,
}

impl ParleyServer {
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// The chat listener's bound address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The relay service's bound address, as advertised to clients.
    pub fn relay_addr(&self) -> &str {
        &self.state.relay_addr
    }

    /// Runs the server: relay, liveness pings, rendezvous sweep, and the
    /// accept loop. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ParleyError> {
        if let Some(relay) = self.relay.take() {
            tokio::spawn(relay.run());
        }
        self.spawn_ping_task();
        self.spawn_rendezvous_sweep();

        tracing::info!("Parley server running");
        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handler::handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Pings every connection on an interval. A connection silent past
    /// the pong window has its read loop signalled, so its handler
    /// closes the socket and tears the session down exactly like a
    /// graceful disconnect.
    fn spawn_ping_task(&self) {
        let state = Arc::clone(&self.state);
        let interval = Duration::from_secs(self.session_config.ping_interval_secs);
        let window = Duration::from_secs(self.session_config.pong_timeout_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let ping = frame::encode(id::PING, &[]);
                let sessions = state.sessions.lock().await;
                for conn in sessions.connection_ids() {
                    if let Err(error) = sessions.send_to(conn, ping.clone()) {
                        tracing::debug!(%conn, %error, "ping not queued");
                    }
                }
                for conn in sessions.stale_connections(window) {
                    tracing::info!(%conn, "pong window elapsed, closing");
                    sessions.signal_shutdown(conn);
                }
            }
        });
    }

    /// Abandons rendezvous handshakes that outlived their window and
    /// notifies both sides.
    fn spawn_rendezvous_sweep(&self) {
        let state = Arc::clone(&self.state);
        let window = Duration::from_secs(self.rendezvous_window_secs);
        let sweep_every = if window.is_zero() {
            Duration::from_millis(100)
        } else {
            window / 2
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            loop {
                ticker.tick().await;
                let expired = state.pending.lock().await.expire_stale(window);
                if expired.is_empty() {
                    continue;
                }
                let sessions = state.sessions.lock().await;
                for entry in expired {
                    let notice = OutSystemMessage::new(
                        code::PEER_CONNECT_TIMEOUT,
                        vec![entry.requester.clone(), entry.target.clone()],
                    );
                    let Ok(content) = state.codec.encode(&notice) else {
                        continue;
                    };
                    let bytes = frame::encode(id::OUT_SYSTEM_MESSAGE, &content);
                    for nick in [&entry.requester, &entry.target] {
                        if let Err(error) = sessions.send_to_nick(nick, bytes.clone()) {
                            tracing::debug!(%nick, %error, "timeout notice dropped");
                        }
                    }
                }
            }
        });
    }
}
