//! WebSocket transport implementation using `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
///
/// Shared by accepted and dialed connections so ids never collide within
/// one process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

type ServerWsStream =
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;
type ClientWsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// The two sink flavours tungstenite produces. Accepted connections
/// wrap a plain `TcpStream`; dialed ones a `MaybeTlsStream`.
///
/// Sink and source are split so one connection can send and receive
/// concurrently: the server parks a reader in `recv` while a dedicated
/// writer task drains the outbound queue through `send`.
enum WsSink {
    Server(SplitSink<ServerWsStream, Message>),
    Client(SplitSink<ClientWsStream, Message>),
}

/// The receive halves matching [`WsSink`].
enum WsSource {
    Server(SplitStream<ServerWsStream>),
    Client(SplitStream<ClientWsStream>),
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws =
            tokio_tungstenite::accept_async(stream).await.map_err(|e| {
                TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = next_connection_id();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, source) = ws.split();
        Ok(WebSocketConnection {
            id,
            peer_addr: Some(addr),
            sink: Arc::new(Mutex::new(WsSink::Server(sink))),
            source: Arc::new(Mutex::new(WsSource::Server(source))),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection, accepted or dialed.
#[derive(Clone)]
pub struct WebSocketConnection {
    id: ConnectionId,
    peer_addr: Option<std::net::SocketAddr>,
    sink: Arc<Mutex<WsSink>>,
    source: Arc<Mutex<WsSource>>,
}

impl WebSocketConnection {
    /// Dials a remote WebSocket endpoint.
    ///
    /// Used by clients reaching the chat server and by peers attempting a
    /// direct connection to an introduced endpoint.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let (ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .map_err(|e| {
                    TransportError::ConnectFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    ))
                })?;

        let id = next_connection_id();
        tracing::debug!(%id, addr, "dialed WebSocket connection");

        let (sink, source) = ws.split();
        Ok(Self {
            id,
            peer_addr: None,
            sink: Arc::new(Mutex::new(WsSink::Client(sink))),
            source: Arc::new(Mutex::new(WsSource::Client(source))),
        })
    }

    /// The remote address as observed by this side, if known.
    ///
    /// For accepted connections this is the externally reachable endpoint
    /// the server reports during a rendezvous introduction.
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.peer_addr
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        let res = match &mut *self.sink.lock().await {
            WsSink::Server(ws) => ws.send(msg).await,
            WsSink::Client(ws) => ws.send(msg).await,
        };
        res.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = match &mut *self.source.lock().await {
                WsSource::Server(ws) => ws.next().await,
                WsSource::Client(ws) => ws.next().await,
            };
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let res = match &mut *self.sink.lock().await {
            WsSink::Server(ws) => ws.close().await,
            WsSink::Client(ws) => ws.close().await,
        };
        res.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
