//! Per-connection handler: attach, read loop, teardown.
//!
//! Each accepted connection gets its own Tokio task running this
//! handler, plus a writer task draining the connection's outbound queue.
//! Every inbound frame is dispatched as peer-origin traffic; a failed
//! command is isolated to that one frame unless the failure is
//! connection-fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use parley_chat::RoomChange;
use parley_protocol::{
    Codec, CommandId, Origin, OutSystemMessage, ProtocolError, RoomClosed,
    RoomRefreshed, code, frame, id,
};
use parley_transport::{Connection, ConnectionId, WebSocketConnection};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::ParleyError;

/// Shared context handed to every command handler for one connection.
pub struct HandlerCtx {
    pub(crate) state: Arc<ServerState>,
    pub(crate) connection: ConnectionId,
    /// The remote endpoint as the server observed it; advertised to
    /// rendezvous targets as the direct-connect address.
    pub(crate) peer_addr: Option<SocketAddr>,
}

impl HandlerCtx {
    /// Encodes a typed outbound command into a ready frame.
    pub(crate) fn encode<T: Serialize>(
        &self,
        id: CommandId,
        payload: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        Ok(frame::encode(id, &self.state.codec.encode(payload)?))
    }

    /// The connection this context serves.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// Queues a ready frame toward this connection. Delivery failure
    /// means the writer is gone; the read loop will notice on its own.
    pub async fn reply_frame(&self, bytes: Vec<u8>) {
        let sessions = self.state.sessions.lock().await;
        if let Err(error) = sessions.send_to(self.connection, bytes) {
            tracing::debug!(conn = %self.connection, %error, "reply dropped");
        }
    }

    /// Queues a typed command toward this connection.
    pub async fn reply<T: Serialize>(
        &self,
        id: CommandId,
        payload: &T,
    ) -> Result<(), ProtocolError> {
        let bytes = self.encode(id, payload)?;
        self.reply_frame(bytes).await;
        Ok(())
    }

    /// Queues a coded system message toward this connection.
    pub async fn reply_system(
        &self,
        code: u16,
        params: Vec<String>,
    ) -> Result<(), ProtocolError> {
        self.reply(id::OUT_SYSTEM_MESSAGE, &OutSystemMessage::new(code, params))
            .await
    }

    /// Converts a chat-state failure into its coded system reply.
    pub(crate) async fn reply_chat_error(
        &self,
        error: &parley_chat::ChatError,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(conn = %self.connection, %error, "chat operation refused");
        self.reply_system(error.system_code(), error.params()).await
    }

    /// The nick this connection registered, if any.
    pub async fn nick(&self) -> Option<String> {
        self.state
            .sessions
            .lock()
            .await
            .nick_of(self.connection)
            .map(str::to_string)
    }

    /// Like [`nick`](Self::nick), but answers an unregistered connection
    /// with an access-denied system message.
    pub(crate) async fn require_nick(
        &self,
    ) -> Result<Option<String>, ProtocolError> {
        match self.nick().await {
            Some(nick) => Ok(Some(nick)),
            None => {
                self.reply_system(
                    code::ACCESS_DENIED,
                    vec![self.connection.to_string()],
                )
                .await?;
                Ok(None)
            }
        }
    }

    /// Sends one frame to every reachable recipient.
    pub async fn broadcast(&self, recipients: &[String], bytes: &[u8]) {
        self.state.sessions.lock().await.broadcast(recipients, bytes);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ParleyError> {
    let conn_id = conn.id();
    let peer_addr = conn.peer_addr();
    tracing::debug!(%conn_id, "handling new connection");

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let shutdown = state.sessions.lock().await.attach(conn_id, tx);

    let conn = Arc::new(conn);
    let writer_conn = Arc::clone(&conn);
    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(error) = writer_conn.send(&bytes).await {
                tracing::debug!(error = %error, "outbound send failed");
                break;
            }
        }
    });

    let ctx = Arc::new(HandlerCtx {
        state: Arc::clone(&state),
        connection: conn_id,
        peer_addr,
    });

    loop {
        tokio::select! {
            // The liveness sweep signals this when the pong window
            // elapses; teardown below then closes the socket.
            _ = shutdown.notified() => {
                tracing::info!(%conn_id, "shutdown signalled");
                break;
            }
            received = conn.recv() => match received {
                Ok(Some(bytes)) => {
                    let result = state
                        .registry
                        .dispatch(Arc::clone(&ctx), Origin::Peer, &bytes)
                        .await;
                    if let Err(error) = result {
                        if error.is_isolated() {
                            // Bad frame, unknown id, wrong origin: this
                            // message only.
                            tracing::debug!(%conn_id, %error, "command rejected");
                        } else {
                            tracing::debug!(%conn_id, %error, "connection-fatal failure");
                            break;
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!(%conn_id, "connection closed cleanly");
                    break;
                }
                Err(error) => {
                    tracing::debug!(%conn_id, %error, "recv error");
                    break;
                }
            }
        }
    }

    disconnect(&state, conn_id).await;
    writer.abort();
    let _ = conn.close().await;
    Ok(())
}

/// Tears down everything keyed to a connection. Identical for graceful
/// close, abrupt disconnect, and pong timeout; safe to call twice.
pub(crate) async fn disconnect(state: &Arc<ServerState>, connection: ConnectionId) {
    let nick = state.sessions.lock().await.detach(connection);
    if let Some(nick) = nick {
        unregister_cleanup(state, &nick).await;
    }
}

/// Removes a user from chat state and abandons their rendezvous
/// handshakes, emitting all resulting notifications.
pub(crate) async fn unregister_cleanup(state: &Arc<ServerState>, nick: &str) {
    let notifications: Vec<(Vec<String>, Vec<u8>)> = {
        let mut chat = state.chat.lock().await;
        let changes = chat.unregister_user(nick);
        changes
            .iter()
            .filter_map(|change| room_change_frame(state, &chat, change))
            .collect()
    };
    {
        let sessions = state.sessions.lock().await;
        for (recipients, bytes) in &notifications {
            sessions.broadcast(recipients, bytes);
        }
    }

    let abandoned = state.pending.lock().await.abandon_for(nick);
    if abandoned.is_empty() {
        return;
    }
    let sessions = state.sessions.lock().await;
    for entry in abandoned {
        let other = if entry.requester == nick {
            &entry.target
        } else {
            &entry.requester
        };
        let notice = OutSystemMessage::new(
            code::PEER_CONNECT_TIMEOUT,
            vec![entry.requester.clone(), entry.target.clone()],
        );
        let Ok(content) = state.codec.encode(&notice) else {
            continue;
        };
        let bytes = frame::encode(id::OUT_SYSTEM_MESSAGE, &content);
        if let Err(error) = sessions.send_to_nick(other, bytes) {
            tracing::debug!(nick = %other, %error, "abandon notice dropped");
        }
    }
}

/// Builds the broadcast frame for one room change, snapshotting under
/// the caller's chat guard.
pub(crate) fn room_change_frame(
    state: &ServerState,
    chat: &parley_chat::ChatState,
    change: &RoomChange,
) -> Option<(Vec<String>, Vec<u8>)> {
    match change {
        RoomChange::Refreshed { room, recipients } => {
            let snapshot = chat.snapshot(room).ok()?;
            let content = state
                .codec
                .encode(&RoomRefreshed {
                    room: snapshot,
                    removed_messages: Vec::new(),
                })
                .ok()?;
            Some((
                recipients.clone(),
                frame::encode(id::ROOM_REFRESHED, &content),
            ))
        }
        RoomChange::Closed { room, recipients } => {
            let content = state
                .codec
                .encode(&RoomClosed { room: room.clone() })
                .ok()?;
            Some((recipients.clone(), frame::encode(id::ROOM_CLOSED, &content)))
        }
    }
}
