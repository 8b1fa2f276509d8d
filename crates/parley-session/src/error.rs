//! Error types for the session layer.

use parley_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No entry exists for the given connection. Happens when a command
    /// races with a disconnect.
    #[error("no session for connection {0}")]
    ConnectionNotFound(ConnectionId),

    /// The nick collides with the reserved temporary-connection pattern
    /// (or is empty).
    #[error("nick {0:?} is reserved")]
    NickReserved(String),

    /// Another connection already holds this nick.
    #[error("nick {0} already registered")]
    NickTaken(String),

    /// The connection was already promoted to a nick. A connection holds
    /// at most one identity at a time.
    #[error("connection {connection} is already registered as {nick}")]
    AlreadyRegistered {
        connection: ConnectionId,
        nick: String,
    },

    /// No connected user holds this nick.
    #[error("user {0} is not connected")]
    NotRegistered(String),

    /// The connection's outbound channel is closed; the reader task has
    /// already torn it down.
    #[error("failed to send to connection {0}")]
    SendFailed(ConnectionId),
}
