//! Transport abstraction layer for Parley.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying command frames. The chat server, the
//! rendezvous-aware peers, and the client all speak through these traits;
//! only this crate knows about sockets.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Prefix used when rendering a [`ConnectionId`] as text.
///
/// Unregistered connections are addressed by this rendered form until
/// registration promotes them to a nick, so the session layer rejects any
/// nick that could collide with it.
pub const CONNECTION_NAME_PREFIX: &str = "conn-";

/// Opaque identifier for a connection.
///
/// This is the *temporary* identity of a peer: it exists from accept until
/// the connection closes, and is superseded (but not replaced) by a nick
/// once the peer registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Returns `true` if `name` is syntactically a rendered connection id
    /// (`conn-<digits>`). Such names are reserved and can never be
    /// registered as nicks.
    pub fn matches_reserved_name(name: &str) -> bool {
        match name.strip_prefix(CONNECTION_NAME_PREFIX) {
            Some(rest) => {
                !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
            }
            None => false,
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CONNECTION_NAME_PREFIX, self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive byte frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display_uses_reserved_prefix() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert!(ConnectionId::matches_reserved_name(&id.to_string()));
    }

    #[test]
    fn test_matches_reserved_name_rejects_ordinary_nicks() {
        assert!(!ConnectionId::matches_reserved_name("alice"));
        assert!(!ConnectionId::matches_reserved_name("conn-"));
        assert!(!ConnectionId::matches_reserved_name("conn-7b"));
        assert!(!ConnectionId::matches_reserved_name("connect-1"));
    }

    #[test]
    fn test_matches_reserved_name_accepts_any_digit_run() {
        assert!(ConnectionId::matches_reserved_name("conn-0"));
        assert!(ConnectionId::matches_reserved_name("conn-123456789"));
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
