//! Session types: the server's record of one client connection.

use std::sync::Arc;
use std::time::Instant;

use parley_transport::ConnectionId;
use tokio::sync::{Notify, mpsc};

/// Handle for queueing encoded frames toward one connection. The writer
/// task on the other end drains it onto the socket.
pub type OutboundSender = mpsc::UnboundedSender<Vec<u8>>;

/// Configuration for session liveness.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between server-initiated pings, in seconds.
    pub ping_interval_secs: u64,

    /// How long a connection may go without a pong before it is treated
    /// as gone. Must exceed the ping interval.
    pub pong_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 20,
            pong_timeout_secs: 60,
        }
    }
}

/// One tracked connection.
///
/// A connection starts with only its transport identity (`conn-<n>`) and
/// gains a nick when registration succeeds. `last_pong` starts at attach
/// time so a fresh connection is never culled before its first ping.
#[derive(Debug)]
pub struct Session {
    /// Transport-scoped identity; never reused within a process.
    pub connection: ConnectionId,

    /// The registered nick, once promoted. `None` for connections that
    /// have not registered (or have unregistered).
    pub nick: Option<String>,

    /// Outbound frame queue toward this connection.
    pub sender: OutboundSender,

    /// When the connection last answered a ping (or was attached).
    pub last_pong: Instant,

    /// Wakes the connection's read loop for out-of-band teardown. The
    /// read loop selects on this next to `recv`, so signalling it makes
    /// the handler run its normal close path.
    pub shutdown: Arc<Notify>,
}
