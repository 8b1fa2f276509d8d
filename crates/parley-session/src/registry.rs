//! The session registry: tracks every live connection and its identity.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself — it uses plain
//! `HashMap`s, not concurrent ones. The server wraps it in a single mutex
//! and holds the guard only long enough to mutate or to clone the sender
//! handles it needs; actual sends happen after the guard is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use parley_transport::ConnectionId;

use crate::{OutboundSender, Session, SessionError};

/// Maps connection ids to sessions and registered nicks back to
/// connections.
///
/// ## Lifecycle
///
/// ```text
/// attach() ──→ promote() ──→ demote() ──→ detach()
///    │             │                         ▲
///    │             └── register succeeded    │
///    └──────────── unregistered path ────────┘
/// ```
#[derive(Default)]
pub struct SessionRegistry {
    /// All live connections, keyed by transport identity.
    sessions: HashMap<ConnectionId, Session>,

    /// Index from registered nick to connection, kept in sync with the
    /// `nick` field of the sessions above.
    nicks: HashMap<String, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly accepted connection under its temporary identity
    /// and returns the shutdown signal its read loop must select on.
    ///
    /// Replaces any stale entry with the same id (ids are never reused,
    /// so this only matters if a reader task leaked its entry).
    pub fn attach(
        &mut self,
        connection: ConnectionId,
        sender: OutboundSender,
    ) -> Arc<Notify> {
        let shutdown = Arc::new(Notify::new());
        self.sessions.insert(
            connection,
            Session {
                connection,
                nick: None,
                sender,
                last_pong: Instant::now(),
                shutdown: Arc::clone(&shutdown),
            },
        );
        tracing::debug!(%connection, "connection attached");
        shutdown
    }

    /// Removes a connection entirely, returning the nick it held, if any.
    /// The caller propagates that nick into the room engine's unregister.
    pub fn detach(&mut self, connection: ConnectionId) -> Option<String> {
        let session = self.sessions.remove(&connection)?;
        if let Some(nick) = &session.nick {
            self.nicks.remove(nick);
        }
        tracing::debug!(%connection, nick = ?session.nick, "connection detached");
        session.nick
    }

    /// Checks a nick against the reserved temporary-connection pattern
    /// without mutating anything. Empty nicks are reserved too.
    pub fn validate_nick(nick: &str) -> Result<(), SessionError> {
        if nick.is_empty() || ConnectionId::matches_reserved_name(nick) {
            return Err(SessionError::NickReserved(nick.to_string()));
        }
        Ok(())
    }

    /// Binds a nick to a connection after successful registration.
    ///
    /// # Errors
    /// - [`SessionError::NickReserved`] — reserved or empty nick
    /// - [`SessionError::NickTaken`] — another connection holds it
    /// - [`SessionError::AlreadyRegistered`] — this connection already
    ///   has a nick
    /// - [`SessionError::ConnectionNotFound`] — unknown connection
    pub fn promote(
        &mut self,
        connection: ConnectionId,
        nick: &str,
    ) -> Result<(), SessionError> {
        Self::validate_nick(nick)?;
        if self.nicks.contains_key(nick) {
            return Err(SessionError::NickTaken(nick.to_string()));
        }
        let session = self
            .sessions
            .get_mut(&connection)
            .ok_or(SessionError::ConnectionNotFound(connection))?;
        if let Some(existing) = &session.nick {
            return Err(SessionError::AlreadyRegistered {
                connection,
                nick: existing.clone(),
            });
        }
        session.nick = Some(nick.to_string());
        self.nicks.insert(nick.to_string(), connection);
        tracing::info!(%connection, nick, "connection promoted");
        Ok(())
    }

    /// Unbinds the nick from a connection (explicit unregister). The
    /// connection itself stays attached and may register again.
    pub fn demote(
        &mut self,
        connection: ConnectionId,
    ) -> Result<String, SessionError> {
        let session = self
            .sessions
            .get_mut(&connection)
            .ok_or(SessionError::ConnectionNotFound(connection))?;
        let nick = session
            .nick
            .take()
            .ok_or(SessionError::ConnectionNotFound(connection))?;
        self.nicks.remove(&nick);
        tracing::info!(%connection, nick, "connection demoted");
        Ok(nick)
    }

    /// The connection currently holding a nick.
    pub fn connection_for(&self, nick: &str) -> Option<ConnectionId> {
        self.nicks.get(nick).copied()
    }

    /// The nick a connection registered, if any.
    pub fn nick_of(&self, connection: ConnectionId) -> Option<&str> {
        self.sessions.get(&connection)?.nick.as_deref()
    }

    pub fn is_registered(&self, nick: &str) -> bool {
        self.nicks.contains_key(nick)
    }

    /// Clones the outbound sender for one connection.
    pub fn sender_of(
        &self,
        connection: ConnectionId,
    ) -> Result<OutboundSender, SessionError> {
        self.sessions
            .get(&connection)
            .map(|s| s.sender.clone())
            .ok_or(SessionError::ConnectionNotFound(connection))
    }

    /// Clones the outbound sender for a registered nick.
    pub fn sender_for(
        &self,
        nick: &str,
    ) -> Result<OutboundSender, SessionError> {
        let connection = self
            .connection_for(nick)
            .ok_or_else(|| SessionError::NotRegistered(nick.to_string()))?;
        self.sender_of(connection)
    }

    /// Queues a frame toward one connection.
    pub fn send_to(
        &self,
        connection: ConnectionId,
        frame: Vec<u8>,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get(&connection)
            .ok_or(SessionError::ConnectionNotFound(connection))?;
        session
            .sender
            .send(frame)
            .map_err(|_| SessionError::SendFailed(connection))
    }

    /// Queues a frame toward a registered nick.
    pub fn send_to_nick(
        &self,
        nick: &str,
        frame: Vec<u8>,
    ) -> Result<(), SessionError> {
        let connection = self
            .connection_for(nick)
            .ok_or_else(|| SessionError::NotRegistered(nick.to_string()))?;
        self.send_to(connection, frame)
    }

    /// Queues the same frame toward each nick in `recipients`. Nicks that
    /// are no longer connected are skipped; delivery is best-effort.
    pub fn broadcast(&self, recipients: &[String], frame: &[u8]) {
        for nick in recipients {
            if let Err(error) = self.send_to_nick(nick, frame.to_vec()) {
                tracing::debug!(nick, %error, "skipping unreachable recipient");
            }
        }
    }

    /// Records a pong from a connection, resetting its liveness clock.
    pub fn record_pong(&mut self, connection: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.last_pong = Instant::now();
        }
    }

    /// Wakes a connection's read loop so the handler closes the socket
    /// and tears the session down. The notification is buffered, so it
    /// reaches a loop that is currently mid-dispatch too. Unknown ids
    /// are ignored.
    pub fn signal_shutdown(&self, connection: ConnectionId) {
        if let Some(session) = self.sessions.get(&connection) {
            session.shutdown.notify_one();
        }
    }

    /// Connections that have gone longer than `timeout` without a pong.
    /// The caller tears these down exactly like graceful unregisters.
    pub fn stale_connections(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.sessions
            .values()
            .filter(|s| s.last_pong.elapsed() > timeout)
            .map(|s| s.connection)
            .collect()
    }

    /// All tracked connection ids (ping targets).
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    /// Number of tracked connections (registered or not).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of connections holding a registered nick.
    pub fn registered_count(&self) -> usize {
        self.nicks.len()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionRegistry`, following the naming convention
    //! `test_{function}_{scenario}_{expected}`.
    //!
    //! Liveness tests avoid sleeping: `Duration::ZERO` makes everything
    //! stale immediately, `Duration::from_secs(3600)` makes nothing stale.

    use tokio::sync::mpsc;

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    /// A sender whose receiver is kept alive, plus the receiver for
    /// asserting deliveries.
    fn channel() -> (OutboundSender, mpsc::UnboundedReceiver<Vec<u8>>) {
        mpsc::unbounded_channel()
    }

    fn registry_with(ids: &[u64]) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for id in ids {
            let (tx, rx) = channel();
            std::mem::forget(rx); // keep the channel open for the test
            registry.attach(cid(*id), tx);
        }
        registry
    }

    // =====================================================================
    // attach() / detach()
    // =====================================================================

    #[test]
    fn test_attach_tracks_connection() {
        let registry = registry_with(&[1]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.registered_count(), 0);
        assert!(registry.nick_of(cid(1)).is_none());
    }

    #[test]
    fn test_detach_unregistered_returns_no_nick() {
        let mut registry = registry_with(&[1]);
        assert_eq!(registry.detach(cid(1)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_registered_returns_nick_and_frees_it() {
        let mut registry = registry_with(&[1]);
        registry.promote(cid(1), "alice").unwrap();

        let nick = registry.detach(cid(1));

        assert_eq!(nick.as_deref(), Some("alice"));
        assert!(!registry.is_registered("alice"));
        assert!(registry.connection_for("alice").is_none());
    }

    #[test]
    fn test_detach_unknown_connection_is_a_no_op() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.detach(cid(99)), None);
    }

    // =====================================================================
    // promote() / demote()
    // =====================================================================

    #[test]
    fn test_promote_binds_nick_both_ways() {
        let mut registry = registry_with(&[1]);

        registry.promote(cid(1), "alice").unwrap();

        assert_eq!(registry.nick_of(cid(1)), Some("alice"));
        assert_eq!(registry.connection_for("alice"), Some(cid(1)));
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_promote_reserved_nick_rejected() {
        let mut registry = registry_with(&[1]);

        // The temporary-connection pattern itself.
        let result = registry.promote(cid(1), "conn-42");
        assert!(matches!(result, Err(SessionError::NickReserved(_))));

        // Empty nicks are reserved too.
        let result = registry.promote(cid(1), "");
        assert!(matches!(result, Err(SessionError::NickReserved(_))));

        // Near misses are ordinary nicks.
        registry.promote(cid(1), "conn-42x").unwrap();
    }

    #[test]
    fn test_promote_taken_nick_rejected() {
        let mut registry = registry_with(&[1, 2]);
        registry.promote(cid(1), "alice").unwrap();

        let result = registry.promote(cid(2), "alice");

        assert!(matches!(result, Err(SessionError::NickTaken(_))));
        assert!(registry.nick_of(cid(2)).is_none());
    }

    #[test]
    fn test_promote_twice_on_same_connection_rejected() {
        let mut registry = registry_with(&[1]);
        registry.promote(cid(1), "alice").unwrap();

        let result = registry.promote(cid(1), "alice2");

        assert!(matches!(
            result,
            Err(SessionError::AlreadyRegistered { .. })
        ));
        assert_eq!(registry.nick_of(cid(1)), Some("alice"));
    }

    #[test]
    fn test_promote_unknown_connection_rejected() {
        let mut registry = SessionRegistry::new();
        let result = registry.promote(cid(7), "alice");
        assert!(matches!(result, Err(SessionError::ConnectionNotFound(_))));
        // The nick index must not hold a dangling entry.
        assert!(!registry.is_registered("alice"));
    }

    #[test]
    fn test_demote_frees_nick_but_keeps_connection() {
        let mut registry = registry_with(&[1]);
        registry.promote(cid(1), "alice").unwrap();

        let nick = registry.demote(cid(1)).unwrap();

        assert_eq!(nick, "alice");
        assert_eq!(registry.len(), 1, "connection stays attached");
        assert!(registry.nick_of(cid(1)).is_none());

        // The nick and the connection are both reusable.
        registry.promote(cid(1), "alice").unwrap();
    }

    #[test]
    fn test_demote_unregistered_connection_rejected() {
        let mut registry = registry_with(&[1]);
        let result = registry.demote(cid(1));
        assert!(matches!(result, Err(SessionError::ConnectionNotFound(_))));
    }

    // =====================================================================
    // Delivery
    // =====================================================================

    #[test]
    fn test_send_to_nick_delivers_frame() {
        let mut registry = SessionRegistry::new();
        let (tx, mut rx) = channel();
        registry.attach(cid(1), tx);
        registry.promote(cid(1), "alice").unwrap();

        registry.send_to_nick("alice", vec![1, 2, 3]).unwrap();

        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_send_to_nick_unknown_user_fails() {
        let registry = SessionRegistry::new();
        let result = registry.send_to_nick("ghost", vec![0]);
        assert!(matches!(result, Err(SessionError::NotRegistered(_))));
    }

    #[test]
    fn test_send_to_closed_channel_fails() {
        let mut registry = SessionRegistry::new();
        let (tx, rx) = channel();
        drop(rx);
        registry.attach(cid(1), tx);

        let result = registry.send_to(cid(1), vec![0]);
        assert!(matches!(result, Err(SessionError::SendFailed(_))));
    }

    #[test]
    fn test_broadcast_skips_unreachable_recipients() {
        let mut registry = SessionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        registry.attach(cid(1), tx1);
        registry.attach(cid(2), tx2);
        registry.promote(cid(1), "alice").unwrap();
        registry.promote(cid(2), "bob").unwrap();

        let recipients =
            ["alice".to_string(), "ghost".to_string(), "bob".to_string()];
        registry.broadcast(&recipients, &[9]);

        assert_eq!(rx1.try_recv().unwrap(), vec![9]);
        assert_eq!(rx2.try_recv().unwrap(), vec![9]);
    }

    // =====================================================================
    // Liveness
    // =====================================================================

    #[test]
    fn test_stale_connections_empty_within_window() {
        let registry = registry_with(&[1, 2]);
        let stale = registry.stale_connections(Duration::from_secs(3600));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_stale_connections_reports_silent_connection() {
        let mut registry = registry_with(&[1, 2]);

        // Let both clocks age past the window, then pong only cid(1).
        std::thread::sleep(Duration::from_millis(20));
        registry.record_pong(cid(1));

        let stale = registry.stale_connections(Duration::from_millis(10));
        assert_eq!(stale, [cid(2)]);
    }

    #[test]
    fn test_record_pong_unknown_connection_is_a_no_op() {
        let mut registry = SessionRegistry::new();
        registry.record_pong(cid(42)); // must not panic
    }

    #[tokio::test]
    async fn test_signal_shutdown_wakes_attached_read_loop() {
        let mut registry = SessionRegistry::new();
        let (tx, rx) = channel();
        std::mem::forget(rx);
        let shutdown = registry.attach(cid(1), tx);

        // Signalled before the waiter arrives: the permit is buffered.
        registry.signal_shutdown(cid(1));

        tokio::time::timeout(Duration::from_secs(1), shutdown.notified())
            .await
            .expect("signal should wake the waiter");
    }

    #[test]
    fn test_signal_shutdown_unknown_connection_is_a_no_op() {
        let registry = SessionRegistry::new();
        registry.signal_shutdown(cid(42)); // must not panic
    }
}
