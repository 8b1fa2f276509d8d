//! The pending-handshake table.
//!
//! # Concurrency note
//!
//! `PendingTable` is NOT thread-safe by itself. The server wraps it in
//! its own mutex, separate from the chat-state mutex, so rendezvous
//! bookkeeping never contends with room mutation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::RendezvousError;

/// Where a handshake currently stands.
///
/// ```text
/// Requested ──→ Introduced ──→ Ready ──→ Connected (removed)
///     │              │           │
///     └──────────────┴───────────┴─────→ Abandoned (removed)
/// ```
///
/// Connected and Abandoned are terminal: the entry leaves the table and
/// is handed back to the caller for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// The requester asked for the target; nothing sent yet.
    Requested,
    /// The requester has been told where to park (relay address + token).
    Introduced,
    /// The target has been handed the requester's endpoint and is
    /// attempting a direct connection.
    Ready,
}

/// One in-flight handshake.
#[derive(Debug, Clone)]
pub struct Pending {
    pub requester: String,
    pub target: String,
    pub token: String,
    pub state: HandshakeState,
    pub created_at: Instant,
}

/// All in-flight handshakes, keyed by (target, requester) pair with a
/// token index for the accept path.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<(String, String), Pending>,
    tokens: HashMap<String, (String, String)>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a handshake between `requester` and `target`, allocating its
    /// token. The caller must have verified the target is online; an
    /// offline target never reaches the table.
    ///
    /// # Errors
    /// [`RendezvousError::AlreadyInProgress`] if this pair already has an
    /// entry, in either state.
    pub fn open(
        &mut self,
        requester: &str,
        target: &str,
    ) -> Result<&Pending, RendezvousError> {
        let key = (target.to_string(), requester.to_string());
        if self.entries.contains_key(&key) {
            return Err(RendezvousError::AlreadyInProgress {
                requester: requester.to_string(),
                target: target.to_string(),
            });
        }
        let token = generate_token();
        self.tokens.insert(token.clone(), key.clone());
        let entry = self.entries.entry(key).or_insert(Pending {
            requester: requester.to_string(),
            target: target.to_string(),
            token,
            state: HandshakeState::Requested,
            created_at: Instant::now(),
        });
        tracing::info!(
            requester = entry.requester,
            target = entry.target,
            "rendezvous opened"
        );
        Ok(entry)
    }

    /// Advances a handshake to the next state. Used by the server after
    /// it has sent the corresponding instruction.
    pub fn advance(
        &mut self,
        token: &str,
        state: HandshakeState,
    ) -> Result<(), RendezvousError> {
        let key = self
            .tokens
            .get(token)
            .ok_or(RendezvousError::UnknownToken)?;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or(RendezvousError::UnknownToken)?;
        entry.state = state;
        Ok(())
    }

    /// Terminates a handshake as Connected, removing its entry.
    pub fn complete(&mut self, token: &str) -> Result<Pending, RendezvousError> {
        let entry = self.remove_token(token).ok_or(RendezvousError::UnknownToken)?;
        tracing::info!(
            requester = entry.requester,
            target = entry.target,
            "rendezvous connected"
        );
        Ok(entry)
    }

    /// Terminates a handshake as Abandoned, removing its entry. Returns
    /// `None` if the token no longer matches anything (already terminal).
    pub fn abandon(&mut self, token: &str) -> Option<Pending> {
        let entry = self.remove_token(token)?;
        tracing::info!(
            requester = entry.requester,
            target = entry.target,
            "rendezvous abandoned"
        );
        Some(entry)
    }

    /// Abandons every handshake involving `nick`, in either role. Called
    /// on disconnect so a dead peer frees its rendezvous resources
    /// immediately.
    pub fn abandon_for(&mut self, nick: &str) -> Vec<Pending> {
        let tokens: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.requester == nick || e.target == nick)
            .map(|e| e.token.clone())
            .collect();
        tokens.iter().filter_map(|t| self.abandon(t)).collect()
    }

    /// Abandons every handshake older than `window`. Called from a
    /// periodic sweep; the caller notifies both sides of each timeout.
    pub fn expire_stale(&mut self, window: Duration) -> Vec<Pending> {
        let tokens: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.created_at.elapsed() > window)
            .map(|e| e.token.clone())
            .collect();
        tokens.iter().filter_map(|t| self.abandon(t)).collect()
    }

    /// Looks up a handshake by token.
    pub fn by_token(&self, token: &str) -> Option<&Pending> {
        let key = self.tokens.get(token)?;
        self.entries.get(key)
    }

    /// Whether this pair has a handshake in flight.
    pub fn contains(&self, requester: &str, target: &str) -> bool {
        self.entries
            .contains_key(&(target.to_string(), requester.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_token(&mut self, token: &str) -> Option<Pending> {
        let key = self.tokens.remove(token)?;
        self.entries.remove(&key)
    }
}

/// Generates a random 32-character hex string (128 bits of entropy),
/// used as the one-shot connect token the relay matches channels by.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
