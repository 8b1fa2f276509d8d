//! Error types for the rendezvous layer.

/// Errors that can occur during rendezvous coordination.
#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    /// A handshake between this pair is already in flight. Duplicate
    /// concurrent requests are rejected, not queued.
    #[error("rendezvous between {requester} and {target} already in progress")]
    AlreadyInProgress { requester: String, target: String },

    /// No pending handshake matches this token. The entry may have
    /// expired or been abandoned by a disconnect.
    #[error("no pending rendezvous for this token")]
    UnknownToken,

    /// Relay socket failure. Fatal only to the affected channel pair.
    #[error("relay i/o failed")]
    Io(#[from] std::io::Error),
}
