//! Unified error type for the Parley server.

use parley_chat::ChatError;
use parley_protocol::ProtocolError;
use parley_rendezvous::RendezvousError;
use parley_session::SessionError;
use parley_transport::TransportError;

/// Top-level error wrapping all crate-specific errors.
///
/// Embedders of the `parley` meta-crate deal with this single type; the
/// `#[from]` impls let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, dispatch).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A chat-state error (rooms, messages, files).
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// A session-level error (registration, delivery).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A rendezvous-level error (pending table, relay).
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}
