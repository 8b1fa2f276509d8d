//! Error types for the client layer.

use parley_protocol::ProtocolError;

/// Errors that can occur while building or sending an action.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Content encoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport refused the frame; the connection is gone.
    #[error("failed to send command")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    /// Wraps a transport error from a generic connection.
    pub fn send<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Send(Box::new(error))
    }
}
