//! Error types for the protocol layer.

use crate::registry::Origin;
use crate::types::CommandId;

/// Errors that can occur between raw bytes and an invoked handler.
///
/// Per the failure-isolation contract, none of these terminate a
/// connection's read loop except [`ProtocolError::Handler`], which wraps a
/// transport-level failure surfaced by a handler.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of typed content failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization of typed content failed. Fails only the single
    /// invocation that carried the bytes.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame is shorter than the fixed header.
    #[error("truncated frame: {0} bytes")]
    Truncated(usize),

    /// No handler is registered for this command id. The message is
    /// dropped with a diagnostic; the connection stays alive.
    #[error("unknown command {0}")]
    UnknownCommand(CommandId),

    /// The command's declared origin does not match the connection the
    /// message arrived on. Raised before the handler body, so no side
    /// effect has occurred.
    #[error("illegal invoker for command {command}: got {origin} origin")]
    IllegalInvoker {
        command: CommandId,
        origin: Origin,
    },

    /// The message decoded but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A handler hit a non-protocol failure (typically a dead socket
    /// while replying). Fatal to the affected connection only.
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProtocolError {
    /// Wraps a handler-internal failure (e.g. a transport error while
    /// sending a reply).
    pub fn handler(
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Handler(Box::new(err))
    }

    /// `true` for errors that are isolated to a single inbound message
    /// and must not end the read loop.
    pub fn is_isolated(&self) -> bool {
        !matches!(self, Self::Handler(_))
    }
}
