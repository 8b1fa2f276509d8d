//! Codec trait and implementations for typed command content.
//!
//! A codec converts between Rust types and the opaque content bytes inside
//! a frame. The frame layer doesn't care how content is serialized; it
//! just carries bytes. Handlers pick a codec to interpret them.
//!
//! Currently [`JsonCodec`] is the only implementation. A binary codec can
//! be added later without touching the frame format — the id stays a
//! 4-byte prefix either way.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs are shared across connection
/// tasks for the lifetime of the process.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into content bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes content bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// JSON keeps the wire debuggable: any frame's content can be read
/// straight out of a log. Serialization of the same value is
/// deterministic, which is what makes `decode(encode(..))` byte-exact.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
