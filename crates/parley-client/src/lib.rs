//! Client-side building blocks for Parley.
//!
//! Three pieces, glued together by whoever owns the server connection:
//!
//! - [`Actions`] — the outbound side. Every user-facing intent builds
//!   exactly one command frame and hands it to the transport; nothing is
//!   mutated locally until the server's broadcast comes back.
//! - [`ClientCache`] — the inbound side's read model: room snapshots and
//!   cached public keys, updated only from server notifications.
//! - [`server_registry`] — the dispatch table for server-origin traffic,
//!   wiring notifications into the cache, a [`VoiceSink`], and an event
//!   channel for the embedding application.

mod actions;
mod cache;
mod error;
mod handlers;
mod voice;

pub use actions::Actions;
pub use cache::ClientCache;
pub use error::ClientError;
pub use handlers::{ClientCtx, ClientEvent, server_registry};
pub use voice::{NullVoiceSink, VoiceSink};
