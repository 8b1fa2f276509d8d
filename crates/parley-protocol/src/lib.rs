//! Wire protocol for Parley.
//!
//! This crate defines the "language" that the chat server, clients, and
//! directly connected peers speak:
//!
//! - **Frames** ([`frame`]) — the outermost envelope: a 4-byte big-endian
//!   command id followed by opaque content bytes. `decode(encode(id, c))`
//!   is exact for every valid input; content interpretation is deferred to
//!   whichever handler owns the id.
//! - **Types** ([`Register`], [`RoomSnapshot`], [`OutSystemMessage`],
//!   etc.) — the typed content of each command family, plus the command-id
//!   and system-code constants.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how typed content is
//!   converted to/from bytes.
//! - **Registry** ([`CommandRegistry`]) — maps a command id to a handler
//!   and enforces the declared origin before the handler body runs.
//! - **Errors** ([`ProtocolError`]) — everything that can go wrong between
//!   raw bytes and an invoked handler.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → frame (id + content) → registry (origin check)
//!                                          → handler (typed decode)
//! ```
//!
//! The protocol layer never touches chat state or sockets; it only knows
//! how to name, serialize, and route commands.

mod codec;
mod error;
pub mod frame;
mod registry;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use registry::{CommandRegistry, HandlerFuture, Origin};
pub use types::{
    Admin, CommandId, ConnectRequest, ConnectToPeer, ConnectToService,
    CreateRoom, DeleteRoom, ExitRoom, FileDescription, FileId, FilePosted,
    FileRemoved, GetUserKey, InviteRoom, KickRoom, Message, OutPrivateMessage,
    OutRoomMessage, OutSystemMessage, PlayVoiceIn, PlayVoiceOut,
    PostFile, PrivateMessageIn, ReadyAccept, RefreshRoom, Register,
    RegisterResponse, RemoveFile, RemoveMessages, RoomClosed, RoomMessageIn,
    RoomOpened, RoomRefreshed, RoomSnapshot, SetRoomAdmin, User, UserKey,
    WaitPeerConnection, code, id,
};
