//! Room engine for Parley.
//!
//! Owns rooms, users, messages, and files, and enforces their mutation
//! invariants: unique nicks and room names, per-room monotonic message
//! ids, owner-only edits, admin-or-owner file removal, and the triangular
//! voice link map.
//!
//! The engine is deliberately synchronous and lock-free internally — the
//! whole [`ChatState`] is one shared resource guarded by a single mutex at
//! a higher layer, acquired for the duration of each command's mutation.
//! Mutations that change visible room content return a [`RoomChange`]
//! carrying the recipient snapshot taken under that same mutation, so the
//! caller can release the lock before sending.

mod error;
mod room;
mod state;

pub use error::ChatError;
pub use room::Room;
pub use state::{ChatState, MAIN_ROOM, RoomChange};
