//! Core protocol types: command ids, system codes, and the typed content
//! of every command family.
//!
//! Everything here travels on the wire. Users are addressed by nick
//! (unique once registered), rooms by name (unique while open), so both
//! are plain strings at this layer; the chat crate layers invariants on
//! top of these same types.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Command identity
// ---------------------------------------------------------------------------

/// Integer identifying a command's semantic type and content schema.
///
/// Newtype over `u32` so a command id can't be confused with a message id
/// or a system code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u32);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// The command-id space.
///
/// Ids below 10 are reserved sentinels. 10–99 are peer-origin requests,
/// 100+ are server-origin notifications. The split is convention, not
/// enforcement — origin is enforced per registration by the dispatcher.
pub mod id {
    use super::CommandId;

    /// No-op. Used as a placeholder/ack; always safe to ignore.
    pub const EMPTY: CommandId = CommandId(0);
    /// Liveness probe, content-less.
    pub const PING: CommandId = CommandId(1);
    /// Liveness reply, content-less.
    pub const PONG: CommandId = CommandId(2);

    // -- Peer-origin requests --
    pub const REGISTER: CommandId = CommandId(10);
    pub const UNREGISTER: CommandId = CommandId(11);
    pub const ROOM_MESSAGE: CommandId = CommandId(12);
    pub const PRIVATE_MESSAGE: CommandId = CommandId(13);
    pub const GET_USER_KEY: CommandId = CommandId(14);
    pub const REMOVE_MESSAGES: CommandId = CommandId(15);
    pub const CREATE_ROOM: CommandId = CommandId(20);
    pub const DELETE_ROOM: CommandId = CommandId(21);
    pub const INVITE_ROOM: CommandId = CommandId(22);
    pub const KICK_ROOM: CommandId = CommandId(23);
    pub const EXIT_ROOM: CommandId = CommandId(24);
    pub const REFRESH_ROOM: CommandId = CommandId(25);
    pub const SET_ROOM_ADMIN: CommandId = CommandId(26);
    pub const POST_FILE: CommandId = CommandId(30);
    pub const REMOVE_FILE: CommandId = CommandId(31);
    pub const CONNECT_REQUEST: CommandId = CommandId(40);
    pub const READY_ACCEPT: CommandId = CommandId(41);
    pub const ADMIN: CommandId = CommandId(60);

    // -- Voice (direction disambiguated per registry) --
    pub const PLAY_VOICE: CommandId = CommandId(50);

    // -- Server-origin notifications --
    pub const REGISTER_RESPONSE: CommandId = CommandId(100);
    pub const OUT_ROOM_MESSAGE: CommandId = CommandId(101);
    pub const OUT_PRIVATE_MESSAGE: CommandId = CommandId(102);
    pub const OUT_SYSTEM_MESSAGE: CommandId = CommandId(103);
    pub const USER_KEY: CommandId = CommandId(104);
    pub const ROOM_OPENED: CommandId = CommandId(110);
    pub const ROOM_CLOSED: CommandId = CommandId(111);
    pub const ROOM_REFRESHED: CommandId = CommandId(112);
    pub const FILE_POSTED: CommandId = CommandId(113);
    pub const FILE_REMOVED: CommandId = CommandId(114);
    pub const WAIT_PEER_CONNECTION: CommandId = CommandId(120);
    pub const CONNECT_TO_PEER: CommandId = CommandId(121);
    pub const CONNECT_TO_SERVICE: CommandId = CommandId(122);
}

// ---------------------------------------------------------------------------
// System-message codes
// ---------------------------------------------------------------------------

/// Codes carried by [`OutSystemMessage`].
///
/// User-visible errors always carry a code (not free text) so clients can
/// localize and format them; `params` supplies the format arguments.
pub mod code {
    pub const USER_NOT_FOUND: u16 = 1;
    pub const ROOM_NOT_FOUND: u16 = 2;
    pub const MESSAGE_NOT_FOUND: u16 = 3;
    pub const FILE_NOT_FOUND: u16 = 4;
    pub const ACCESS_DENIED: u16 = 5;
    pub const NICK_TAKEN: u16 = 6;
    pub const NICK_RESERVED: u16 = 7;
    pub const ROOM_NAME_TAKEN: u16 = 8;
    pub const ALREADY_IN_PROGRESS: u16 = 9;
    pub const PEER_CONNECT_TIMEOUT: u16 = 10;
    pub const NOT_A_MEMBER: u16 = 11;
    pub const WRONG_ADMIN_SECRET: u16 = 20;
    pub const UNKNOWN_ADMIN_COMMAND: u16 = 21;
    pub const ADMIN_RESULT: u16 = 22;
}

// ---------------------------------------------------------------------------
// Shared data model
// ---------------------------------------------------------------------------

/// A registered user, as visible on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique nick, assigned at registration.
    pub nick: String,
    /// Opaque public credential (encryption is an external service).
    pub public_key: String,
    /// Whether the user currently participates in voice.
    pub voice_active: bool,
}

/// A chat message inside a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic id, unique within the room.
    pub id: u64,
    /// Nick of the author; only they may edit it.
    pub owner: String,
    pub text: String,
    /// Milliseconds since the Unix epoch, assigned by the server.
    pub timestamp: u64,
}

/// Identifies a shared file: the owner's nick plus their local counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    pub owner: String,
    pub local: u64,
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.local)
    }
}

/// Metadata of a file offered in a room. Chunk transfer happens over the
/// direct peer channel, never through the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescription {
    pub id: FileId,
    pub name: String,
    pub size: u64,
}

/// Post-mutation snapshot of a room, broadcast with refresh/open
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub name: String,
    /// Nick of the room admin.
    pub admin: String,
    /// Current members in join order.
    pub members: Vec<User>,
    pub messages: Vec<Message>,
    pub files: Vec<FileDescription>,
    /// Whether the room carries the pairwise voice link map.
    pub voice: bool,
}

// ---------------------------------------------------------------------------
// Peer-origin content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub nick: String,
    pub public_key: String,
}

/// Create-or-edit: `edit_id` present means edit that message in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessageIn {
    pub room: String,
    pub text: String,
    #[serde(default)]
    pub edit_id: Option<u64>,
}

/// Bulk message removal. Ids already gone are silently skipped; the
/// refresh broadcast reports the ids actually removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMessages {
    pub room: String,
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessageIn {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserKey {
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoom {
    pub name: String,
    /// Nicks invited at creation; the creator is always a member.
    pub members: Vec<String>,
    pub voice: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRoom {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRoom {
    pub room: String,
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickRoom {
    pub room: String,
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRoom {
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRoom {
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRoomAdmin {
    pub room: String,
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFile {
    pub room: String,
    /// Owner-local id; the server pairs it with the sender's nick.
    pub local_id: u64,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFile {
    pub room: String,
    pub file_id: FileId,
}

/// Ask the server to introduce us to `nick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub nick: String,
}

/// The introduced peer's verdict on its direct connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyAccept {
    pub token: String,
    /// `true` — direct channel established; `false` — fall back to relay.
    pub accepted: bool,
}

/// Opaque voice payload relayed to a voice room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayVoiceIn {
    pub room: String,
    pub data: Vec<u8>,
}

/// Password-gated administrative text command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub secret: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

// ---------------------------------------------------------------------------
// Server-origin content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub registered: bool,
    /// System code explaining a rejection, absent on success.
    #[serde(default)]
    pub reason: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutRoomMessage {
    pub room: String,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPrivateMessage {
    pub from: String,
    pub text: String,
    pub timestamp: u64,
}

/// Structured error/info notification, distinct from chat content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutSystemMessage {
    /// One of the [`code`] constants.
    pub code: u16,
    /// Format parameters for client-side localization.
    #[serde(default)]
    pub params: Vec<String>,
}

impl OutSystemMessage {
    pub fn new(code: u16, params: Vec<String>) -> Self {
        Self { code, params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    pub nick: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOpened {
    pub room: RoomSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomClosed {
    pub room: String,
}

/// Post-mutation state of a room plus the ids of any messages removed by
/// the mutation that triggered the refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRefreshed {
    pub room: RoomSnapshot,
    #[serde(default)]
    pub removed_messages: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePosted {
    pub room: String,
    pub file: FileDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRemoved {
    pub room: String,
    pub file_id: FileId,
}

/// To the requester: park a channel at the rendezvous service and wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPeerConnection {
    pub peer: String,
    pub service_addr: String,
    pub token: String,
}

/// To the target: attempt a direct connection to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectToPeer {
    pub nick: String,
    pub public_key: String,
    /// The requester's server-observed externally reachable endpoint.
    pub endpoint: String,
    pub token: String,
}

/// To the target, after a failed direct attempt: use the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectToService {
    pub service_addr: String,
    pub token: String,
}

/// Voice payload fanned out to the other members of a voice room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayVoiceOut {
    pub room: String,
    pub from: String,
    pub data: Vec<u8>,
}

// =========================================================================
// Tests
// =========================================================================
