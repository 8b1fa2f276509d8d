//! Error types for the room engine.

use parley_protocol::{FileId, code};

/// Errors that can occur during chat-state mutation.
///
/// None of these propagate to the transport layer: handlers convert them
/// to coded system-message replies via [`ChatError::system_code`] and
/// [`ChatError::params`].
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No open room with this name.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// No registered user with this nick.
    #[error("user {0} not found")]
    UserNotFound(String),

    /// No message with this id in the room.
    #[error("message {1} not found in room {0}")]
    MessageNotFound(String, u64),

    /// No file with this id in the room.
    #[error("file {1} not found in room {0}")]
    FileNotFound(String, FileId),

    /// The requester lacks ownership/admin rights for this mutation.
    #[error("{nick} may not {action}")]
    AccessDenied { nick: String, action: String },

    /// The nick is already registered.
    #[error("nick {0} already registered")]
    NickTaken(String),

    /// The nick collides with the reserved temporary-connection pattern
    /// (or is empty).
    #[error("nick {0:?} is reserved")]
    NickReserved(String),

    /// A room with this name is already open.
    #[error("room name {0} already in use")]
    RoomNameTaken(String),

    /// The user is not a member of the room.
    #[error("{nick} is not a member of room {room}")]
    NotAMember { room: String, nick: String },
}

impl ChatError {
    /// The system-message code clients use to format this error.
    pub fn system_code(&self) -> u16 {
        match self {
            Self::RoomNotFound(_) => code::ROOM_NOT_FOUND,
            Self::UserNotFound(_) => code::USER_NOT_FOUND,
            Self::MessageNotFound(..) => code::MESSAGE_NOT_FOUND,
            Self::FileNotFound(..) => code::FILE_NOT_FOUND,
            Self::AccessDenied { .. } => code::ACCESS_DENIED,
            Self::NickTaken(_) => code::NICK_TAKEN,
            Self::NickReserved(_) => code::NICK_RESERVED,
            Self::RoomNameTaken(_) => code::ROOM_NAME_TAKEN,
            Self::NotAMember { .. } => code::NOT_A_MEMBER,
        }
    }

    /// Format parameters accompanying [`system_code`](Self::system_code).
    pub fn params(&self) -> Vec<String> {
        match self {
            Self::RoomNotFound(room) | Self::RoomNameTaken(room) => {
                vec![room.clone()]
            }
            Self::UserNotFound(nick)
            | Self::NickTaken(nick)
            | Self::NickReserved(nick) => vec![nick.clone()],
            Self::MessageNotFound(room, mid) => {
                vec![room.clone(), mid.to_string()]
            }
            Self::FileNotFound(room, fid) => {
                vec![room.clone(), fid.to_string()]
            }
            Self::AccessDenied { nick, action } => {
                vec![nick.clone(), action.clone()]
            }
            Self::NotAMember { room, nick } => {
                vec![room.clone(), nick.clone()]
            }
        }
    }
}
