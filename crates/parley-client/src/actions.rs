//! The action layer: user-facing intents mapped one-to-one onto
//! outbound commands.
//!
//! Actions never mutate the local cache. State changes take effect only
//! when the corresponding server notification is dispatched back, so the
//! cache can never run ahead of the server.

use parley_protocol::{
    Admin, Codec, CommandId, ConnectRequest, CreateRoom, DeleteRoom, ExitRoom,
    FileId, GetUserKey, InviteRoom, KickRoom, PlayVoiceIn, PostFile,
    PrivateMessageIn, ReadyAccept, RefreshRoom, Register, RemoveFile,
    RemoveMessages, RoomMessageIn, SetRoomAdmin, frame, id,
};
use parley_transport::Connection;
use serde::Serialize;

use crate::ClientError;

/// Builds and sends outbound commands over one connection.
pub struct Actions<Conn, C> {
    connection: Conn,
    codec: C,
}

impl<Conn: Connection, C: Codec> Actions<Conn, C> {
    pub fn new(connection: Conn, codec: C) -> Self {
        Self { connection, codec }
    }

    pub fn connection(&self) -> &Conn {
        &self.connection
    }

    /// Registers a nick with its public credential.
    pub async fn register(
        &self,
        nick: &str,
        public_key: &str,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::REGISTER,
            &Register {
                nick: nick.to_string(),
                public_key: public_key.to_string(),
            },
        )
        .await
    }

    /// Gives up the registered nick; the connection stays open.
    pub async fn unregister(&self) -> Result<(), ClientError> {
        self.send_empty(id::UNREGISTER).await
    }

    /// Sends a new room message, or edits an existing one when
    /// `edit_id` is given.
    pub async fn send_room_message(
        &self,
        room: &str,
        text: &str,
        edit_id: Option<u64>,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::ROOM_MESSAGE,
            &RoomMessageIn {
                room: room.to_string(),
                text: text.to_string(),
                edit_id,
            },
        )
        .await
    }

    /// Removes messages from a room in bulk. The server skips ids that
    /// are already gone and refuses messages we may not touch.
    pub async fn remove_messages(
        &self,
        room: &str,
        ids: Vec<u64>,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::REMOVE_MESSAGES,
            &RemoveMessages {
                room: room.to_string(),
                ids,
            },
        )
        .await
    }

    pub async fn send_private_message(
        &self,
        to: &str,
        text: &str,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::PRIVATE_MESSAGE,
            &PrivateMessageIn {
                to: to.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn get_user_key(&self, nick: &str) -> Result<(), ClientError> {
        self.send_typed(
            id::GET_USER_KEY,
            &GetUserKey {
                nick: nick.to_string(),
            },
        )
        .await
    }

    pub async fn create_room(
        &self,
        name: &str,
        members: Vec<String>,
        voice: bool,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::CREATE_ROOM,
            &CreateRoom {
                name: name.to_string(),
                members,
                voice,
            },
        )
        .await
    }

    pub async fn delete_room(&self, name: &str) -> Result<(), ClientError> {
        self.send_typed(
            id::DELETE_ROOM,
            &DeleteRoom {
                name: name.to_string(),
            },
        )
        .await
    }

    pub async fn invite(
        &self,
        room: &str,
        nick: &str,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::INVITE_ROOM,
            &InviteRoom {
                room: room.to_string(),
                nick: nick.to_string(),
            },
        )
        .await
    }

    pub async fn kick(
        &self,
        room: &str,
        nick: &str,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::KICK_ROOM,
            &KickRoom {
                room: room.to_string(),
                nick: nick.to_string(),
            },
        )
        .await
    }

    pub async fn exit_room(&self, room: &str) -> Result<(), ClientError> {
        self.send_typed(
            id::EXIT_ROOM,
            &ExitRoom {
                room: room.to_string(),
            },
        )
        .await
    }

    /// Asks the server for a fresh snapshot of a room.
    pub async fn refresh_room(&self, room: &str) -> Result<(), ClientError> {
        self.send_typed(
            id::REFRESH_ROOM,
            &RefreshRoom {
                room: room.to_string(),
            },
        )
        .await
    }

    pub async fn set_room_admin(
        &self,
        room: &str,
        nick: &str,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::SET_ROOM_ADMIN,
            &SetRoomAdmin {
                room: room.to_string(),
                nick: nick.to_string(),
            },
        )
        .await
    }

    /// Offers a file to a room. `local_id` is the sender's own handle
    /// for it; the server-wide file id is (nick, local_id).
    pub async fn post_file(
        &self,
        room: &str,
        local_id: u64,
        name: &str,
        size: u64,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::POST_FILE,
            &PostFile {
                room: room.to_string(),
                local_id,
                name: name.to_string(),
                size,
            },
        )
        .await
    }

    pub async fn remove_file(
        &self,
        room: &str,
        file_id: FileId,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::REMOVE_FILE,
            &RemoveFile {
                room: room.to_string(),
                file_id,
            },
        )
        .await
    }

    /// Asks the server to introduce us to a peer by nick.
    pub async fn request_peer(&self, nick: &str) -> Result<(), ClientError> {
        self.send_typed(
            id::CONNECT_REQUEST,
            &ConnectRequest {
                nick: nick.to_string(),
            },
        )
        .await
    }

    /// Reports the outcome of a direct connection attempt back to the
    /// server. `accepted = false` asks for the relay fallback.
    pub async fn ready_accept(
        &self,
        token: &str,
        accepted: bool,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::READY_ACCEPT,
            &ReadyAccept {
                token: token.to_string(),
                accepted,
            },
        )
        .await
    }

    pub async fn play_voice(
        &self,
        room: &str,
        data: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::PLAY_VOICE,
            &PlayVoiceIn {
                room: room.to_string(),
                data,
            },
        )
        .await
    }

    /// Sends a password-gated administrative text command.
    pub async fn admin(
        &self,
        secret: &str,
        command: &str,
        args: Vec<String>,
    ) -> Result<(), ClientError> {
        self.send_typed(
            id::ADMIN,
            &Admin {
                secret: secret.to_string(),
                command: command.to_string(),
                args,
            },
        )
        .await
    }

    /// Answers a server ping.
    pub async fn pong(&self) -> Result<(), ClientError> {
        self.send_empty(id::PONG).await
    }

    async fn send_typed<T: Serialize>(
        &self,
        id: CommandId,
        payload: &T,
    ) -> Result<(), ClientError> {
        let content = self.codec.encode(payload)?;
        let bytes = frame::encode(id, &content);
        self.connection.send(&bytes).await.map_err(ClientError::send)
    }

    async fn send_empty(&self, id: CommandId) -> Result<(), ClientError> {
        let bytes = frame::encode(id, &[]);
        self.connection.send(&bytes).await.map_err(ClientError::send)
    }
}

// =========================================================================
// Tests
// =========================================================================
