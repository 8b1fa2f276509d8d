//! The shared chat state: every registered user and every open room.

use std::collections::HashMap;

use parley_protocol::{FileDescription, FileId, Message, RoomSnapshot, User};

use crate::{ChatError, Room};

/// The main room every user joins at registration. Always exists, never
/// auto-closes, and has no admin.
pub const MAIN_ROOM: &str = "main";

/// Outcome of a mutation that changed room membership or existence,
/// carrying the recipient snapshot taken under the same mutation.
///
/// A refresh and a closure are distinct notifications and are never
/// conflated: the caller maps `Refreshed` to a room-refreshed broadcast
/// and `Closed` to a room-closed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    /// The room still exists; notify these post-mutation members.
    Refreshed {
        room: String,
        recipients: Vec<String>,
    },
    /// The room ceased to exist; notify everyone who was a member when
    /// it closed.
    Closed {
        room: String,
        recipients: Vec<String>,
    },
}

/// All users and rooms, authoritative for the server process's lifetime.
///
/// Not internally synchronized: the owner wraps it in a single mutex and
/// holds the guard for the duration of each command's mutation.
pub struct ChatState {
    users: HashMap<String, User>,
    rooms: HashMap<String, Room>,
}

impl ChatState {
    /// Creates the state with an empty main room.
    pub fn new() -> Self {
        let mut rooms = HashMap::new();
        let mut main = Room::new(MAIN_ROOM, "", false);
        main.remove_member(""); // the placeholder admin is not a member
        rooms.insert(MAIN_ROOM.to_string(), main);
        Self {
            users: HashMap::new(),
            rooms,
        }
    }

    // -- Users ------------------------------------------------------------

    /// Adds a user and joins them to the main room.
    ///
    /// Fails if the nick is empty or already registered. The reserved
    /// `conn-<n>` pattern is rejected one layer up, where connection
    /// identities live.
    pub fn register_user(&mut self, user: User) -> Result<(), ChatError> {
        if user.nick.is_empty() {
            return Err(ChatError::NickReserved(user.nick));
        }
        if self.users.contains_key(&user.nick) {
            return Err(ChatError::NickTaken(user.nick));
        }
        self.main_room_mut().add_member(&user.nick);
        self.users.insert(user.nick.clone(), user);
        Ok(())
    }

    /// Removes a user from every room they belong to and frees the nick.
    ///
    /// Returns the per-room outcomes those removals produced, in no
    /// particular order. Unknown nicks produce no changes.
    pub fn unregister_user(&mut self, nick: &str) -> Vec<RoomChange> {
        if self.users.remove(nick).is_none() {
            return Vec::new();
        }
        let room_names: Vec<String> = self
            .rooms
            .values()
            .filter(|r| r.contains(nick))
            .map(|r| r.name().to_string())
            .collect();

        let mut changes = Vec::with_capacity(room_names.len());
        for name in room_names {
            // Membership was checked above; the room still exists.
            if let Ok(change) = self.remove_member(&name, nick) {
                changes.push(change);
            }
        }
        changes
    }

    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(nick)
    }

    pub fn is_registered(&self, nick: &str) -> bool {
        self.users.contains_key(nick)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Flips the user's voice-active flag.
    pub fn set_voice_active(
        &mut self,
        nick: &str,
        active: bool,
    ) -> Result<(), ChatError> {
        let user = self
            .users
            .get_mut(nick)
            .ok_or_else(|| ChatError::UserNotFound(nick.to_string()))?;
        user.voice_active = active;
        Ok(())
    }

    // -- Rooms ------------------------------------------------------------

    /// Opens a room with `admin` as first member plus any `invited` nicks
    /// that are currently registered (unknown invitees are skipped).
    ///
    /// Returns the initial member list. Voice rooms get their triangular
    /// link map built here.
    pub fn open_room(
        &mut self,
        admin: &str,
        name: &str,
        invited: &[String],
        voice: bool,
    ) -> Result<Vec<String>, ChatError> {
        if self.rooms.contains_key(name) {
            return Err(ChatError::RoomNameTaken(name.to_string()));
        }
        if !self.is_registered(admin) {
            return Err(ChatError::UserNotFound(admin.to_string()));
        }
        let mut room = Room::new(name, admin, voice);
        for nick in invited {
            if self.is_registered(nick) {
                room.add_member(nick);
            }
        }
        let members = room.members().to_vec();
        self.rooms.insert(name.to_string(), room);
        tracing::info!(room = name, %admin, voice, "room opened");
        Ok(members)
    }

    /// Deletes a room. Only its admin may; the main room never closes.
    ///
    /// All member references are dropped atomically with the closure.
    pub fn delete_room(
        &mut self,
        requester: &str,
        name: &str,
    ) -> Result<RoomChange, ChatError> {
        let room = self
            .rooms
            .get(name)
            .ok_or_else(|| ChatError::RoomNotFound(name.to_string()))?;
        if name == MAIN_ROOM || room.admin() != requester {
            return Err(ChatError::AccessDenied {
                nick: requester.to_string(),
                action: format!("delete room {name}"),
            });
        }
        let room = self.rooms.remove(name).expect("checked above");
        if room.is_voice() {
            for nick in room.members() {
                self.clear_voice_if_inactive(nick);
            }
        }
        tracing::info!(room = name, %requester, "room deleted");
        Ok(RoomChange::Closed {
            room: name.to_string(),
            recipients: room.members().to_vec(),
        })
    }

    /// Closes a room unconditionally (administrative path; no ownership
    /// check). The main room still never closes.
    pub fn force_close(&mut self, name: &str) -> Result<RoomChange, ChatError> {
        if name == MAIN_ROOM {
            return Err(ChatError::AccessDenied {
                nick: String::new(),
                action: format!("close room {name}"),
            });
        }
        let room = self
            .rooms
            .remove(name)
            .ok_or_else(|| ChatError::RoomNotFound(name.to_string()))?;
        if room.is_voice() {
            for nick in room.members() {
                self.clear_voice_if_inactive(nick);
            }
        }
        tracing::info!(room = name, "room force-closed");
        Ok(RoomChange::Closed {
            room: name.to_string(),
            recipients: room.members().to_vec(),
        })
    }

    /// Adds `nick` on behalf of `requester`, who must be a member.
    ///
    /// Returns `None` when the invitee was already a member (no visible
    /// change, so nothing to broadcast).
    pub fn invite(
        &mut self,
        room_name: &str,
        requester: &str,
        nick: &str,
    ) -> Result<Option<RoomChange>, ChatError> {
        if !self.is_registered(nick) {
            return Err(ChatError::UserNotFound(nick.to_string()));
        }
        let room = self.room_mut(room_name)?;
        if !room.contains(requester) {
            return Err(ChatError::NotAMember {
                room: room_name.to_string(),
                nick: requester.to_string(),
            });
        }
        if !room.add_member(nick) {
            return Ok(None);
        }
        Ok(Some(RoomChange::Refreshed {
            room: room_name.to_string(),
            recipients: room.members().to_vec(),
        }))
    }

    /// Removes `nick` on behalf of `requester`, who must be the admin.
    pub fn kick(
        &mut self,
        room_name: &str,
        requester: &str,
        nick: &str,
    ) -> Result<RoomChange, ChatError> {
        let room = self.room(room_name)?;
        if room.admin() != requester {
            return Err(ChatError::AccessDenied {
                nick: requester.to_string(),
                action: format!("kick {nick} from {room_name}"),
            });
        }
        self.remove_member(room_name, nick)
    }

    /// Removes a member; closes the room if that left it empty (main room
    /// excepted). Leaving a voice room drops the member's voice-active
    /// flag unless another voice room still holds them.
    pub fn remove_member(
        &mut self,
        room_name: &str,
        nick: &str,
    ) -> Result<RoomChange, ChatError> {
        let room = self.room_mut(room_name)?;
        let was_voice = room.is_voice();
        if !room.remove_member(nick) {
            return Err(ChatError::NotAMember {
                room: room_name.to_string(),
                nick: nick.to_string(),
            });
        }
        let change = if room.is_empty() && room_name != MAIN_ROOM {
            self.rooms.remove(room_name);
            tracing::info!(room = room_name, "room emptied, closing");
            RoomChange::Closed {
                room: room_name.to_string(),
                recipients: Vec::new(),
            }
        } else {
            RoomChange::Refreshed {
                room: room_name.to_string(),
                recipients: self.room(room_name)?.members().to_vec(),
            }
        };
        if was_voice {
            self.clear_voice_if_inactive(nick);
        }
        Ok(change)
    }

    /// Transfers admin rights; only the current admin may.
    pub fn set_admin(
        &mut self,
        room_name: &str,
        requester: &str,
        nick: &str,
    ) -> Result<Vec<String>, ChatError> {
        let room = self.room_mut(room_name)?;
        if room.admin() != requester {
            return Err(ChatError::AccessDenied {
                nick: requester.to_string(),
                action: format!("set admin of {room_name}"),
            });
        }
        room.set_admin(nick)?;
        Ok(room.members().to_vec())
    }

    // -- Messages and files ----------------------------------------------

    /// Stores a message from a member and returns it with the recipient
    /// snapshot.
    pub fn add_message(
        &mut self,
        room_name: &str,
        owner: &str,
        text: &str,
        timestamp: u64,
    ) -> Result<(Message, Vec<String>), ChatError> {
        let room = self.member_room_mut(room_name, owner)?;
        let message = room.add_message(owner, text, timestamp).clone();
        Ok((message, room.members().to_vec()))
    }

    /// Edits a message in place (owner only).
    pub fn edit_message(
        &mut self,
        room_name: &str,
        requester: &str,
        id: u64,
        new_text: &str,
    ) -> Result<(Message, Vec<String>), ChatError> {
        let room = self.member_room_mut(room_name, requester)?;
        let message = room.edit_message(requester, id, new_text)?.clone();
        Ok((message, room.members().to_vec()))
    }

    /// Idempotent bulk delete; returns the ids actually removed.
    ///
    /// The room admin may remove any message; other members only their
    /// own. Ids that no longer exist are silently skipped, so a retried
    /// removal raises no error.
    pub fn remove_messages(
        &mut self,
        room_name: &str,
        requester: &str,
        ids: &[u64],
    ) -> Result<(Vec<u64>, Vec<String>), ChatError> {
        let room = self.member_room_mut(room_name, requester)?;
        if requester != room.admin() {
            for id in ids {
                if room.message(*id).is_some_and(|m| m.owner != requester) {
                    return Err(ChatError::AccessDenied {
                        nick: requester.to_string(),
                        action: format!("remove message {id}"),
                    });
                }
            }
        }
        let removed = room.remove_messages(ids);
        Ok((removed, room.members().to_vec()))
    }

    /// Registers a file offer from a member.
    pub fn add_file(
        &mut self,
        room_name: &str,
        owner: &str,
        file: FileDescription,
    ) -> Result<Vec<String>, ChatError> {
        let room = self.member_room_mut(room_name, owner)?;
        room.add_file(file);
        Ok(room.members().to_vec())
    }

    /// Removes a file offer (admin or owner only).
    pub fn remove_file(
        &mut self,
        room_name: &str,
        requester: &str,
        file_id: &FileId,
    ) -> Result<(FileDescription, Vec<String>), ChatError> {
        let room = self.room_mut(room_name)?;
        let removed = room.remove_file(requester, file_id)?;
        Ok((removed, room.members().to_vec()))
    }

    // -- Views ------------------------------------------------------------

    pub fn room(&self, name: &str) -> Result<&Room, ChatError> {
        self.rooms
            .get(name)
            .ok_or_else(|| ChatError::RoomNotFound(name.to_string()))
    }

    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Post-mutation snapshot of a room for refresh notifications.
    pub fn snapshot(&self, name: &str) -> Result<RoomSnapshot, ChatError> {
        Ok(self.room(name)?.snapshot(&self.users))
    }

    /// Current members of a room.
    pub fn members_of(&self, name: &str) -> Result<Vec<String>, ChatError> {
        Ok(self.room(name)?.members().to_vec())
    }

    /// Drops a user's voice-active flag once no voice room holds them.
    /// A nick mid-unregister is already gone from `users`; nothing to do.
    fn clear_voice_if_inactive(&mut self, nick: &str) {
        let still_voiced = self
            .rooms
            .values()
            .any(|r| r.is_voice() && r.contains(nick));
        if still_voiced {
            return;
        }
        if let Some(user) = self.users.get_mut(nick) {
            user.voice_active = false;
        }
    }

    fn main_room_mut(&mut self) -> &mut Room {
        self.rooms.get_mut(MAIN_ROOM).expect("main room always exists")
    }

    fn room_mut(&mut self, name: &str) -> Result<&mut Room, ChatError> {
        self.rooms
            .get_mut(name)
            .ok_or_else(|| ChatError::RoomNotFound(name.to_string()))
    }

    /// Like [`room_mut`](Self::room_mut), but also requires `nick` to be
    /// a member.
    fn member_room_mut(
        &mut self,
        name: &str,
        nick: &str,
    ) -> Result<&mut Room, ChatError> {
        let room = self.room_mut(name)?;
        if !room.contains(nick) {
            return Err(ChatError::NotAMember {
                room: name.to_string(),
                nick: nick.to_string(),
            });
        }
        Ok(room)
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
