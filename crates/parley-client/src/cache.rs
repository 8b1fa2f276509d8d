//! The client-side chat cache.
//!
//! A read model fed exclusively by server notifications — actions never
//! write here. Not internally synchronized: the dispatch context wraps it
//! in a mutex with the same acquire-mutate-release discipline the server
//! uses for its chat state.

use std::collections::HashMap;

use parley_protocol::{FileDescription, FileId, Message, RoomSnapshot};

/// Cached rooms, messages, and public keys as last reported by the
/// server.
#[derive(Default)]
pub struct ClientCache {
    nick: Option<String>,
    rooms: HashMap<String, RoomSnapshot>,
    keys: HashMap<String, String>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the nick this client registered under.
    pub fn set_nick(&mut self, nick: &str) {
        self.nick = Some(nick.to_string());
    }

    pub fn clear_nick(&mut self) {
        self.nick = None;
    }

    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    /// Replaces a room's cached state with a fresh server snapshot
    /// (room-opened and room-refreshed both land here).
    pub fn apply_snapshot(&mut self, snapshot: RoomSnapshot) {
        self.rooms.insert(snapshot.name.clone(), snapshot);
    }

    /// Drops a closed room.
    pub fn remove_room(&mut self, name: &str) {
        self.rooms.remove(name);
    }

    /// Applies one room-message delta: an edit replaces the message with
    /// the same id in place, a new message is appended.
    pub fn apply_room_message(&mut self, room: &str, message: Message) {
        let Some(snapshot) = self.rooms.get_mut(room) else {
            tracing::debug!(room, "message for unknown room dropped");
            return;
        };
        match snapshot.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => snapshot.messages.push(message),
        }
    }

    /// Applies a file-posted delta.
    pub fn apply_file_posted(&mut self, room: &str, file: FileDescription) {
        let Some(snapshot) = self.rooms.get_mut(room) else {
            return;
        };
        snapshot.files.retain(|f| f.id != file.id);
        snapshot.files.push(file);
    }

    /// Applies a file-removed delta.
    pub fn apply_file_removed(&mut self, room: &str, file_id: &FileId) {
        if let Some(snapshot) = self.rooms.get_mut(room) {
            snapshot.files.retain(|f| f.id != *file_id);
        }
    }

    /// Caches a user's public credential.
    pub fn cache_key(&mut self, nick: &str, public_key: &str) {
        self.keys.insert(nick.to_string(), public_key.to_string());
    }

    pub fn key_of(&self, nick: &str) -> Option<&str> {
        self.keys.get(nick).map(String::as_str)
    }

    pub fn room(&self, name: &str) -> Option<&RoomSnapshot> {
        self.rooms.get(name)
    }

    pub fn room_names(&self) -> Vec<&str> {
        self.rooms.keys().map(String::as_str).collect()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use parley_protocol::User;

    use super::*;

    fn snapshot(name: &str) -> RoomSnapshot {
        RoomSnapshot {
            name: name.into(),
            admin: "alice".into(),
            members: vec![User {
                nick: "alice".into(),
                public_key: "pk".into(),
                voice_active: false,
            }],
            messages: Vec::new(),
            files: Vec::new(),
            voice: false,
        }
    }

    fn message(id: u64, text: &str) -> Message {
        Message {
            id,
            owner: "alice".into(),
            text: text.into(),
            timestamp: id,
        }
    }

    #[test]
    fn test_apply_snapshot_replaces_previous_state() {
        let mut cache = ClientCache::new();
        let mut first = snapshot("ops");
        first.messages.push(message(1, "old"));
        cache.apply_snapshot(first);

        // A refresh with the message gone supersedes the cached copy.
        cache.apply_snapshot(snapshot("ops"));

        assert!(cache.room("ops").unwrap().messages.is_empty());
    }

    #[test]
    fn test_apply_room_message_appends_new_and_replaces_edited() {
        let mut cache = ClientCache::new();
        cache.apply_snapshot(snapshot("ops"));

        cache.apply_room_message("ops", message(1, "draft"));
        cache.apply_room_message("ops", message(2, "other"));
        cache.apply_room_message("ops", message(1, "final"));

        let messages = &cache.room("ops").unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "final");
    }

    #[test]
    fn test_apply_room_message_unknown_room_is_dropped() {
        let mut cache = ClientCache::new();
        cache.apply_room_message("ghost", message(1, "x"));
        assert!(cache.room("ghost").is_none());
    }

    #[test]
    fn test_file_deltas_track_server_state() {
        let mut cache = ClientCache::new();
        cache.apply_snapshot(snapshot("ops"));
        let file = FileDescription {
            id: FileId {
                owner: "alice".into(),
                local: 1,
            },
            name: "a.bin".into(),
            size: 10,
        };

        cache.apply_file_posted("ops", file.clone());
        assert_eq!(cache.room("ops").unwrap().files.len(), 1);

        cache.apply_file_removed("ops", &file.id);
        assert!(cache.room("ops").unwrap().files.is_empty());
    }

    #[test]
    fn test_remove_room_forgets_everything_about_it() {
        let mut cache = ClientCache::new();
        cache.apply_snapshot(snapshot("ops"));

        cache.remove_room("ops");

        assert!(cache.room("ops").is_none());
        assert!(cache.room_names().is_empty());
    }
}
