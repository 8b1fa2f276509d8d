//! A single room: members, messages, files, and the voice link map.

use std::collections::{BTreeMap, HashMap};

use parley_protocol::{FileDescription, FileId, Message, RoomSnapshot, User};

use crate::ChatError;

/// A named group of users sharing messages and files, optionally
/// voice-capable.
///
/// Members are stored in join order; that order is what makes the voice
/// link map triangular (each member's entry lists only later-joined
/// peers, so every pair appears exactly once).
#[derive(Debug)]
pub struct Room {
    name: String,
    admin: String,
    members: Vec<String>,
    messages: BTreeMap<u64, Message>,
    next_message_id: u64,
    files: HashMap<FileId, FileDescription>,
    /// Present only for voice-capable rooms: member → later-joined peers
    /// they hold the direct link to.
    voice_links: Option<HashMap<String, Vec<String>>>,
}

impl Room {
    /// Creates a room with a single member, the admin.
    pub fn new(name: &str, admin: &str, voice: bool) -> Self {
        let mut room = Self {
            name: name.to_string(),
            admin: admin.to_string(),
            members: Vec::new(),
            messages: BTreeMap::new(),
            next_message_id: 1,
            files: HashMap::new(),
            voice_links: voice.then(HashMap::new),
        };
        room.add_member(admin);
        room
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn admin(&self) -> &str {
        &self.admin
    }

    pub fn is_voice(&self) -> bool {
        self.voice_links.is_some()
    }

    /// Current members in join order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.members.iter().any(|m| m == nick)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The voice link map, if this is a voice room. Each entry lists only
    /// higher-ordered peers: N members produce N(N-1)/2 links in total.
    pub fn voice_links(&self) -> Option<&HashMap<String, Vec<String>>> {
        self.voice_links.as_ref()
    }

    /// Adds a member. Returns `false` if already present.
    ///
    /// For voice rooms every existing member gains a link to the
    /// newcomer; the newcomer starts with an empty entry.
    pub fn add_member(&mut self, nick: &str) -> bool {
        if self.contains(nick) {
            return false;
        }
        if let Some(links) = &mut self.voice_links {
            for entry in links.values_mut() {
                entry.push(nick.to_string());
            }
            links.insert(nick.to_string(), Vec::new());
        }
        self.members.push(nick.to_string());
        true
    }

    /// Removes a member. Returns `false` if not present.
    ///
    /// For voice rooms the member's own entry is deleted and they are
    /// removed from every other member's entry. If the admin leaves, the
    /// longest-standing remaining member is promoted.
    pub fn remove_member(&mut self, nick: &str) -> bool {
        let Some(pos) = self.members.iter().position(|m| m == nick) else {
            return false;
        };
        self.members.remove(pos);
        if let Some(links) = &mut self.voice_links {
            links.remove(nick);
            for entry in links.values_mut() {
                entry.retain(|peer| peer != nick);
            }
        }
        if self.admin == nick {
            self.admin = self.members.first().cloned().unwrap_or_default();
        }
        true
    }

    /// Transfers admin rights. The new admin must be a member.
    pub fn set_admin(&mut self, nick: &str) -> Result<(), ChatError> {
        if !self.contains(nick) {
            return Err(ChatError::NotAMember {
                room: self.name.clone(),
                nick: nick.to_string(),
            });
        }
        self.admin = nick.to_string();
        Ok(())
    }

    /// Stores a new message under the next monotonic id and returns it.
    pub fn add_message(
        &mut self,
        owner: &str,
        text: &str,
        timestamp: u64,
    ) -> &Message {
        let id = self.next_message_id;
        self.next_message_id += 1;
        let message = Message {
            id,
            owner: owner.to_string(),
            text: text.to_string(),
            timestamp,
        };
        self.messages.insert(id, message);
        &self.messages[&id]
    }

    /// Edits a message in place. Only the owner may edit; any other
    /// requester leaves the message unchanged.
    pub fn edit_message(
        &mut self,
        requester: &str,
        id: u64,
        new_text: &str,
    ) -> Result<&Message, ChatError> {
        let message = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| ChatError::MessageNotFound(self.name.clone(), id))?;
        if message.owner != requester {
            return Err(ChatError::AccessDenied {
                nick: requester.to_string(),
                action: format!("edit message {id}"),
            });
        }
        message.text = new_text.to_string();
        Ok(&self.messages[&id])
    }

    /// Idempotent bulk delete: ids not present are silently ignored.
    /// Returns the ids actually removed.
    pub fn remove_messages(&mut self, ids: &[u64]) -> Vec<u64> {
        ids.iter()
            .copied()
            .filter(|id| self.messages.remove(id).is_some())
            .collect()
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.get(&id)
    }

    /// Registers a file offer.
    pub fn add_file(&mut self, file: FileDescription) {
        self.files.insert(file.id.clone(), file);
    }

    /// Removes a file offer. Permitted only for the room admin or the
    /// file's owner.
    pub fn remove_file(
        &mut self,
        requester: &str,
        file_id: &FileId,
    ) -> Result<FileDescription, ChatError> {
        let file = self.files.get(file_id).ok_or_else(|| {
            ChatError::FileNotFound(self.name.clone(), file_id.clone())
        })?;
        if requester != self.admin && requester != file.id.owner {
            return Err(ChatError::AccessDenied {
                nick: requester.to_string(),
                action: format!("remove file {file_id}"),
            });
        }
        Ok(self.files.remove(file_id).expect("checked above"))
    }

    /// Post-mutation snapshot for refresh/open notifications. `users`
    /// resolves member nicks to their wire representation; a nick missing
    /// from it (mid-unregister) is skipped.
    pub fn snapshot(&self, users: &HashMap<String, User>) -> RoomSnapshot {
        let mut files: Vec<FileDescription> =
            self.files.values().cloned().collect();
        files.sort_by(|a, b| (&a.id.owner, a.id.local).cmp(&(&b.id.owner, b.id.local)));
        RoomSnapshot {
            name: self.name.clone(),
            admin: self.admin.clone(),
            members: self
                .members
                .iter()
                .filter_map(|nick| users.get(nick).cloned())
                .collect(),
            messages: self.messages.values().cloned().collect(),
            files,
            voice: self.is_voice(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
