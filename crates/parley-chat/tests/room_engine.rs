//! Integration tests for the room engine: full user lifecycles driven
//! through the public `ChatState` API.

use parley_chat::{ChatError, ChatState, MAIN_ROOM, RoomChange};
use parley_protocol::{FileDescription, FileId, User};

// =========================================================================
// Helpers
// =========================================================================

fn user(nick: &str) -> User {
    User {
        nick: nick.into(),
        public_key: format!("pk-{nick}"),
        voice_active: false,
    }
}

fn populated(nicks: &[&str]) -> ChatState {
    let mut state = ChatState::new();
    for nick in nicks {
        state.register_user(user(nick)).expect("should register");
    }
    state
}

fn file(owner: &str, local: u64, name: &str) -> FileDescription {
    FileDescription {
        id: FileId {
            owner: owner.into(),
            local,
        },
        name: name.into(),
        size: 2048,
    }
}

// =========================================================================
// Registration and the main room
// =========================================================================

#[test]
fn test_fresh_state_has_only_empty_main_room() {
    let state = ChatState::new();
    assert_eq!(state.room_count(), 1);
    assert!(state.room_exists(MAIN_ROOM));
    assert!(state.room(MAIN_ROOM).unwrap().is_empty());
    assert_eq!(state.user_count(), 0);
}

#[test]
fn test_registration_is_visible_in_main_room_snapshot() {
    let state = populated(&["alice", "bob"]);

    let snapshot = state.snapshot(MAIN_ROOM).unwrap();

    assert_eq!(snapshot.members.len(), 2);
    let nicks: Vec<&str> =
        snapshot.members.iter().map(|u| u.nick.as_str()).collect();
    assert_eq!(nicks, ["alice", "bob"]);
    assert_eq!(snapshot.members[0].public_key, "pk-alice");
}

#[test]
fn test_nick_is_reusable_after_unregister() {
    let mut state = populated(&["alice"]);
    state.unregister_user("alice");

    assert!(state.register_user(user("alice")).is_ok());
    assert!(state.room(MAIN_ROOM).unwrap().contains("alice"));
}

// =========================================================================
// A full room lifecycle: open, chat, share, churn, close
// =========================================================================

#[test]
fn test_room_lifecycle_end_to_end() {
    let mut state = populated(&["alice", "bob", "carol"]);

    // alice opens a room with bob.
    let members = state
        .open_room("alice", "planning", &["bob".into()], false)
        .unwrap();
    assert_eq!(members, ["alice", "bob"]);

    // They chat; ids are monotonic and owners preserved.
    let (m1, _) = state.add_message("planning", "alice", "agenda?", 1).unwrap();
    let (m2, _) = state.add_message("planning", "bob", "budgets", 2).unwrap();
    assert!(m2.id > m1.id);

    // bob shares a file, then alice invites carol.
    state
        .add_file("planning", "bob", file("bob", 1, "budget.ods"))
        .unwrap();
    let change = state.invite("planning", "alice", "carol").unwrap().unwrap();
    assert!(matches!(
        change,
        RoomChange::Refreshed { ref recipients, .. }
            if recipients == &["alice", "bob", "carol"]
    ));

    // carol arrives to the full history.
    let snapshot = state.snapshot("planning").unwrap();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.files.len(), 1);
    assert_eq!(snapshot.files[0].name, "budget.ods");

    // alice deletes the room; everyone is in the closed set.
    let change = state.delete_room("alice", "planning").unwrap();
    match change {
        RoomChange::Closed { recipients, .. } => {
            assert_eq!(recipients, ["alice", "bob", "carol"]);
        }
        other => panic!("expected Closed, got {other:?}"),
    }
    assert!(!state.room_exists("planning"));
    // Main room membership is untouched.
    assert_eq!(state.room(MAIN_ROOM).unwrap().members().len(), 3);
}

#[test]
fn test_exit_then_last_member_exit_closes_room() {
    let mut state = populated(&["alice", "bob"]);
    state.open_room("alice", "duo", &["bob".into()], false).unwrap();

    let change = state.remove_member("duo", "alice").unwrap();
    assert!(matches!(change, RoomChange::Refreshed { .. }));
    assert_eq!(state.room("duo").unwrap().admin(), "bob");

    let change = state.remove_member("duo", "bob").unwrap();
    assert!(matches!(change, RoomChange::Closed { .. }));
    assert!(!state.room_exists("duo"));
}

#[test]
fn test_exit_main_room_does_not_close_it() {
    let mut state = populated(&["alice"]);

    let change = state.remove_member(MAIN_ROOM, "alice").unwrap();

    assert!(matches!(change, RoomChange::Refreshed { .. }));
    assert!(state.room_exists(MAIN_ROOM));
}

// =========================================================================
// Unregistration fans out across rooms
// =========================================================================

#[test]
fn test_unregister_produces_one_change_per_room() {
    let mut state = populated(&["alice", "bob"]);
    state.open_room("alice", "a", &["bob".into()], false).unwrap();
    state.open_room("alice", "b", &[], false).unwrap();

    let changes = state.unregister_user("alice");

    // main + "a" refreshed, "b" closed (alice was its only member).
    assert_eq!(changes.len(), 3);
    let closed: Vec<&str> = changes
        .iter()
        .filter_map(|c| match c {
            RoomChange::Closed { room, .. } => Some(room.as_str()),
            RoomChange::Refreshed { .. } => None,
        })
        .collect();
    assert_eq!(closed, ["b"]);
    assert!(!state.room_exists("b"));
    assert!(state.room("a").unwrap().contains("bob"));
}

#[test]
fn test_unregister_mid_room_promotes_new_admin() {
    let mut state = populated(&["alice", "bob", "carol"]);
    state
        .open_room("alice", "ops", &["bob".into(), "carol".into()], false)
        .unwrap();

    state.unregister_user("alice");

    let room = state.room("ops").unwrap();
    assert_eq!(room.admin(), "bob");
    assert_eq!(room.members(), ["bob", "carol"]);
}

// =========================================================================
// Voice rooms through the state layer
// =========================================================================

#[test]
fn test_voice_room_links_follow_membership_churn() {
    let mut state = populated(&["a", "b", "c", "d"]);
    state
        .open_room("a", "talk", &["b".into(), "c".into()], true)
        .unwrap();

    // 3 members → 3 links.
    let total: usize = state
        .room("talk")
        .unwrap()
        .voice_links()
        .unwrap()
        .values()
        .map(Vec::len)
        .sum();
    assert_eq!(total, 3);

    state.invite("talk", "a", "d").unwrap();
    state.kick("talk", "a", "b").unwrap();

    // {a, c, d} → 3 links, none referencing b.
    let links = state.room("talk").unwrap().voice_links().unwrap();
    let total: usize = links.values().map(Vec::len).sum();
    assert_eq!(total, 3);
    assert!(!links.contains_key("b"));
    assert!(links.values().all(|peers| !peers.contains(&"b".to_string())));
}

#[test]
fn test_voice_active_flag_shows_in_snapshots() {
    let mut state = populated(&["alice", "bob"]);
    state.open_room("alice", "talk", &["bob".into()], true).unwrap();

    state.set_voice_active("bob", true).unwrap();

    let snapshot = state.snapshot("talk").unwrap();
    let bob = snapshot.members.iter().find(|u| u.nick == "bob").unwrap();
    assert!(bob.voice_active);
    assert!(snapshot.voice);
}

// =========================================================================
// Permission surface
// =========================================================================

#[test]
fn test_message_and_file_permissions_through_state() {
    let mut state = populated(&["alice", "bob", "mallory"]);
    state.open_room("alice", "ops", &["bob".into()], false).unwrap();

    // Outsiders cannot post messages or files.
    assert!(matches!(
        state.add_message("ops", "mallory", "hi", 1),
        Err(ChatError::NotAMember { .. })
    ));
    assert!(matches!(
        state.add_file("ops", "mallory", file("mallory", 1, "x.bin")),
        Err(ChatError::NotAMember { .. })
    ));

    // Members can; only the owner may edit.
    let (message, _) = state.add_message("ops", "bob", "draft", 2).unwrap();
    assert!(matches!(
        state.edit_message("ops", "alice", message.id, "defaced"),
        Err(ChatError::AccessDenied { .. })
    ));
    let (edited, _) =
        state.edit_message("ops", "bob", message.id, "final").unwrap();
    assert_eq!(edited.text, "final");
    assert_eq!(edited.id, message.id);

    // Admin removes bob's file even without owning it.
    state.add_file("ops", "bob", file("bob", 7, "notes.txt")).unwrap();
    let fid = FileId {
        owner: "bob".into(),
        local: 7,
    };
    let (removed, _) = state.remove_file("ops", "alice", &fid).unwrap();
    assert_eq!(removed.name, "notes.txt");
}

#[test]
fn test_set_admin_requires_current_admin() {
    let mut state = populated(&["alice", "bob", "carol"]);
    state
        .open_room("alice", "ops", &["bob".into(), "carol".into()], false)
        .unwrap();

    assert!(matches!(
        state.set_admin("ops", "bob", "carol"),
        Err(ChatError::AccessDenied { .. })
    ));

    state.set_admin("ops", "alice", "bob").unwrap();
    assert_eq!(state.room("ops").unwrap().admin(), "bob");

    // The old admin is now a regular member.
    assert!(matches!(
        state.set_admin("ops", "alice", "carol"),
        Err(ChatError::AccessDenied { .. })
    ));
}

#[test]
fn test_remove_messages_bulk_reports_only_real_removals() {
    let mut state = populated(&["alice", "bob"]);
    state.open_room("alice", "ops", &["bob".into()], false).unwrap();
    let (m1, _) = state.add_message("ops", "alice", "one", 1).unwrap();
    let (m2, _) = state.add_message("ops", "bob", "two", 2).unwrap();
    let (m3, _) = state.add_message("ops", "alice", "three", 3).unwrap();

    // Bulk removal by the admin; the missing id is skipped.
    let (removed, recipients) = state
        .remove_messages("ops", "alice", &[m1.id, m3.id, 99])
        .unwrap();
    assert_eq!(removed, vec![m1.id, m3.id]);
    assert_eq!(recipients, vec!["alice".to_string(), "bob".to_string()]);

    // Surviving message intact; a second pass removes nothing.
    let snapshot = state.snapshot("ops").unwrap();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].id, m2.id);
    let (removed, _) =
        state.remove_messages("ops", "alice", &[m1.id]).unwrap();
    assert!(removed.is_empty());
}
