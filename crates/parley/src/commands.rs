//! Peer-origin command handlers: the server's dispatch table.
//!
//! Every handler follows the same shape: decode already happened in the
//! registry, domain mutations and their notification frames are built
//! under the chat guard, and delivery happens under the sessions guard.
//! Domain refusals (unknown room, access denied, taken nick) answer the
//! requester with a coded system message and count as handled; only
//! frame-level failures surface as dispatch errors.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parley_chat::{ChatError, RoomChange};
use parley_protocol::{
    CommandRegistry, ConnectRequest, ConnectToPeer, ConnectToService,
    CreateRoom, DeleteRoom, ExitRoom, FileDescription, FileId, FilePosted,
    FileRemoved, GetUserKey, InviteRoom, JsonCodec, KickRoom, Origin,
    OutPrivateMessage, OutRoomMessage, PlayVoiceIn, PlayVoiceOut, PostFile,
    PrivateMessageIn, ProtocolError, ReadyAccept, RefreshRoom, Register,
    RegisterResponse, RemoveFile, RemoveMessages, RoomClosed, RoomMessageIn,
    RoomOpened, RoomRefreshed, SetRoomAdmin, User, UserKey,
    WaitPeerConnection, code, frame, id,
};
use parley_rendezvous::HandshakeState;
use parley_session::{SessionError, SessionRegistry};

use crate::admin;
use crate::handler::{self, HandlerCtx};

/// Builds the server's dispatch table over [`HandlerCtx`].
pub(crate) fn registry(codec: JsonCodec) -> CommandRegistry<HandlerCtx> {
    let mut registry = CommandRegistry::new();

    registry.register_empty(id::EMPTY, Origin::Peer, |_ctx| {
        Box::pin(async { Ok(()) })
    });

    registry.register_empty(id::PING, Origin::Peer, |ctx: Arc<HandlerCtx>| {
        Box::pin(async move {
            ctx.reply_frame(frame::encode(id::PONG, &[])).await;
            Ok(())
        })
    });

    registry.register_empty(id::PONG, Origin::Peer, |ctx: Arc<HandlerCtx>| {
        Box::pin(async move {
            ctx.state.sessions.lock().await.record_pong(ctx.connection);
            Ok(())
        })
    });

    registry.register_typed(id::REGISTER, Origin::Peer, codec, handle_register);
    registry.register_empty(id::UNREGISTER, Origin::Peer, handle_unregister);
    registry.register_typed(id::ROOM_MESSAGE, Origin::Peer, codec, handle_room_message);
    registry.register_typed(id::REMOVE_MESSAGES, Origin::Peer, codec, handle_remove_messages);
    registry.register_typed(id::PRIVATE_MESSAGE, Origin::Peer, codec, handle_private_message);
    registry.register_typed(id::GET_USER_KEY, Origin::Peer, codec, handle_get_user_key);
    registry.register_typed(id::CREATE_ROOM, Origin::Peer, codec, handle_create_room);
    registry.register_typed(id::DELETE_ROOM, Origin::Peer, codec, handle_delete_room);
    registry.register_typed(id::INVITE_ROOM, Origin::Peer, codec, handle_invite);
    registry.register_typed(id::KICK_ROOM, Origin::Peer, codec, handle_kick);
    registry.register_typed(id::EXIT_ROOM, Origin::Peer, codec, handle_exit);
    registry.register_typed(id::REFRESH_ROOM, Origin::Peer, codec, handle_refresh);
    registry.register_typed(id::SET_ROOM_ADMIN, Origin::Peer, codec, handle_set_admin);
    registry.register_typed(id::POST_FILE, Origin::Peer, codec, handle_post_file);
    registry.register_typed(id::REMOVE_FILE, Origin::Peer, codec, handle_remove_file);
    registry.register_typed(id::CONNECT_REQUEST, Origin::Peer, codec, handle_connect_request);
    registry.register_typed(id::READY_ACCEPT, Origin::Peer, codec, handle_ready_accept);
    registry.register_typed(id::PLAY_VOICE, Origin::Peer, codec, handle_play_voice);
    registry.register_typed(id::ADMIN, Origin::Peer, codec, admin::handle);

    registry
}

/// Server-assigned message timestamp, milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn handle_register(
    ctx: Arc<HandlerCtx>,
    request: Register,
) -> Result<(), ProtocolError> {
    // Static check first: reserved nicks never touch chat state.
    if SessionRegistry::validate_nick(&request.nick).is_err() {
        return ctx
            .reply(
                id::REGISTER_RESPONSE,
                &RegisterResponse {
                    registered: false,
                    reason: Some(code::NICK_RESERVED),
                },
            )
            .await;
    }

    let refresh = {
        let mut chat = ctx.state.chat.lock().await;
        if let Err(error) = chat.register_user(User {
            nick: request.nick.clone(),
            public_key: request.public_key,
            voice_active: false,
        }) {
            let reason = match error {
                ChatError::NickReserved(_) => code::NICK_RESERVED,
                _ => code::NICK_TAKEN,
            };
            return ctx
                .reply(
                    id::REGISTER_RESPONSE,
                    &RegisterResponse {
                        registered: false,
                        reason: Some(reason),
                    },
                )
                .await;
        }

        let mut sessions = ctx.state.sessions.lock().await;
        if let Err(error) = sessions.promote(ctx.connection, &request.nick) {
            // Chat accepted the nick but the session layer did not
            // (taken by a racing connection, or this connection is
            // already registered). Roll the chat side back.
            chat.unregister_user(&request.nick);
            let reason = match error {
                SessionError::NickReserved(_) => code::NICK_RESERVED,
                SessionError::NickTaken(_) => code::NICK_TAKEN,
                _ => code::ACCESS_DENIED,
            };
            drop(sessions);
            drop(chat);
            return ctx
                .reply(
                    id::REGISTER_RESPONSE,
                    &RegisterResponse {
                        registered: false,
                        reason: Some(reason),
                    },
                )
                .await;
        }
        drop(sessions);

        tracing::info!(nick = %request.nick, conn = %ctx.connection, "user registered");
        let change = RoomChange::Refreshed {
            room: parley_chat::MAIN_ROOM.to_string(),
            recipients: chat
                .members_of(parley_chat::MAIN_ROOM)
                .unwrap_or_default(),
        };
        handler::room_change_frame(&ctx.state, &chat, &change)
    };

    ctx.reply(
        id::REGISTER_RESPONSE,
        &RegisterResponse {
            registered: true,
            reason: None,
        },
    )
    .await?;

    if let Some((recipients, bytes)) = refresh {
        ctx.broadcast(&recipients, &bytes).await;
    }
    Ok(())
}

async fn handle_unregister(ctx: Arc<HandlerCtx>) -> Result<(), ProtocolError> {
    let nick = {
        let mut sessions = ctx.state.sessions.lock().await;
        match sessions.demote(ctx.connection) {
            Ok(nick) => nick,
            Err(error) => {
                tracing::debug!(conn = %ctx.connection, %error, "unregister ignored");
                return Ok(());
            }
        }
    };
    tracing::info!(%nick, conn = %ctx.connection, "user unregistered");
    handler::unregister_cleanup(&ctx.state, &nick).await;
    Ok(())
}

async fn handle_room_message(
    ctx: Arc<HandlerCtx>,
    request: RoomMessageIn,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let outcome = {
        let mut chat = ctx.state.chat.lock().await;
        match request.edit_id {
            Some(id) => chat.edit_message(&request.room, &nick, id, &request.text),
            None => chat.add_message(&request.room, &nick, &request.text, now_millis()),
        }
    };
    let (message, recipients) = match outcome {
        Ok(result) => result,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let bytes = ctx.encode(
        id::OUT_ROOM_MESSAGE,
        &OutRoomMessage {
            room: request.room,
            message,
        },
    )?;
    ctx.broadcast(&recipients, &bytes).await;
    Ok(())
}

/// Bulk message removal, answered with a refresh that carries the ids
/// actually removed so recipients can prune without resending history.
async fn handle_remove_messages(
    ctx: Arc<HandlerCtx>,
    request: RemoveMessages,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let outcome = {
        let mut chat = ctx.state.chat.lock().await;
        chat.remove_messages(&request.room, &nick, &request.ids)
            .and_then(|(removed, recipients)| {
                chat.snapshot(&request.room)
                    .map(|snapshot| (removed, recipients, snapshot))
            })
    };
    let (removed, recipients, snapshot) = match outcome {
        Ok(result) => result,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let bytes = ctx.encode(
        id::ROOM_REFRESHED,
        &RoomRefreshed {
            room: snapshot,
            removed_messages: removed,
        },
    )?;
    ctx.broadcast(&recipients, &bytes).await;
    Ok(())
}

async fn handle_private_message(
    ctx: Arc<HandlerCtx>,
    request: PrivateMessageIn,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let bytes = ctx.encode(
        id::OUT_PRIVATE_MESSAGE,
        &OutPrivateMessage {
            from: nick,
            text: request.text,
            timestamp: now_millis(),
        },
    )?;
    let delivered = ctx
        .state
        .sessions
        .lock()
        .await
        .send_to_nick(&request.to, bytes);
    if delivered.is_err() {
        return ctx
            .reply_system(code::USER_NOT_FOUND, vec![request.to])
            .await;
    }
    Ok(())
}

async fn handle_get_user_key(
    ctx: Arc<HandlerCtx>,
    request: GetUserKey,
) -> Result<(), ProtocolError> {
    if ctx.require_nick().await?.is_none() {
        return Ok(());
    }
    let key = ctx
        .state
        .chat
        .lock()
        .await
        .user(&request.nick)
        .map(|u| u.public_key.clone());
    match key {
        Some(public_key) => {
            ctx.reply(
                id::USER_KEY,
                &UserKey {
                    nick: request.nick,
                    public_key,
                },
            )
            .await
        }
        None => {
            ctx.reply_system(code::USER_NOT_FOUND, vec![request.nick])
                .await
        }
    }
}

async fn handle_create_room(
    ctx: Arc<HandlerCtx>,
    request: CreateRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let opened = {
        let mut chat = ctx.state.chat.lock().await;
        chat.open_room(&nick, &request.name, &request.members, request.voice)
            .and_then(|members| {
                chat.snapshot(&request.name).map(|s| (members, s))
            })
    };
    let (members, snapshot) = match opened {
        Ok(result) => result,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let bytes = ctx.encode(id::ROOM_OPENED, &RoomOpened { room: snapshot })?;
    ctx.broadcast(&members, &bytes).await;
    Ok(())
}

async fn handle_delete_room(
    ctx: Arc<HandlerCtx>,
    request: DeleteRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let closed = {
        let mut chat = ctx.state.chat.lock().await;
        chat.delete_room(&nick, &request.name)
            .map(|change| handler::room_change_frame(&ctx.state, &chat, &change))
    };
    match closed {
        Ok(Some((recipients, bytes))) => {
            ctx.broadcast(&recipients, &bytes).await;
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

async fn handle_invite(
    ctx: Arc<HandlerCtx>,
    request: InviteRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let refreshed = {
        let mut chat = ctx.state.chat.lock().await;
        chat.invite(&request.room, &nick, &request.nick).map(|change| {
            change.and_then(|c| handler::room_change_frame(&ctx.state, &chat, &c))
        })
    };
    match refreshed {
        // Already a member: no visible change, nothing to broadcast.
        Ok(None) => Ok(()),
        Ok(Some((recipients, bytes))) => {
            ctx.broadcast(&recipients, &bytes).await;
            Ok(())
        }
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

async fn handle_kick(
    ctx: Arc<HandlerCtx>,
    request: KickRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let outcome = {
        let mut chat = ctx.state.chat.lock().await;
        chat.kick(&request.room, &nick, &request.nick)
            .map(|change| handler::room_change_frame(&ctx.state, &chat, &change))
    };
    match outcome {
        Ok(refresh) => {
            notify_removed_member(&ctx, &request.room, &request.nick, refresh).await
        }
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

async fn handle_exit(
    ctx: Arc<HandlerCtx>,
    request: ExitRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let outcome = {
        let mut chat = ctx.state.chat.lock().await;
        chat.remove_member(&request.room, &nick)
            .map(|change| handler::room_change_frame(&ctx.state, &chat, &change))
    };
    match outcome {
        Ok(refresh) => notify_removed_member(&ctx, &request.room, &nick, refresh).await,
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

/// Remaining members see the refresh (or closure); the removed member's
/// view of the room ends with a closure notice of their own.
async fn notify_removed_member(
    ctx: &HandlerCtx,
    room: &str,
    removed: &str,
    refresh: Option<(Vec<String>, Vec<u8>)>,
) -> Result<(), ProtocolError> {
    let closed = ctx.encode(
        id::ROOM_CLOSED,
        &RoomClosed {
            room: room.to_string(),
        },
    )?;
    let sessions = ctx.state.sessions.lock().await;
    if let Some((recipients, bytes)) = refresh {
        sessions.broadcast(&recipients, &bytes);
    }
    if let Err(error) = sessions.send_to_nick(removed, closed) {
        tracing::debug!(nick = removed, %error, "closure notice dropped");
    }
    Ok(())
}

async fn handle_refresh(
    ctx: Arc<HandlerCtx>,
    request: RefreshRoom,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let snapshot = {
        let chat = ctx.state.chat.lock().await;
        chat.room(&request.room).and_then(|room| {
            if room.contains(&nick) {
                chat.snapshot(&request.room)
            } else {
                Err(ChatError::NotAMember {
                    room: request.room.clone(),
                    nick: nick.clone(),
                })
            }
        })
    };
    match snapshot {
        Ok(snapshot) => {
            ctx.reply(
                id::ROOM_REFRESHED,
                &RoomRefreshed {
                    room: snapshot,
                    removed_messages: Vec::new(),
                },
            )
            .await
        }
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

async fn handle_set_admin(
    ctx: Arc<HandlerCtx>,
    request: SetRoomAdmin,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let refreshed = {
        let mut chat = ctx.state.chat.lock().await;
        chat.set_admin(&request.room, &nick, &request.nick).map(|recipients| {
            let change = RoomChange::Refreshed {
                room: request.room.clone(),
                recipients,
            };
            handler::room_change_frame(&ctx.state, &chat, &change)
        })
    };
    match refreshed {
        Ok(Some((recipients, bytes))) => {
            ctx.broadcast(&recipients, &bytes).await;
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

async fn handle_post_file(
    ctx: Arc<HandlerCtx>,
    request: PostFile,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let file = FileDescription {
        id: FileId {
            owner: nick.clone(),
            local: request.local_id,
        },
        name: request.name,
        size: request.size,
    };
    let added = {
        let mut chat = ctx.state.chat.lock().await;
        chat.add_file(&request.room, &nick, file.clone())
    };
    let recipients = match added {
        Ok(recipients) => recipients,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let bytes = ctx.encode(
        id::FILE_POSTED,
        &FilePosted {
            room: request.room,
            file,
        },
    )?;
    ctx.broadcast(&recipients, &bytes).await;
    Ok(())
}

async fn handle_remove_file(
    ctx: Arc<HandlerCtx>,
    request: RemoveFile,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let removed = {
        let mut chat = ctx.state.chat.lock().await;
        chat.remove_file(&request.room, &nick, &request.file_id)
    };
    let (_, recipients) = match removed {
        Ok(result) => result,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let bytes = ctx.encode(
        id::FILE_REMOVED,
        &FileRemoved {
            room: request.room,
            file_id: request.file_id,
        },
    )?;
    ctx.broadcast(&recipients, &bytes).await;
    Ok(())
}

/// First leg of the rendezvous handshake.
///
/// The requester is parked with the relay coordinates; the target gets
/// the requester's identity, key, and observed endpoint so it can try a
/// direct connection first.
async fn handle_connect_request(
    ctx: Arc<HandlerCtx>,
    request: ConnectRequest,
) -> Result<(), ProtocolError> {
    let Some(requester) = ctx.require_nick().await? else {
        return Ok(());
    };
    let target = request.nick;

    let target_online = ctx.state.sessions.lock().await.is_registered(&target);
    if !target_online || target == requester {
        return ctx.reply_system(code::USER_NOT_FOUND, vec![target]).await;
    }
    let public_key = {
        let chat = ctx.state.chat.lock().await;
        match chat.user(&requester) {
            Some(user) => user.public_key.clone(),
            None => {
                return ctx
                    .reply_system(code::USER_NOT_FOUND, vec![requester])
                    .await;
            }
        }
    };

    let token = {
        let mut pending = ctx.state.pending.lock().await;
        match pending.open(&requester, &target) {
            Ok(entry) => entry.token.clone(),
            Err(error) => {
                tracing::debug!(%requester, %target, %error, "handshake refused");
                return ctx
                    .reply_system(
                        code::ALREADY_IN_PROGRESS,
                        vec![requester, target],
                    )
                    .await;
            }
        }
    };

    ctx.reply(
        id::WAIT_PEER_CONNECTION,
        &WaitPeerConnection {
            peer: target.clone(),
            service_addr: ctx.state.relay_addr.clone(),
            token: token.clone(),
        },
    )
    .await?;
    let _ = ctx
        .state
        .pending
        .lock()
        .await
        .advance(&token, HandshakeState::Introduced);

    let endpoint = ctx
        .peer_addr
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    let bytes = ctx.encode(
        id::CONNECT_TO_PEER,
        &ConnectToPeer {
            nick: requester,
            public_key,
            endpoint,
            token: token.clone(),
        },
    )?;
    {
        let sessions = ctx.state.sessions.lock().await;
        if let Err(error) = sessions.send_to_nick(&target, bytes) {
            tracing::debug!(nick = %target, %error, "introduction dropped");
        }
    }
    let _ = ctx
        .state
        .pending
        .lock()
        .await
        .advance(&token, HandshakeState::Ready);
    Ok(())
}

/// Second leg: the target reports whether the direct attempt worked.
///
/// Either way the handshake entry is finished here. On failure the
/// target is redirected to the relay, where the requester's channel is
/// already parked under the same token.
async fn handle_ready_accept(
    ctx: Arc<HandlerCtx>,
    request: ReadyAccept,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let entry = {
        let mut pending = ctx.state.pending.lock().await;
        let known = pending
            .by_token(&request.token)
            .map(|e| e.target.clone());
        match known {
            Some(target) if target == nick => pending.complete(&request.token).ok(),
            Some(_) => {
                drop(pending);
                return ctx
                    .reply_system(code::ACCESS_DENIED, vec![request.token])
                    .await;
            }
            None => None,
        }
    };
    let Some(entry) = entry else {
        // Expired or never existed; same answer as a timed-out handshake.
        return ctx
            .reply_system(code::PEER_CONNECT_TIMEOUT, vec![request.token])
            .await;
    };

    if request.accepted {
        tracing::info!(
            requester = %entry.requester,
            target = %entry.target,
            "peers connected directly"
        );
        return Ok(());
    }
    // Direct attempt failed: fall back to the relay.
    ctx.reply(
        id::CONNECT_TO_SERVICE,
        &ConnectToService {
            service_addr: ctx.state.relay_addr.clone(),
            token: request.token,
        },
    )
    .await
}

async fn handle_play_voice(
    ctx: Arc<HandlerCtx>,
    request: PlayVoiceIn,
) -> Result<(), ProtocolError> {
    let Some(nick) = ctx.require_nick().await? else {
        return Ok(());
    };
    let outcome = {
        let mut chat = ctx.state.chat.lock().await;
        let check = chat.room(&request.room).and_then(|room| {
            if !room.contains(&nick) {
                Err(ChatError::NotAMember {
                    room: request.room.clone(),
                    nick: nick.clone(),
                })
            } else if !room.is_voice() {
                Err(ChatError::AccessDenied {
                    nick: nick.clone(),
                    action: format!("play voice in {}", request.room),
                })
            } else {
                Ok(room.members().to_vec())
            }
        });
        if check.is_ok() {
            let _ = chat.set_voice_active(&nick, true);
        }
        check
    };
    let members = match outcome {
        Ok(members) => members,
        Err(error) => return ctx.reply_chat_error(&error).await,
    };
    let recipients: Vec<String> =
        members.into_iter().filter(|m| m != &nick).collect();
    let bytes = ctx.encode(
        id::PLAY_VOICE,
        &PlayVoiceOut {
            room: request.room,
            from: nick,
            data: request.data,
        },
    )?;
    ctx.broadcast(&recipients, &bytes).await;
    Ok(())
}
