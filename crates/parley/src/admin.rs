//! Password-gated administrative command.
//!
//! A single wire command carries a subcommand name and its arguments.
//! The secret is checked before the subcommand is even looked at, and a
//! server started without a secret rejects every request. Replies travel
//! as coded system messages on the requesting connection, so an admin
//! tool needs no registration to operate.

use std::sync::Arc;

use parley_protocol::{Admin, Codec, OutSystemMessage, ProtocolError, code, frame, id};

use crate::handler::{self, HandlerCtx};

pub(crate) async fn handle(
    ctx: Arc<HandlerCtx>,
    request: Admin,
) -> Result<(), ProtocolError> {
    let authorized = ctx
        .state
        .admin_secret
        .as_deref()
        .is_some_and(|secret| secret == request.secret);
    if !authorized {
        tracing::warn!(conn = %ctx.connection, command = %request.command, "admin secret rejected");
        return ctx.reply_system(code::WRONG_ADMIN_SECRET, Vec::new()).await;
    }

    match request.command.as_str() {
        "stats" => stats(&ctx).await,
        "close-room" => close_room(&ctx, &request.args).await,
        "broadcast" => broadcast(&ctx, &request.args).await,
        other => {
            ctx.reply_system(
                code::UNKNOWN_ADMIN_COMMAND,
                vec![other.to_string()],
            )
            .await
        }
    }
}

async fn stats(ctx: &HandlerCtx) -> Result<(), ProtocolError> {
    let (users, rooms) = {
        let chat = ctx.state.chat.lock().await;
        (chat.user_count(), chat.room_count())
    };
    let connections = ctx.state.sessions.lock().await.len();
    let pending = ctx.state.pending.lock().await.len();
    ctx.reply_system(
        code::ADMIN_RESULT,
        vec![
            format!("users={users}"),
            format!("rooms={rooms}"),
            format!("connections={connections}"),
            format!("pending={pending}"),
        ],
    )
    .await
}

async fn close_room(
    ctx: &HandlerCtx,
    args: &[String],
) -> Result<(), ProtocolError> {
    let Some(name) = args.first() else {
        return ctx
            .reply_system(
                code::UNKNOWN_ADMIN_COMMAND,
                vec!["close-room needs a room name".to_string()],
            )
            .await;
    };
    let closed = {
        let mut chat = ctx.state.chat.lock().await;
        chat.force_close(name)
            .map(|change| handler::room_change_frame(&ctx.state, &chat, &change))
    };
    match closed {
        Ok(Some((recipients, bytes))) => {
            ctx.broadcast(&recipients, &bytes).await;
            ctx.reply_system(code::ADMIN_RESULT, vec![format!("closed {name}")])
                .await
        }
        Ok(None) => Ok(()),
        Err(error) => ctx.reply_chat_error(&error).await,
    }
}

/// Sends a server-wide notice to every connection, registered or not.
async fn broadcast(
    ctx: &HandlerCtx,
    args: &[String],
) -> Result<(), ProtocolError> {
    let text = args.join(" ");
    let notice = OutSystemMessage::new(code::ADMIN_RESULT, vec![text]);
    let content = ctx.state.codec.encode(&notice)?;
    let bytes = frame::encode(id::OUT_SYSTEM_MESSAGE, &content);
    let sessions = ctx.state.sessions.lock().await;
    let mut reached = 0usize;
    for conn in sessions.connection_ids() {
        if sessions.send_to(conn, bytes.clone()).is_ok() {
            reached += 1;
        }
    }
    drop(sessions);
    ctx.reply_system(code::ADMIN_RESULT, vec![format!("broadcast to {reached}")])
        .await
}
