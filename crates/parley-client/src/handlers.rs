//! Server-origin dispatch registrations for the client.
//!
//! Everything arriving on the server connection is dispatched through
//! the registry built here; the same ids arriving from a peer connection
//! fail the origin check before any handler runs.

use tokio::sync::{Mutex, mpsc};

use parley_protocol::{
    Codec, CommandRegistry, ConnectToPeer, ConnectToService, FilePosted,
    FileRemoved, Origin, OutPrivateMessage, OutRoomMessage, OutSystemMessage,
    PlayVoiceOut, RegisterResponse, RoomClosed, RoomOpened, RoomRefreshed,
    UserKey, WaitPeerConnection, frame, id,
};

use crate::{ClientCache, VoiceSink};

/// What the dispatch loop surfaces to the embedding application. Cache
/// updates happen before the event is emitted, so a listener reading the
/// cache on receipt sees post-notification state.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Outcome of our registration attempt.
    Registered { registered: bool, reason: Option<u16> },
    /// A coded system message (errors, admin results).
    System { code: u16, params: Vec<String> },
    /// A room message arrived (new or edited); the cache already has it.
    RoomMessage { room: String, from: String },
    /// A private message; not cached, delivered only here.
    Private {
        from: String,
        text: String,
        timestamp: u64,
    },
    RoomOpened(String),
    RoomRefreshed(String),
    RoomClosed(String),
    /// Park a connection at the relay and wait for the peer.
    WaitPeer(WaitPeerConnection),
    /// Attempt a direct connection to the requester's endpoint.
    ConnectToPeer(ConnectToPeer),
    /// Direct attempt failed server-side; dial the relay instead.
    ConnectToService(ConnectToService),
}

/// Shared context for the client's dispatch loop.
pub struct ClientCtx {
    pub cache: Mutex<ClientCache>,
    pub voice: Box<dyn VoiceSink>,
    /// Events toward the embedding application.
    pub events: mpsc::UnboundedSender<ClientEvent>,
    /// Encoded frames toward the server (pong replies).
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientCtx {
    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("event listener gone, notification dropped");
        }
    }
}

/// Builds the dispatch table for the server connection.
pub fn server_registry<C>(codec: C) -> CommandRegistry<ClientCtx>
where
    C: Codec + Clone,
{
    let mut registry: CommandRegistry<ClientCtx> = CommandRegistry::new();

    registry.register_empty(id::EMPTY, Origin::Server, |_ctx| {
        Box::pin(async { Ok(()) })
    });

    registry.register_empty(id::PING, Origin::Server, |ctx| {
        Box::pin(async move {
            let pong = frame::encode(id::PONG, &[]);
            if ctx.outbound.send(pong).is_err() {
                tracing::debug!("writer gone, pong dropped");
            }
            Ok(())
        })
    });

    registry.register_typed(
        id::REGISTER_RESPONSE,
        Origin::Server,
        codec.clone(),
        |ctx, response: RegisterResponse| {
            Box::pin(async move {
                if !response.registered {
                    ctx.cache.lock().await.clear_nick();
                }
                ctx.emit(ClientEvent::Registered {
                    registered: response.registered,
                    reason: response.reason,
                });
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::OUT_ROOM_MESSAGE,
        Origin::Server,
        codec.clone(),
        |ctx, out: OutRoomMessage| {
            Box::pin(async move {
                let from = out.message.owner.clone();
                ctx.cache
                    .lock()
                    .await
                    .apply_room_message(&out.room, out.message);
                ctx.emit(ClientEvent::RoomMessage {
                    room: out.room,
                    from,
                });
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::OUT_PRIVATE_MESSAGE,
        Origin::Server,
        codec.clone(),
        |ctx, out: OutPrivateMessage| {
            Box::pin(async move {
                ctx.emit(ClientEvent::Private {
                    from: out.from,
                    text: out.text,
                    timestamp: out.timestamp,
                });
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::OUT_SYSTEM_MESSAGE,
        Origin::Server,
        codec.clone(),
        |ctx, out: OutSystemMessage| {
            Box::pin(async move {
                ctx.emit(ClientEvent::System {
                    code: out.code,
                    params: out.params,
                });
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::USER_KEY,
        Origin::Server,
        codec.clone(),
        |ctx, key: UserKey| {
            Box::pin(async move {
                ctx.cache
                    .lock()
                    .await
                    .cache_key(&key.nick, &key.public_key);
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::ROOM_OPENED,
        Origin::Server,
        codec.clone(),
        |ctx, opened: RoomOpened| {
            Box::pin(async move {
                let name = opened.room.name.clone();
                ctx.cache.lock().await.apply_snapshot(opened.room);
                ctx.emit(ClientEvent::RoomOpened(name));
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::ROOM_REFRESHED,
        Origin::Server,
        codec.clone(),
        |ctx, refreshed: RoomRefreshed| {
            Box::pin(async move {
                let name = refreshed.room.name.clone();
                ctx.cache.lock().await.apply_snapshot(refreshed.room);
                ctx.emit(ClientEvent::RoomRefreshed(name));
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::ROOM_CLOSED,
        Origin::Server,
        codec.clone(),
        |ctx, closed: RoomClosed| {
            Box::pin(async move {
                ctx.cache.lock().await.remove_room(&closed.room);
                ctx.emit(ClientEvent::RoomClosed(closed.room));
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::FILE_POSTED,
        Origin::Server,
        codec.clone(),
        |ctx, posted: FilePosted| {
            Box::pin(async move {
                ctx.cache
                    .lock()
                    .await
                    .apply_file_posted(&posted.room, posted.file);
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::FILE_REMOVED,
        Origin::Server,
        codec.clone(),
        |ctx, removed: FileRemoved| {
            Box::pin(async move {
                ctx.cache
                    .lock()
                    .await
                    .apply_file_removed(&removed.room, &removed.file_id);
                Ok(())
            })
        },
    );

    // Voice relayed through the server. Peer-origin at the server side,
    // server-origin here.
    registry.register_typed(
        id::PLAY_VOICE,
        Origin::Server,
        codec.clone(),
        |ctx, voice: PlayVoiceOut| {
            Box::pin(async move {
                ctx.voice.enqueue(&voice.room, &voice.from, voice.data);
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::WAIT_PEER_CONNECTION,
        Origin::Server,
        codec.clone(),
        |ctx, wait: WaitPeerConnection| {
            Box::pin(async move {
                ctx.emit(ClientEvent::WaitPeer(wait));
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::CONNECT_TO_PEER,
        Origin::Server,
        codec.clone(),
        |ctx, connect: ConnectToPeer| {
            Box::pin(async move {
                ctx.emit(ClientEvent::ConnectToPeer(connect));
                Ok(())
            })
        },
    );

    registry.register_typed(
        id::CONNECT_TO_SERVICE,
        Origin::Server,
        codec,
        |ctx, connect: ConnectToService| {
            Box::pin(async move {
                ctx.emit(ClientEvent::ConnectToService(connect));
                Ok(())
            })
        },
    );

    registry
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use parley_protocol::{
        JsonCodec, Message, ProtocolError, RoomSnapshot, User,
    };

    use super::*;

    /// Records enqueued voice frames.
    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl VoiceSink for Arc<RecordingSink> {
        fn enqueue(&self, room: &str, from: &str, data: Vec<u8>) {
            self.frames
                .lock()
                .unwrap()
                .push((room.to_string(), from.to_string(), data));
        }
    }

    struct Harness {
        ctx: Arc<ClientCtx>,
        registry: CommandRegistry<ClientCtx>,
        events: mpsc::UnboundedReceiver<ClientEvent>,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingSink::default());
        Harness {
            ctx: Arc::new(ClientCtx {
                cache: Mutex::new(ClientCache::new()),
                voice: Box::new(Arc::clone(&sink)),
                events: events_tx,
                outbound: outbound_tx,
            }),
            registry: server_registry(JsonCodec),
            events,
            outbound,
            sink,
        }
    }

    fn encode<T: serde::Serialize>(
        id: parley_protocol::CommandId,
        payload: &T,
    ) -> Vec<u8> {
        frame::encode(id, &JsonCodec.encode(payload).unwrap())
    }

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

    #[tokio::test]
    async fn test_ping_answers_with_pong_frame() {
        let mut h = harness();
        let ping = frame::encode(id::PING, &[]);

        h.registry
            .dispatch(Arc::clone(&h.ctx), Origin::Server, &ping)
            .await
            .unwrap();

        let pong = h.outbound.try_recv().expect("pong should be queued");
        let (pong_id, content) = frame::decode(&pong).unwrap();
        assert_eq!(pong_id, id::PONG);
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_room_opened_caches_snapshot_and_emits_event() {
        let mut h = harness();
        let bytes = encode(
            id::ROOM_OPENED,
            &RoomOpened {
                room: snapshot("ops"),
            },
        );

        h.registry
            .dispatch(Arc::clone(&h.ctx), Origin::Server, &bytes)
            .await
            .unwrap();

        assert!(h.ctx.cache.lock().await.room("ops").is_some());
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ClientEvent::RoomOpened(name) if name == "ops"
        ));
    }

    #[tokio::test]
    async fn test_out_room_message_updates_cache_before_event() {
        let mut h = harness();
        h.ctx.cache.lock().await.apply_snapshot(snapshot("ops"));

        let bytes = encode(
            id::OUT_ROOM_MESSAGE,
            &OutRoomMessage {
                room: "ops".into(),
                message: Message {
                    id: 1,
                    owner: "alice".into(),
                    text: "hello".into(),
                    timestamp: 9,
                },
            },
        );
        h.registry
            .dispatch(Arc::clone(&h.ctx), Origin::Server, &bytes)
            .await
            .unwrap();

        // The event listener can read the message from the cache.
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ClientEvent::RoomMessage { room, from }
                if room == "ops" && from == "alice"
        ));
        let cache = h.ctx.cache.lock().await;
        assert_eq!(cache.room("ops").unwrap().messages[0].text, "hello");
    }

    #[tokio::test]
    async fn test_play_voice_reaches_the_sink_not_the_events() {
        let mut h = harness();
        let bytes = encode(
            id::PLAY_VOICE,
            &PlayVoiceOut {
                room: "talk".into(),
                from: "bob".into(),
                data: vec![1, 2, 3],
            },
        );

        h.registry
            .dispatch(Arc::clone(&h.ctx), Origin::Server, &bytes)
            .await
            .unwrap();

        let frames = h.sink.frames.lock().unwrap();
        assert_eq!(
            frames.as_slice(),
            [("talk".to_string(), "bob".to_string(), vec![1, 2, 3])]
        );
        drop(frames);
        assert!(h.events.try_recv().is_err(), "voice bypasses the events");
    }

    #[tokio::test]
    async fn test_peer_origin_notification_rejected() {
        let h = harness();
        let bytes = encode(
            id::ROOM_CLOSED,
            &RoomClosed { room: "ops".into() },
        );

        let result = h
            .registry
            .dispatch(Arc::clone(&h.ctx), Origin::Peer, &bytes)
            .await;

        assert!(matches!(
            result,
            Err(ProtocolError::IllegalInvoker { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_registration_clears_cached_nick() {
        let mut h = harness();
        h.ctx.cache.lock().await.set_nick("alice");

        let bytes = encode(
            id::REGISTER_RESPONSE,
            &RegisterResponse {
                registered: false,
                reason: Some(parley_protocol::code::NICK_TAKEN),
            },
        );
        h.registry
            .dispatch(Arc::clone(&h.ctx), Origin::Server, &bytes)
            .await
            .unwrap();

        assert!(h.ctx.cache.lock().await.nick().is_none());
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ClientEvent::Registered {
                registered: false,
                reason: Some(_)
            }
        ));
    }
}
