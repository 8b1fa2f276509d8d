//! Command registry and dispatcher.
//!
//! The registry is an explicit object constructed at startup and owned by
//! whoever runs a read loop — there is no ambient global command table.
//! Each registration pairs a command id with a declared origin and a
//! boxed async handler; the dispatcher checks origin once, generically,
//! before any handler body runs.
//!
//! Handlers come in two shapes crossed with two origins:
//! [`register_empty`](CommandRegistry::register_empty) for content-less
//! commands (the content bytes are never touched) and
//! [`register_typed`](CommandRegistry::register_typed) for commands whose
//! content decodes into a serde type. Externally supplied registrations
//! (e.g. from plugins) are folded in with
//! [`merge`](CommandRegistry::merge).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::types::CommandId;
use crate::{Codec, ProtocolError, frame};

/// Where a command is allowed to arrive from.
///
/// A client's connection to the chat server carries `Server`-origin
/// traffic; everything a server or peer receives from a client/peer
/// carries `Peer`-origin traffic. The same id may be registered with a
/// different origin in different registries (e.g. `PLAY_VOICE` is
/// peer-origin at the server, server-origin at the client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Server,
    Peer,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Server => write!(f, "server"),
            Origin::Peer => write!(f, "peer"),
        }
    }
}

/// The boxed future every handler returns.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<(), ProtocolError>> + Send>>;

type HandlerFn<Ctx> =
    Box<dyn Fn(Arc<Ctx>, Vec<u8>) -> HandlerFuture + Send + Sync>;

struct Registered<Ctx> {
    origin: Origin,
    run: HandlerFn<Ctx>,
}

/// Maps command ids to origin-checked handlers over a shared context.
///
/// `Ctx` is whatever the owning read loop shares with its handlers — on
/// the server a per-connection handler context, on the client the cache
/// plus connection handle. The registry itself holds no protocol state.
pub struct CommandRegistry<Ctx> {
    handlers: HashMap<CommandId, Registered<Ctx>>,
}

impl<Ctx: Send + Sync + 'static> CommandRegistry<Ctx> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a raw handler that receives the undecoded content bytes.
    ///
    /// The building block under the typed/empty helpers; also the shape
    /// external plugin registrations take.
    pub fn register_raw<F>(&mut self, id: CommandId, origin: Origin, run: F)
    where
        F: Fn(Arc<Ctx>, Vec<u8>) -> HandlerFuture + Send + Sync + 'static,
    {
        if self
            .handlers
            .insert(
                id,
                Registered {
                    origin,
                    run: Box::new(run),
                },
            )
            .is_some()
        {
            tracing::warn!(command = %id, "handler replaced");
        }
    }

    /// Registers a content-less command. The content bytes are ignored,
    /// so stray trailing bytes never fail a ping or an empty ack.
    pub fn register_empty<F, Fut>(
        &mut self,
        id: CommandId,
        origin: Origin,
        handler: F,
    ) where
        F: Fn(Arc<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProtocolError>> + Send + 'static,
    {
        self.register_raw(id, origin, move |ctx, _content| {
            Box::pin(handler(ctx))
        });
    }

    /// Registers a typed-content command. The content is decoded with
    /// `codec` inside the handler invocation, so a decode failure fails
    /// only that invocation.
    pub fn register_typed<T, C, F, Fut>(
        &mut self,
        id: CommandId,
        origin: Origin,
        codec: C,
        handler: F,
    ) where
        T: DeserializeOwned + Send + 'static,
        C: Codec + Clone,
        F: Fn(Arc<Ctx>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProtocolError>> + Send + 'static,
    {
        self.register_raw(id, origin, move |ctx, content| {
            let codec = codec.clone();
            let fut = match codec.decode::<T>(&content) {
                Ok(value) => Ok(handler(ctx, value)),
                Err(e) => Err(e),
            };
            Box::pin(async move { fut?.await })
        });
    }

    /// Folds another registry's handlers into this one. Later
    /// registrations win, matching startup order: built-ins first, then
    /// externally supplied tables.
    pub fn merge(&mut self, other: CommandRegistry<Ctx>) {
        for (id, registered) in other.handlers {
            if self.handlers.insert(id, registered).is_some() {
                tracing::warn!(command = %id, "handler replaced by merge");
            }
        }
    }

    /// Returns `true` if a handler is registered for `id`.
    pub fn contains(&self, id: CommandId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Decodes a frame and invokes the matching handler.
    ///
    /// The origin check happens before the handler body: a command
    /// registered for one origin arriving from the other fails with
    /// [`ProtocolError::IllegalInvoker`] and produces no side effect.
    pub async fn dispatch(
        &self,
        ctx: Arc<Ctx>,
        origin: Origin,
        frame_bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        let (id, content) = frame::decode(frame_bytes)?;

        let registered = self
            .handlers
            .get(&id)
            .ok_or(ProtocolError::UnknownCommand(id))?;

        if registered.origin != origin {
            return Err(ProtocolError::IllegalInvoker {
                command: id,
                origin,
            });
        }

        (registered.run)(ctx, content.to_vec()).await
    }
}

impl<Ctx: Send + Sync + 'static> Default for CommandRegistry<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::JsonCodec;
    use crate::types::id;

    /// Shared test context: counts handler invocations.
    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    impl Counter {
        fn bump(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[derive(Deserialize)]
    struct Named {
        name: String,
    }

    fn registry_with_ping() -> CommandRegistry<Counter> {
        let mut registry = CommandRegistry::new();
        registry.register_empty(id::PING, Origin::Peer, |ctx: Arc<Counter>| {
            Box::pin(async move {
                ctx.bump();
                Ok(())
            })
        });
        registry
    }

    #[tokio::test]
    async fn test_dispatch_empty_command_invokes_handler() {
        let registry = registry_with_ping();
        let ctx = Arc::new(Counter::default());

        let frame_bytes = frame::encode(id::PING, b"");
        registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await
            .expect("should dispatch");

        assert_eq!(ctx.count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_empty_command_ignores_content_bytes() {
        // A content-less command with stray bytes still dispatches.
        let registry = registry_with_ping();
        let ctx = Arc::new(Counter::default());

        let frame_bytes = frame::encode(id::PING, b"garbage");
        registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await
            .expect("should dispatch");

        assert_eq!(ctx.count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command_returns_error() {
        let registry = registry_with_ping();
        let ctx = Arc::new(Counter::default());

        let frame_bytes = frame::encode(CommandId(9999), b"");
        let result = registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await;

        assert!(matches!(
            result,
            Err(ProtocolError::UnknownCommand(CommandId(9999)))
        ));
        assert!(result.unwrap_err().is_isolated());
    }

    #[tokio::test]
    async fn test_dispatch_wrong_origin_fails_before_side_effect() {
        let registry = registry_with_ping();
        let ctx = Arc::new(Counter::default());

        // PING is registered peer-origin; deliver it as server-origin.
        let frame_bytes = frame::encode(id::PING, b"");
        let result = registry
            .dispatch(Arc::clone(&ctx), Origin::Server, &frame_bytes)
            .await;

        assert!(matches!(
            result,
            Err(ProtocolError::IllegalInvoker {
                command: id::PING,
                origin: Origin::Server,
            })
        ));
        assert_eq!(ctx.count(), 0, "handler must not have run");
    }

    #[tokio::test]
    async fn test_dispatch_typed_command_decodes_content() {
        let mut registry: CommandRegistry<Counter> = CommandRegistry::new();
        registry.register_typed(
            id::REGISTER,
            Origin::Peer,
            JsonCodec,
            |ctx: Arc<Counter>, named: Named| {
                Box::pin(async move {
                    assert_eq!(named.name, "alice");
                    ctx.bump();
                    Ok(())
                })
            },
        );
        let ctx = Arc::new(Counter::default());

        let frame_bytes =
            frame::encode(id::REGISTER, br#"{"name": "alice"}"#);
        registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await
            .expect("should dispatch");

        assert_eq!(ctx.count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_typed_decode_failure_is_isolated() {
        let mut registry: CommandRegistry<Counter> = CommandRegistry::new();
        registry.register_typed(
            id::REGISTER,
            Origin::Peer,
            JsonCodec,
            |ctx: Arc<Counter>, _named: Named| {
                Box::pin(async move {
                    ctx.bump();
                    Ok(())
                })
            },
        );
        let ctx = Arc::new(Counter::default());

        let frame_bytes = frame::encode(id::REGISTER, b"not json");
        let result = registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await;

        let err = result.expect_err("decode should fail");
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(err.is_isolated(), "decode failure must not end the loop");
        assert_eq!(ctx.count(), 0);
    }

    #[tokio::test]
    async fn test_merge_adds_and_overrides_handlers() {
        let mut registry = registry_with_ping();

        // External table: overrides PING, adds EMPTY.
        let mut plugin: CommandRegistry<Counter> = CommandRegistry::new();
        plugin.register_empty(id::PING, Origin::Peer, |ctx: Arc<Counter>| {
            Box::pin(async move {
                ctx.bump();
                ctx.bump();
                Ok(())
            })
        });
        plugin.register_empty(id::EMPTY, Origin::Peer, |_ctx| {
            Box::pin(async { Ok(()) })
        });
        registry.merge(plugin);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(id::EMPTY));

        // The merged PING handler (bumps twice) won.
        let ctx = Arc::new(Counter::default());
        let frame_bytes = frame::encode(id::PING, b"");
        registry
            .dispatch(Arc::clone(&ctx), Origin::Peer, &frame_bytes)
            .await
            .unwrap();
        assert_eq!(ctx.count(), 2);
    }
}
