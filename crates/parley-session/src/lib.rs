//! Connection and session tracking for Parley.
//!
//! This crate handles the lifecycle of client connections:
//!
//! 1. **Attachment** — a freshly accepted connection gets a registry entry
//!    under its temporary `conn-<n>` identity
//! 2. **Promotion** — successful registration binds a nick to the
//!    connection ([`SessionRegistry::promote`])
//! 3. **Liveness** — periodic pings with a bounded pong window; silent
//!    connections are culled like graceful unregisters
//!
//! # How it fits in the stack
//!
//! ```text
//! Command handlers (above)  ← resolve nicks to connections for delivery
//!     ↕
//! Session layer (this crate)  ← maps connection ids ↔ nicks, owns senders
//!     ↕
//! Transport layer (below)  ← provides ConnectionId and the byte pipes
//! ```

mod error;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{OutboundSender, Session, SessionConfig};
