//! Peer-to-peer rendezvous for Parley.
//!
//! Two peers that want a direct channel go through a server-mediated
//! handshake:
//!
//! 1. The requester asks the server for a peer by nick and parks a
//!    connection at the relay service, tagged with a one-shot token
//! 2. The target is handed the requester's externally reachable endpoint
//!    and attempts a direct connection
//! 3. If the direct attempt fails, the target dials the relay with the
//!    same token and the service splices the two parked channels,
//!    forwarding bytes both ways
//!
//! The [`PendingTable`] tracks in-flight handshakes; the [`RelayService`]
//! is the fallback data path. Every wait is bounded: pending entries and
//! parked channels both expire.

mod error;
mod pending;
mod relay;

pub use error::RendezvousError;
pub use pending::{HandshakeState, Pending, PendingTable, generate_token};
pub use relay::{RelayConfig, RelayService, TOKEN_LEN};
