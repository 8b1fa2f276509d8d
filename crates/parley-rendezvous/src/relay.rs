//! The relay service: the fallback data path when a direct peer
//! connection fails.
//!
//! Protocol: a client connects over TCP and writes its 32-byte ASCII
//! token, nothing else. The first channel to present a token is parked;
//! when a second channel presents the same token, the two are spliced and
//! bytes flow both ways until either side closes. A parked channel that
//! no partner claims within the park timeout is dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::RendezvousError;

/// Length of the connect token on the wire, in bytes.
pub const TOKEN_LEN: usize = 32;

/// Configuration for the relay service.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long a parked channel waits for its partner before being
    /// dropped, in seconds.
    pub park_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            park_timeout_secs: 30,
        }
    }
}

/// Server-hosted relay matching channel pairs by token.
pub struct RelayService {
    listener: TcpListener,
    parked: Arc<Mutex<HashMap<String, TcpStream>>>,
    config: RelayConfig,
}

impl RelayService {
    /// Binds the relay listener.
    pub async fn bind(
        addr: SocketAddr,
        config: RelayConfig,
    ) -> Result<Self, RendezvousError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "relay service listening");
        Ok(Self {
            listener,
            parked: Arc::new(Mutex::new(HashMap::new())),
            config,
        })
    }

    /// The bound address. Useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, RendezvousError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until the process exits. Each accepted
    /// channel is handled on its own task; a bad channel never takes the
    /// loop down.
    pub async fn run(self) {
        let park_timeout = Duration::from_secs(self.config.park_timeout_secs);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(%error, "relay accept failed");
                    continue;
                }
            };
            tracing::debug!(%peer, "relay channel accepted");
            let parked = Arc::clone(&self.parked);
            tokio::spawn(async move {
                if let Err(error) =
                    handle_channel(stream, parked, park_timeout).await
                {
                    tracing::debug!(%peer, %error, "relay channel dropped");
                }
            });
        }
    }
}

/// Reads the token, then either parks this channel or splices it with
/// the partner already parked under the same token.
async fn handle_channel(
    mut stream: TcpStream,
    parked: Arc<Mutex<HashMap<String, TcpStream>>>,
    park_timeout: Duration,
) -> Result<(), RendezvousError> {
    let mut buf = [0u8; TOKEN_LEN];
    stream.read_exact(&mut buf).await?;
    let token = String::from_utf8_lossy(&buf).into_owned();

    let partner = parked.lock().await.remove(&token);
    match partner {
        Some(mut first) => {
            tracing::debug!("relay pair matched, splicing");
            let outcome =
                tokio::io::copy_bidirectional(&mut first, &mut stream).await;
            match outcome {
                Ok((a_to_b, b_to_a)) => {
                    tracing::debug!(a_to_b, b_to_a, "relay pair finished");
                }
                Err(error) => {
                    tracing::debug!(%error, "relay pair aborted");
                }
            }
        }
        None => {
            parked.lock().await.insert(token.clone(), stream);
            // Drop the channel if nobody claims it in time. The partner
            // path races this sweep through the same lock, so a claimed
            // channel is never dropped here.
            tokio::spawn(async move {
                tokio::time::sleep(park_timeout).await;
                if parked.lock().await.remove(&token).is_some() {
                    tracing::debug!("parked relay channel timed out");
                }
            });
        }
    }
    Ok(())
}
