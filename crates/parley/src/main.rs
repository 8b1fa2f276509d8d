//! Parley server binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley::{ParleyError, ParleyServer};

#[derive(Parser, Debug)]
#[command(name = "parley-server", about = "Peer-assisted chat server", version)]
struct Args {
    /// Port for the chat listener.
    #[arg(long)]
    port: u16,

    /// Port for the rendezvous relay.
    #[arg(long)]
    rendezvous_port: u16,

    /// Listen on all IPv6 interfaces instead of all IPv4 interfaces.
    #[arg(long)]
    ipv6: bool,

    /// Secret enabling the admin command; omitted means admin is off.
    #[arg(long)]
    admin_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ParleyError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let host = if args.ipv6 { "[::]" } else { "0.0.0.0" };

    let mut builder = ParleyServer::builder()
        .bind(&format!("{host}:{}", args.port))
        .relay_bind(&format!("{host}:{}", args.rendezvous_port));
    if let Some(secret) = &args.admin_secret {
        builder = builder.admin_secret(secret);
    }

    let server = builder.build().await?;
    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, relay = server.relay_addr(), "listening");
    }
    server.run().await
}
