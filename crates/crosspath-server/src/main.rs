//! crosspath-server: WebSocket ingress for the rendezvous engine.
//!
//! Accepts connections, assigns each a session handle, and feeds inbound
//! events to the orchestrator — one task per event. Presence and pairing
//! state live in the in-memory store; staleness is evaluated on the read
//! path, so there is no background expiry to schedule.

mod connection;
mod protocol;

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crosspath_core::{
    MatchConfig, MemoryProfiles, MemoryStore, RendezvousConfig, RendezvousManager, ReunionPolicy,
    SessionRegistry,
};

use crate::connection::handle_connection;

#[derive(Parser)]
#[command(name = "crosspath-server", about = "co-presence rendezvous server")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Recency window for co-presence, in milliseconds.
    #[arg(long, default_value_t = 3_600_000)]
    max_age_ms: u64,

    /// Complete reunions without comparing answers.
    #[arg(long)]
    open_reunion: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosspath_server=info,crosspath_core=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = RendezvousConfig {
        matching: MatchConfig {
            max_age_ms: args.max_age_ms,
        },
        reunion: if args.open_reunion {
            ReunionPolicy::Unconditional
        } else {
            ReunionPolicy::SharedSecret
        },
    };
    let manager = Arc::new(RendezvousManager::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryProfiles::new()),
        SessionRegistry::new(),
    ));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("crosspath-server listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, manager).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
