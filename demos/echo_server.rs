//! Echo server demo.
//!
//! Echoes every binary message back to its sender. A text message of the
//! form `mn:<name>` tags the session; `broadcast:<text>` sends `<text>` to
//! every session tagged with the sender's name.
//!
//! Usage:
//!
//! ```sh
//! cargo run --example echo_server -- [--debug] [--port 9001]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::info;
use tracing_subscriber::EnvFilter;
use wshub::{Bytes, EventHandler, Message, Server, ServerConfig, Session};

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(9001);

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

/// Echo handler with simple group broadcast.
struct Echo {
    server: tokio::sync::OnceCell<Server>,
}

#[async_trait::async_trait]
impl EventHandler for Echo {
    async fn react(&self, message: Message) {
        let Some(session) = message.session() else {
            return;
        };

        let text = std::str::from_utf8(message.payload()).unwrap_or_default();

        if let Some(name) = text.strip_prefix("mn:") {
            session.set_mn(name);
            info!(conn_id = %session.id(), mn = name, "Session tagged");
            return;
        }

        if let Some(body) = text.strip_prefix("broadcast:") {
            if let Some(server) = self.server.get() {
                broadcast(&server.get_sessions_by_mn(&session.mn()), body).await;
            }
            return;
        }

        let _ = session.send(message.payload().clone()).await;
    }
}

async fn broadcast(targets: &[Session], body: &str) {
    let payload = Bytes::copy_from_slice(body.as_bytes());
    for target in targets {
        if let Err(e) = target.send(payload.clone()).await {
            info!(conn_id = %target.id(), error = %e, "Broadcast skipped");
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug { "wshub=debug" } else { "wshub=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> wshub::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let handler = std::sync::Arc::new(Echo {
        server: tokio::sync::OnceCell::new(),
    });

    let server = Server::builder()
        .shared_handler(handler.clone())
        .config(ServerConfig::default())
        .build()?;
    let _ = handler.server.set(server.clone());

    let addr = server
        .listen(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), args.port))
        .await?;
    println!("Listening on ws://{addr}");
    println!("Press Ctrl+C to exit...");

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}
