//! WebSocket transport layer.
//!
//! This module owns every socket: the handshake, the per-session pumps and
//! the registry of live sessions.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!   client ──────►│ Server::serve ── upgrade ── Session::new │
//!                 │                                 │        │
//!                 │           Registry ◄── add ─────┤        │
//!                 │                                 ▼        │
//!                 │        ┌──── inbound pump ──► EventHandler
//!   socket ◄─────►│ Session│                                 │
//!                 │        └──── outbound pump ◄── send()    │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Live session map |
//! | `server` | Handshake, accept loop, lookup |
//! | `session` | Session handle and pumps |

// ============================================================================
// Submodules
// ============================================================================

/// Live session map.
pub mod registry;

/// WebSocket server and builder.
pub mod server;

/// Session handle and pumps.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::Registry;
pub use server::{Server, ServerBuilder};
pub use session::Session;

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::config::ServerConfig;
    use crate::handler::EventHandler;
    use crate::message::Message;

    use super::{Registry, Session};

    /// Handler that records every payload it sees.
    #[derive(Clone, Default)]
    pub(crate) struct CountingHandler {
        seen: Arc<Mutex<Vec<Bytes>>>,
    }

    impl CountingHandler {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn count(&self) -> usize {
            self.seen.lock().len()
        }

        pub(crate) fn payloads(&self) -> Vec<Bytes> {
            self.seen.lock().clone()
        }

        pub(crate) async fn wait_for(&self, n: usize, limit: Duration) {
            let deadline = Instant::now() + limit;
            while self.count() < n {
                assert!(Instant::now() < deadline, "expected {n} messages, saw {}", self.count());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn react(&self, message: Message) {
            self.seen.lock().push(message.into_payload());
        }
    }

    /// Starts a registered session over an in-memory pipe.
    pub(crate) async fn duplex_session(
        registry: &Arc<Registry>,
        handler: impl EventHandler,
        config: &ServerConfig,
    ) -> (Session, WebSocketStream<DuplexStream>) {
        duplex_session_with_buffer(registry, handler, config, 64 * 1024).await
    }

    /// Like [`duplex_session`] with an explicit pipe buffer size.
    pub(crate) async fn duplex_session_with_buffer(
        registry: &Arc<Registry>,
        handler: impl EventHandler,
        config: &ServerConfig,
        buffer: usize,
    ) -> (Session, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = duplex(buffer);
        let session = raw_session(registry, server_io, handler, config).await;
        let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        (session, client_ws)
    }

    /// Starts a registered session directly on `io`, skipping the handshake.
    pub(crate) async fn raw_session<S>(
        registry: &Arc<Registry>,
        io: S,
        handler: impl EventHandler,
        config: &ServerConfig,
    ) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server_ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        let (session, pumps) = Session::new(server_ws, addr, Arc::downgrade(registry), config);
        registry.add(session.clone());
        session.start(pumps, Arc::new(handler), config.max_in_flight_handlers);

        session
    }

    /// Socket whose reads never complete and whose writes always fail.
    pub(crate) struct BrokenWriter;

    impl AsyncRead for BrokenWriter {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
