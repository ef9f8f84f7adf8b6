//! WebSocket server: handshake, registration and the accept loop.
//!
//! # Connection Flow
//!
//! 1. A socket arrives (from [`Server::listen`] or handed to [`Server::serve`])
//! 2. The HTTP upgrade runs, checking `Origin` against the config
//! 3. A [`Session`] is created and inserted into the registry
//! 4. The session's inbound and outbound pumps start
//!
//! Upgrade failures end that request only. No session is created and the
//! accept loop keeps running.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::handler::EventHandler;
use crate::identifiers::ConnId;

use super::{Registry, Session};

// ============================================================================
// Server
// ============================================================================

/// Accepts WebSocket clients and tracks them as [`Session`]s.
///
/// `Server` is a cheap handle; clones share one registry.
///
/// # Example
///
/// ```no_run
/// use wshub::{Server, handler_fn, Message};
///
/// # async fn example() -> wshub::Result<()> {
/// let server = Server::builder()
///     .handler(handler_fn(|message: Message| async move {
///         if let Some(session) = message.session() {
///             let _ = session.send(message.payload().clone()).await;
///         }
///     }))
///     .build()?;
///
/// let addr = server.listen("127.0.0.1:9001".parse().unwrap()).await?;
/// println!("listening on ws://{addr}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    registry: Arc<Registry>,
    handler: Arc<dyn EventHandler>,
    config: ServerConfig,
    /// Stops the accept loop.
    shutdown: CancellationToken,
}

impl Server {
    /// Returns a builder for configuring a server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }
}

// ============================================================================
// Server - Serving
// ============================================================================

impl Server {
    /// Upgrades `stream` and starts a session on it.
    ///
    /// # Errors
    ///
    /// - [`Error::OriginRejected`] if the `Origin` header is not allowed
    /// - [`Error::Upgrade`] if the handshake fails for any other reason
    pub async fn serve<S>(&self, stream: S, remote_addr: SocketAddr) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws_stream = self.upgrade(stream, remote_addr).await?;
        Ok(self.serve_upgraded(ws_stream, remote_addr))
    }

    /// Starts a session on a socket whose handshake already completed.
    pub fn serve_upgraded<S>(&self, ws_stream: WebSocketStream<S>, remote_addr: SocketAddr) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (session, io) = Session::new(
            ws_stream,
            remote_addr,
            Arc::downgrade(&self.inner.registry),
            &self.inner.config,
        );

        self.inner.registry.add(session.clone());
        session.start(
            io,
            Arc::clone(&self.inner.handler),
            self.inner.config.max_in_flight_handlers,
        );

        // Raced with shutdown after its drain
        if self.inner.shutdown.is_cancelled() {
            debug!(conn_id = %session.id(), addr = %remote_addr, "Session arrived during shutdown");
            session.stop();
            return session;
        }

        info!(conn_id = %session.id(), addr = %remote_addr, "Session started");
        session
    }

    /// Performs the server side of the handshake.
    async fn upgrade<S>(&self, stream: S, remote_addr: SocketAddr) -> Result<WebSocketStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.inner.config;
        let mut rejected: Option<String> = None;

        let check_origin =
            |request: &Request, response: Response| -> StdResult<Response, ErrorResponse> {
                let origin = request
                    .headers()
                    .get(ORIGIN)
                    .and_then(|value| value.to_str().ok());

                if config.is_origin_allowed(origin) {
                    return Ok(response);
                }

                rejected = Some(origin.unwrap_or_default().to_string());
                let mut denied = ErrorResponse::new(Some("Origin not allowed".to_string()));
                *denied.status_mut() = StatusCode::FORBIDDEN;
                Err(denied)
            };

        let upgraded =
            accept_hdr_async_with_config(stream, check_origin, Some(config.websocket_config()))
                .await;

        match upgraded {
            Ok(ws_stream) => {
                debug!(addr = %remote_addr, "WebSocket handshake completed");
                Ok(ws_stream)
            }
            Err(e) => match rejected {
                Some(origin) => Err(Error::origin_rejected(origin)),
                None => Err(Error::upgrade(remote_addr, e)),
            },
        }
    }
}

// ============================================================================
// Server - Lookup
// ============================================================================

impl Server {
    /// Returns the live session with `id`, if any.
    #[must_use]
    pub fn get_session(&self, id: &ConnId) -> Option<Session> {
        self.inner.registry.get(id)
    }

    /// Returns a snapshot of every live session.
    #[must_use]
    pub fn get_all_sessions(&self) -> Vec<Session> {
        self.inner.registry.all()
    }

    /// Returns a snapshot of the live sessions named `mn`.
    #[must_use]
    pub fn get_sessions_by_mn(&self, mn: &str) -> Vec<Session> {
        self.inner.registry.by_mn(mn)
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }
}

// ============================================================================
// Server - Lifecycle
// ============================================================================

impl Server {
    /// Binds `addr` and accepts clients in the background.
    ///
    /// Returns the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(self.clone().accept_loop(listener));

        info!(%local_addr, "WebSocket server listening");
        Ok(local_addr)
    }

    /// Stops accepting clients and stops every live session.
    ///
    /// The registry is empty when this returns.
    pub fn shutdown(&self) {
        info!("Server shutting down");
        self.inner.shutdown.cancel();

        for session in self.inner.registry.all() {
            session.stop();
        }

        info!("Server shutdown complete");
    }

    /// Background task that accepts new connections.
    async fn accept_loop(self, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    debug!(?addr, "TCP connection accepted");
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }

        debug!("Accept loop terminated");
    }
}

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for a [`Server`].
///
/// Use [`Server::builder()`] to create one.
#[derive(Default)]
pub struct ServerBuilder {
    handler: Option<Arc<dyn EventHandler>>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Creates a builder with default config and no handler.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inbound message handler.
    #[must_use]
    pub fn handler(mut self, handler: impl EventHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets a handler that is already shared.
    #[must_use]
    pub fn shared_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the server config.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the server with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no handler was set
    /// - [`Error::Config`] if the config fails [`ServerConfig::validate`]
    pub fn build(self) -> Result<Server> {
        let handler = self.handler.ok_or_else(|| {
            Error::config(
                "An event handler is required. Use .handler() to set it.\n\
                 Example: Server::builder().handler(handler_fn(|msg| async move { .. }))",
            )
        })?;

        self.config.validate()?;

        Ok(Server {
            inner: Arc::new(ServerInner {
                registry: Arc::new(Registry::new()),
                handler,
                config: self.config,
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
