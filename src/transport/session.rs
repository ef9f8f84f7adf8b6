//! WebSocket session and its pumps.
//!
//! A [`Session`] owns one upgraded socket. [`Session::start`] splits it and
//! spawns two tasks:
//!
//! - **Inbound pump**: reads frames and hands each non-empty payload to the
//!   [`EventHandler`] on a fresh task, so slow handlers never stall reads.
//! - **Outbound pump**: drains the send queue and writes each payload as one
//!   binary frame.
//!
//! # Teardown
//!
//! Every path out of a session goes through [`Session::stop`]: a read error,
//! a peer Close, a write error, or an explicit call. `stop` flips the closed
//! flag once, fires the cancellation token and removes the session from its
//! registry. The outbound pump then sends a Close frame and drops the
//! socket.
//!
//! ```text
//!   read error ─┐
//!   peer close ─┼──► stop() ──► closed = true ──► cancel ──► registry.remove
//!   write error ┤                                   │
//!   caller ─────┘                     both pumps exit ◄┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::result::Result as StdResult;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::{SendMode, ServerConfig};
use crate::error::{Error, Result};
use crate::handler::EventHandler;
use crate::identifiers::ConnId;
use crate::message::Message;

use super::registry::Registry;

// ============================================================================
// Types
// ============================================================================

/// Write half of a split socket, erased over the stream type.
type FrameSink = Pin<Box<dyn Sink<WsMessage, Error = WsError> + Send>>;

/// Read half of a split socket, erased over the stream type.
type FrameStream = Pin<Box<dyn Stream<Item = StdResult<WsMessage, WsError>> + Send>>;

/// Item on the outbound queue.
struct Outbound {
    payload: Bytes,
    /// Fired when the pump takes the item (rendezvous mode only).
    handoff: Option<oneshot::Sender<()>>,
}

/// Mutable state guarded by the session lock.
#[derive(Debug, Default)]
struct SessionState {
    mn: String,
    closed: bool,
}

/// Socket halves and queue receiver, held until [`Session::start`].
pub(crate) struct SessionIo {
    sink: FrameSink,
    stream: FrameStream,
    outbound_rx: mpsc::Receiver<Outbound>,
}

// ============================================================================
// Session
// ============================================================================

/// One live full-duplex connection.
///
/// `Session` is a cheap handle; clones refer to the same connection.
///
/// # Thread Safety
///
/// All accessors take the session's own lock and are safe to call from any
/// task. The lock is never held across an `.await`.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    /// Immutable identity.
    id: ConnId,
    /// Peer address captured at accept time.
    remote_addr: SocketAddr,
    /// Closed flag and logical name.
    state: RwLock<SessionState>,
    /// Producer side of the outbound queue.
    outbound_tx: mpsc::Sender<Outbound>,
    /// Whether `send` waits for the pump to take the item.
    send_mode: SendMode,
    /// Fired exactly once by `stop`.
    cancel: CancellationToken,
    /// Deregistration target.
    registry: Weak<Registry>,
    /// Bound on the Close frame write.
    close_timeout: Duration,
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Wraps an upgraded socket. Pumps are not running until [`Session::start`].
    pub(crate) fn new<S>(
        ws_stream: WebSocketStream<S>,
        remote_addr: SocketAddr,
        registry: Weak<Registry>,
        config: &ServerConfig,
    ) -> (Self, SessionIo)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_mode.channel_capacity());

        let session = Self {
            inner: Arc::new(SessionInner {
                id: ConnId::generate(),
                remote_addr,
                state: RwLock::new(SessionState::default()),
                outbound_tx,
                send_mode: config.send_mode,
                cancel: CancellationToken::new(),
                registry,
                close_timeout: config.close_timeout(),
            }),
        };

        let io = SessionIo {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
            outbound_rx,
        };

        (session, io)
    }

    /// Spawns the inbound and outbound pumps.
    pub(crate) fn start(
        &self,
        io: SessionIo,
        handler: Arc<dyn EventHandler>,
        max_in_flight_handlers: Option<usize>,
    ) {
        let limiter = max_in_flight_handlers.map(|n| Arc::new(Semaphore::new(n)));

        tokio::spawn(self.clone().run_inbound(io.stream, handler, limiter));
        tokio::spawn(self.clone().run_outbound(io.sink, io.outbound_rx));

        debug!(conn_id = %self.inner.id, "Session pumps started");
    }
}

// ============================================================================
// Session - Public API
// ============================================================================

impl Session {
    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.inner.id
    }

    /// Returns the logical name (empty until set).
    #[must_use]
    pub fn mn(&self) -> String {
        self.inner.state.read().mn.clone()
    }

    /// Sets the logical name used by
    /// [`Server::get_sessions_by_mn`](crate::Server::get_sessions_by_mn).
    pub fn set_mn(&self, mn: impl Into<String>) {
        self.inner.state.write().mn = mn.into();
    }

    /// Returns `true` if the logical name equals `mn`.
    #[must_use]
    pub fn has_mn(&self, mn: &str) -> bool {
        self.inner.state.read().mn == mn
    }

    /// Returns the peer address.
    #[inline]
    #[must_use]
    pub fn remote_address(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Returns `true` once [`stop`](Self::stop) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.read().closed
    }

    /// Resolves when the session has stopped.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Queues `payload` for delivery as one binary frame.
    ///
    /// In [`SendMode::Rendezvous`] this returns once the outbound pump has
    /// taken the payload; in [`SendMode::Buffered`] once it is queued.
    /// Payloads that return `Ok` reach the socket in call order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session was already stopped,
    /// or stops while this call is waiting.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        let conn_id = self.inner.id;
        if self.is_closed() {
            return Err(Error::session_closed(conn_id));
        }

        let (handoff, accepted) = match self.inner.send_mode {
            SendMode::Rendezvous => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
            SendMode::Buffered { .. } => (None, None),
        };

        let item = Outbound {
            payload: payload.into(),
            handoff,
        };

        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => {
                return Err(Error::session_closed(conn_id));
            }
            queued = self.inner.outbound_tx.send(item) => {
                queued.map_err(|_| Error::session_closed(conn_id))?;
            }
        }

        if let Some(accepted) = accepted {
            tokio::select! {
                biased;
                taken = accepted => {
                    taken.map_err(|_| Error::session_closed(conn_id))?;
                }
                _ = self.inner.cancel.cancelled() => {
                    return Err(Error::session_closed(conn_id));
                }
            }
        }

        Ok(())
    }

    /// Sends the payload of `message`.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_message(&self, message: Message) -> Result<()> {
        self.send(message.into_payload()).await
    }

    /// Stops the session.
    ///
    /// The first call flips the closed flag, cancels both pumps and removes
    /// the session from its registry; it returns `true`. Every later or
    /// concurrent call returns `false` without side effects.
    pub fn stop(&self) -> bool {
        {
            let mut state = self.inner.state.write();
            if state.closed {
                return false;
            }
            state.closed = true;
        }

        self.inner.cancel.cancel();

        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove(&self.inner.id);
        }

        info!(conn_id = %self.inner.id, addr = %self.inner.remote_addr, "Session stopped");
        true
    }
}

// ============================================================================
// Session - Pumps
// ============================================================================

impl Session {
    /// Reads frames until cancellation or a transport fault.
    async fn run_inbound(
        self,
        mut stream: FrameStream,
        handler: Arc<dyn EventHandler>,
        limiter: Option<Arc<Semaphore>>,
    ) {
        let conn_id = self.inner.id;

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => break,
                frame = stream.next() => frame,
            };

            let payload = match frame {
                Some(Ok(message @ (WsMessage::Binary(_) | WsMessage::Text(_)))) => {
                    message.into_data()
                }

                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(%conn_id, ?frame, "WebSocket closed by remote");
                    break;
                }

                Some(Err(e)) => {
                    debug!(%conn_id, error = %e, "WebSocket read failed");
                    break;
                }

                None => {
                    debug!(%conn_id, "WebSocket stream ended");
                    break;
                }

                // Ignore Ping, Pong, raw frames
                Some(Ok(_)) => continue,
            };

            if payload.is_empty() {
                trace!(%conn_id, "Skipping empty frame");
                continue;
            }

            let permit = match Self::acquire_handler_slot(&self.inner.cancel, limiter.as_ref()).await
            {
                Ok(permit) => permit,
                Err(()) => break,
            };

            trace!(%conn_id, len = payload.len(), "Dispatching message");

            let message = Message::inbound(payload, self.clone());
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.react(message).await;
                drop(permit);
            });
        }

        self.stop();
        debug!(%conn_id, "Inbound pump terminated");
    }

    /// Waits for a handler slot. `Err` means the session was cancelled.
    async fn acquire_handler_slot(
        cancel: &CancellationToken,
        limiter: Option<&Arc<Semaphore>>,
    ) -> StdResult<Option<OwnedSemaphorePermit>, ()> {
        let Some(limiter) = limiter else {
            return Ok(None);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(()),
            permit = Arc::clone(limiter).acquire_owned() => permit.map(Some).map_err(|_| ()),
        }
    }

    /// Writes queued payloads until cancellation or a write fault.
    async fn run_outbound(self, mut sink: FrameSink, mut outbound_rx: mpsc::Receiver<Outbound>) {
        let conn_id = self.inner.id;

        loop {
            let item = tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => break,
                item = outbound_rx.recv() => item,
            };

            let Some(Outbound { payload, handoff }) = item else {
                break;
            };

            if let Some(handoff) = handoff {
                let _ = handoff.send(());
            }

            let len = payload.len();
            let written = tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => break,
                written = sink.send(WsMessage::Binary(payload)) => written,
            };

            if let Err(e) = written {
                debug!(%conn_id, error = %e, "WebSocket write failed");
                self.stop();
                break;
            }

            trace!(%conn_id, len, "Message sent");
        }

        // Release anyone still parked on the queue
        outbound_rx.close();
        drop(outbound_rx);

        if timeout(self.inner.close_timeout, sink.close()).await.is_err() {
            debug!(%conn_id, "Close frame timed out");
        }

        debug!(%conn_id, "Outbound pump terminated");
    }
}

// ============================================================================
// Trait Impls
// ============================================================================

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("mn", &state.mn)
            .field("closed", &state.closed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
