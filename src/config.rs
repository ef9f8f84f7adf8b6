//! Server and session configuration.
//!
//! [`ServerConfig`] is a plain value with builder-style `with_*` methods.
//! It also deserializes from any serde format, with every field optional.
//!
//! # Example
//!
//! ```
//! use wshub::{SendMode, ServerConfig};
//!
//! let config = ServerConfig::new()
//!     .with_send_mode(SendMode::Buffered { capacity: 32 })
//!     .with_max_in_flight_handlers(Some(8))
//!     .with_allowed_origins(["https://app.example.com"]);
//!
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default cap on concurrent handler invocations per session.
pub const DEFAULT_MAX_IN_FLIGHT_HANDLERS: usize = 64;

/// Default bound on the Close frame write when a session stops.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// SendMode
// ============================================================================

/// How [`Session::send`](crate::Session::send) hands payloads to the
/// outbound pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendMode {
    /// Unbuffered handoff: `send` returns once the outbound pump has taken
    /// the payload. A stalled transport stalls callers.
    #[default]
    Rendezvous,

    /// Bounded queue: `send` returns once the payload is queued, and only
    /// waits while the queue is full.
    Buffered {
        /// Queue depth. Must be greater than zero.
        capacity: usize,
    },
}

impl SendMode {
    /// Capacity of the underlying channel.
    #[inline]
    pub(crate) const fn channel_capacity(self) -> usize {
        match self {
            Self::Rendezvous => 1,
            Self::Buffered { capacity } => capacity,
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Configuration shared by a server and every session it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Outbound queue behaviour.
    pub send_mode: SendMode,

    /// Per-session cap on concurrent handler invocations.
    ///
    /// `None` spawns one handler task per inbound message with no limit.
    pub max_in_flight_handlers: Option<usize>,

    /// Origins accepted during the handshake.
    ///
    /// `None` accepts any origin. This permissive default must be narrowed
    /// for anything exposed across a trust boundary.
    pub allowed_origins: Option<Vec<String>>,

    /// Maximum inbound message size in bytes (tungstenite default if `None`).
    pub max_message_size: Option<usize>,

    /// Milliseconds allowed for the Close frame write at stop.
    pub close_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            send_mode: SendMode::Rendezvous,
            max_in_flight_handlers: Some(DEFAULT_MAX_IN_FLIGHT_HANDLERS),
            allowed_origins: None,
            max_message_size: None,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outbound send mode.
    #[inline]
    #[must_use]
    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    /// Sets the per-session handler concurrency cap.
    #[inline]
    #[must_use]
    pub fn with_max_in_flight_handlers(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight_handlers = limit;
        self
    }

    /// Restricts the handshake to the given origins.
    #[must_use]
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = Some(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the maximum inbound message size.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = Some(bytes);
        self
    }

    /// Sets the Close frame timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ServerConfig {
    /// Returns the Close frame timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Returns the tungstenite config used for the handshake.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        let config = WebSocketConfig::default();
        match self.max_message_size {
            Some(limit) => config.max_message_size(Some(limit)),
            None => config,
        }
    }

    /// Checks the config for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero buffered capacity, a zero handler
    /// cap, or an empty origin allow-list.
    pub fn validate(&self) -> Result<()> {
        if let SendMode::Buffered { capacity: 0 } = self.send_mode {
            return Err(Error::config(
                "Buffered send mode needs a capacity > 0. Use SendMode::Rendezvous for unbuffered sends.",
            ));
        }

        if self.max_in_flight_handlers == Some(0) {
            return Err(Error::config(
                "max_in_flight_handlers must be > 0, or None for no limit",
            ));
        }

        if self
            .allowed_origins
            .as_ref()
            .is_some_and(|origins| origins.is_empty())
        {
            return Err(Error::config(
                "allowed_origins is empty and would reject every client",
            ));
        }

        Ok(())
    }

    /// Returns `true` if `origin` may complete the handshake.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        match (&self.allowed_origins, origin) {
            (None, _) => true,
            (Some(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
            (Some(_), None) => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
