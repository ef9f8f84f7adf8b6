//! Error types for wshub.
//!
//! Only a small set of failures ever reaches application code. Transport
//! read and write faults are handled inside the session pumps (they tear the
//! session down) and are logged, not returned.
//!
//! # Usage
//!
//! ```ignore
//! use wshub::{Error, Result};
//!
//! async fn greet(session: &wshub::Session) -> Result<()> {
//!     match session.send("hello").await {
//!         Err(Error::SessionClosed { .. }) => Ok(()),
//!         other => other,
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::Upgrade`], [`Error::OriginRejected`] |
//! | Session | [`Error::SessionClosed`] |
//! | External | [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ConnId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`ServerConfig`](crate::ServerConfig) fails validation
    /// or the server builder is missing a required part.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// WebSocket handshake could not be completed.
    ///
    /// Fatal for that request; no session is created.
    #[error("WebSocket upgrade failed for {addr}: {source}")]
    Upgrade {
        /// Peer that attempted the upgrade.
        addr: SocketAddr,
        /// Underlying handshake error.
        #[source]
        source: WsError,
    },

    /// Handshake refused because the `Origin` header is not allowed.
    #[error("Origin rejected: {origin:?}")]
    OriginRejected {
        /// Origin presented by the client (empty when the header was absent).
        origin: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Session already closed when a send was attempted.
    ///
    /// Terminal for that session. Retrying will not succeed.
    #[error("Session {conn_id} closed")]
    SessionClosed {
        /// The closed session's ID.
        conn_id: ConnId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an upgrade error.
    #[inline]
    pub fn upgrade(addr: SocketAddr, source: WsError) -> Self {
        Self::Upgrade { addr, source }
    }

    /// Creates an origin rejected error.
    #[inline]
    pub fn origin_rejected(origin: impl Into<String>) -> Self {
        Self::OriginRejected {
            origin: origin.into(),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(conn_id: ConnId) -> Self {
        Self::SessionClosed { conn_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a session closed error.
    #[inline]
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed { .. })
    }

    /// Returns `true` if the handshake failed.
    #[inline]
    #[must_use]
    pub fn is_upgrade_error(&self) -> bool {
        matches!(self, Self::Upgrade { .. } | Self::OriginRejected { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_session_closed_display() {
        let id = ConnId::generate();
        let err = Error::session_closed(id);
        assert_eq!(err.to_string(), format!("Session {id} closed"));
        assert!(err.is_session_closed());
        assert!(!err.is_upgrade_error());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("capacity must be > 0");
        assert_eq!(err.to_string(), "Configuration error: capacity must be > 0");
    }

    #[test]
    fn test_is_upgrade_error() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        let upgrade = Error::upgrade(addr, WsError::ConnectionClosed);
        let origin = Error::origin_rejected("https://evil.example");

        assert!(upgrade.is_upgrade_error());
        assert!(origin.is_upgrade_error());
        assert!(!Error::config("x").is_upgrade_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::AddrInUse, "port taken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
