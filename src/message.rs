//! Application message.
//!
//! A [`Message`] pairs a payload with the session it arrived on. Inbound
//! messages always carry their session; messages built with
//! [`Message::new`] for sending do not need one.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;

use crate::transport::Session;

// ============================================================================
// Message
// ============================================================================

/// An immutable payload with an optional back-reference to its session.
#[derive(Debug, Clone)]
pub struct Message {
    /// Originating session (inbound only).
    session: Option<Session>,
    /// Message body.
    payload: Bytes,
}

impl Message {
    /// Creates an outbound message with no session attached.
    #[inline]
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            session: None,
            payload: payload.into(),
        }
    }

    /// Creates an inbound message read from `session`.
    #[inline]
    pub(crate) fn inbound(payload: Bytes, session: Session) -> Self {
        Self {
            session: Some(session),
            payload,
        }
    }

    /// Returns the session this message arrived on.
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the message, returning the payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
