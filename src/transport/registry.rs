//! Live session registry.
//!
//! Maps [`ConnId`] to [`Session`] for every session between start and stop.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Registry                  │
//! │  ┌─────────────────────────────────┐    │
//! │  │ ConnId a1f… → Session (mn "A")  │    │
//! │  │ ConnId 07c… → Session (mn "B")  │    │
//! │  │ ConnId e9d… → Session (mn "A")  │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Lookup by logical name is a linear scan over the map. There is no
//! secondary index; names change under the session's own lock and session
//! counts per process are modest.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ConnId;

use super::Session;

// ============================================================================
// Registry
// ============================================================================

/// Concurrent-safe set of live sessions keyed by [`ConnId`].
///
/// Every query returns a snapshot; later inserts and removals do not affect
/// a collection already returned.
///
/// Only a [`Server`](crate::Server) creates and fills a registry; reach it
/// through [`Server::registry`](crate::Server::registry).
///
/// ```compile_fail
/// let registry = wshub::Registry::new();
/// ```
#[derive(Debug)]
pub struct Registry {
    sessions: RwLock<FxHashMap<ConnId, Session>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            sessions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Inserts a session.
    pub(crate) fn add(&self, session: Session) {
        let id = session.id();
        self.sessions.write().insert(id, session);
        trace!(conn_id = %id, "Session registered");
    }

    /// Removes a session. Removing an absent ID is a no-op.
    pub(crate) fn remove(&self, id: &ConnId) -> Option<Session> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            trace!(conn_id = %id, "Session deregistered");
        }
        removed
    }

    /// Returns the session with `id`, if registered.
    #[must_use]
    pub fn get(&self, id: &ConnId) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Returns every registered session, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// Returns the sessions whose logical name is exactly `mn`.
    #[must_use]
    pub fn by_mn(&self, mn: &str) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .filter(|session| session.has_mn(mn))
            .cloned()
            .collect()
    }

    /// Returns the number of registered sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
