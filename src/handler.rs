//! Inbound message callback.
//!
//! The inbound pump calls [`EventHandler::react`] once per non-empty
//! message, each call on its own task. Calls for one session may overlap and
//! may finish out of arrival order. Handlers that need ordering must
//! serialize internally.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use async_trait::async_trait;

use crate::message::Message;

// ============================================================================
// EventHandler
// ============================================================================

/// Application callback for inbound messages.
///
/// # Example
///
/// ```
/// use wshub::{EventHandler, Message};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl EventHandler for Echo {
///     async fn react(&self, message: Message) {
///         if let Some(session) = message.session() {
///             let _ = session.send(message.payload().clone()).await;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one inbound message.
    async fn react(&self, message: Message);
}

// ============================================================================
// Closure Adapter
// ============================================================================

/// Wraps an async closure as an [`EventHandler`].
///
/// ```
/// let handler = wshub::handler_fn(|message: wshub::Message| async move {
///     println!("{} bytes", message.len());
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFn(f)
}

/// [`EventHandler`] backed by a closure. Built with [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn react(&self, message: Message) {
        (self.0)(message).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
