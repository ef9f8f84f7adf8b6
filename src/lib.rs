//! wshub - Full-duplex WebSocket session manager.
//!
//! This library accepts WebSocket clients, wraps each one in a [`Session`]
//! with independent read and write tasks, and keeps a registry of live
//! sessions addressable by ID and by an application-assigned logical name.
//!
//! # Architecture
//!
//! - Each [`Session`] owns one socket, an inbound pump and an outbound pump
//! - Inbound messages go to an [`EventHandler`], one task per message
//! - [`Session::send`] hands payloads to the outbound pump (FIFO per session)
//! - Any transport fault or explicit [`Session::stop`] tears down both pumps
//!   and removes the session from the registry
//!
//! # Quick Start
//!
//! ```no_run
//! use wshub::{Message, Result, Server, handler_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder()
//!         .handler(handler_fn(|message: Message| async move {
//!             if let Some(session) = message.session() {
//!                 session.set_mn("echo");
//!                 let _ = session.send(message.payload().clone()).await;
//!             }
//!         }))
//!         .build()?;
//!
//!     server.listen("127.0.0.1:9001".parse().unwrap()).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`ServerConfig`] and [`SendMode`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handler`] | [`EventHandler`] callback |
//! | [`identifiers`] | [`ConnId`] |
//! | [`message`] | [`Message`] |
//! | [`transport`] | Server, registry and session pumps |

// ============================================================================
// Modules
// ============================================================================

/// Server and session configuration.
pub mod config;

/// Error types and result aliases.
pub mod error;

/// Inbound message callback.
pub mod handler;

/// Type-safe identifiers.
pub mod identifiers;

/// Application message type.
pub mod message;

/// WebSocket transport layer.
///
/// Handshake, session pumps and the live session registry.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{SendMode, ServerConfig};
pub use error::{Error, Result};
pub use handler::{EventHandler, HandlerFn, handler_fn};
pub use identifiers::ConnId;
pub use message::Message;
pub use transport::{Registry, Server, ServerBuilder, Session};

pub use bytes::Bytes;
