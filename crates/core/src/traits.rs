//! Collaborator contracts consumed by the client layer
//!
//! The byte-level protocol codec, authentication handshake, and network
//! transport live below this layer. They are modeled by [`Session`]: one
//! physical connection that accepts one in-flight command at a time and
//! produces exactly one outcome per command. Production transports implement
//! these traits; the testkit supplies in-memory implementations.

use crate::error::Result;
use crate::value::QueryResult;
use std::future::Future;
use std::pin::Pin;

/// Boxed future type used by the session traits.
///
/// Trait objects need a concrete future type; boxing keeps the traits
/// object-safe so the pool can hold `Box<dyn Session>`.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One physical connection to the database.
///
/// Contract assumed by the client layer:
/// - `send` produces exactly one outcome (result or error) per call; no
///   outcome is ever delivered for a command that was not sent.
/// - The transport beneath the session never reorders sends.
/// - At most one `send` is in flight at a time; the caller (the session
///   worker) only issues the next command after the previous outcome has
///   been fully delivered.
pub trait Session: Send + 'static {
    /// Send one command and asynchronously produce its single outcome.
    fn send(&mut self, command: &str) -> SessionFuture<'_, Result<QueryResult>>;

    /// Release the physical connection. Idempotent.
    fn close(&mut self) -> SessionFuture<'_, ()>;
}

/// Creates physical sessions for the pool.
///
/// Creation failures are surfaced as an error to the acquire request that
/// triggered them; they are never fatal to the pool.
pub trait SessionFactory: Send + Sync + 'static {
    /// Open a new physical session.
    fn create(&self) -> SessionFuture<'_, Result<Box<dyn Session>>>;
}
