//! Connection/transaction concurrency layer
//!
//! This crate implements the client-side machinery above a database wire
//! protocol:
//! - a per-session operation queue with single-flight dispatch and
//!   exactly-once, in-order completion delivery;
//! - caller-facing [`Connection`] and [`Transaction`] handles driving the
//!   transaction status state machine;
//! - a [`Pool`] that leases sessions, applies backpressure at capacity, and
//!   never lets transactional state leak between leases.
//!
//! The wire protocol itself (framing, authentication, type codecs) is a
//! collaborator behind the `aqueduct_core::Session` trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod pool;
pub mod transaction;

mod queue;

pub use connection::Connection;
pub use pool::{Pool, PoolConfig, PoolStats};
pub use transaction::Transaction;
