//! Test doubles for the aqueduct client layer
//!
//! Two families of fakes implement the `aqueduct_core` session traits:
//! - [`MemoryBackend`]: a tiny in-memory SQL engine with real transaction
//!   semantics (staged writes, commit/rollback, duplicate-key errors), for
//!   end-to-end visibility tests.
//! - [`ScriptedSession`]: replays a pre-programmed list of outcomes and
//!   records every command it receives, for ordering and dispatch tests.

#![warn(clippy::all)]

mod memory;
mod scripted;

pub use memory::{FailingFactory, MemoryBackend, MemoryFactory};
pub use scripted::{ScriptedFactory, ScriptedProbe, ScriptedSession};
