//! Core types for the aqueduct client layer
//!
//! This crate defines the pieces shared between the client layer and any
//! transport implementation:
//! - [`Error`]/[`Result`]: the error taxonomy
//! - [`Value`], [`Row`], [`QueryResult`]: the minimal result model
//! - [`Session`]/[`SessionFactory`]: the collaborator contract for one
//!   physical connection
//! - [`TxStatus`]: the transaction status state machine
//!
//! The concurrency machinery (operation queue, connection handles, pool)
//! lives in `aqueduct-client`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod transaction;
pub mod value;

pub use error::{Error, Result};
pub use traits::{Session, SessionFactory, SessionFuture};
pub use transaction::TxStatus;
pub use value::{QueryResult, Row, Value};
