//! Aqueduct - asynchronous database client concurrency layer
//!
//! Aqueduct sits between application code and a database wire protocol. It
//! provides pooled connections, per-session operation queues with strict
//! submission-order dispatch, and a transaction state machine that keeps
//! misuse (queries after a failure, double commit, state leaking between
//! pool leases) out of the wire layer.
//!
//! # Quick Start
//!
//! ```ignore
//! use aqueduct::{Pool, PoolConfig};
//!
//! let pool = Pool::new(my_factory, PoolConfig::new(10));
//!
//! let (conn, mut tx) = pool.begin().await?;
//! conn.query("INSERT INTO TX_TEST(ID) VALUES(10)").await?;
//! tx.commit().await?;
//! ```
//!
//! The wire protocol itself is a collaborator: implement
//! [`Session`] and [`SessionFactory`] over your transport and hand the
//! factory to the pool.

pub use aqueduct_client::{Connection, Pool, PoolConfig, PoolStats, Transaction};
pub use aqueduct_core::{
    Error, QueryResult, Result, Row, Session, SessionFactory, SessionFuture, TxStatus, Value,
};
