//! Caller-facing transaction handle
//!
//! Obtained from [`Connection::begin`](crate::Connection::begin) after the
//! backend acknowledges BEGIN. Resolving the transaction (commit or
//! rollback) returns the underlying session to the pool and renders the
//! originating connection unusable.

use std::sync::Arc;

use aqueduct_core::{Error, Result};

use crate::connection::ConnInner;
use crate::queue::{await_reply, CommandKind};

/// An open transaction bound to one connection.
///
/// Exactly one resolution is delivered: `commit` and `rollback` each
/// complete only after the backend acknowledges the terminal command, and a
/// second resolution attempt on the same handle is rejected with an
/// invalid-state error.
pub struct Transaction {
    inner: Arc<ConnInner>,
    resolved: bool,
}

impl Transaction {
    pub(crate) fn new(inner: Arc<ConnInner>) -> Self {
        Transaction {
            inner,
            resolved: false,
        }
    }

    /// Commit the transaction.
    ///
    /// On acknowledgment the session returns to the pool and the
    /// originating connection becomes unusable for further queries.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if the transaction has failed (a failed
    ///   transaction can only be rolled back), or if this transaction was
    ///   already resolved.
    /// - The backend's error if COMMIT itself is rejected; the transaction
    ///   then moves to the failed state and [`rollback`](Transaction::rollback)
    ///   remains available.
    pub async fn commit(&mut self) -> Result<()> {
        self.finish(CommandKind::Commit, "COMMIT").await
    }

    /// Roll the transaction back.
    ///
    /// Legal from both the active and the failed state; this is the only
    /// way to terminate a failed transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.finish(CommandKind::Rollback, "ROLLBACK").await
    }

    async fn finish(&mut self, kind: CommandKind, sql: &str) -> Result<()> {
        if self.resolved {
            return Err(Error::invalid_state("transaction already resolved"));
        }
        let rx = self.inner.submit(kind, sql)?;
        await_reply(rx).await?;
        self.resolved = true;
        // Terminal command acknowledged: the session goes back to the pool
        // and the connection handle is spent.
        self.inner.release().await;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.resolved {
            // The transaction stays open on the session; the pool forces a
            // rollback when the connection is released or reclaimed.
            tracing::warn!("transaction dropped without commit or rollback");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("resolved", &self.resolved)
            .finish()
    }
}
