//! Caller-facing connection handle
//!
//! A [`Connection`] is bound to one leased session. Queries and transaction
//! commands are forwarded through the session's operation queue; the
//! transaction status is consulted synchronously at submission time and
//! updated by the session worker as outcomes arrive.

use std::sync::Arc;

use aqueduct_core::{Error, QueryResult, Result};
use parking_lot::Mutex;

use crate::pool::PoolInner;
use crate::queue::{await_reply, CommandKind, SessionHandle};
use crate::transaction::Transaction;

/// A pooled database connection.
///
/// Obtained from [`Pool::acquire`](crate::Pool::acquire). While leased, the
/// underlying session is mutated only through this handle; the pool takes it
/// back on [`release`](Connection::release) or when a transaction resolves.
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    pub(crate) fn new(pool: Arc<PoolInner>, handle: SessionHandle) -> Self {
        Connection {
            inner: Arc::new(ConnInner {
                pool,
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Execute a query and await its result.
    ///
    /// Non-blocking: the operation is enqueued on the session's queue and
    /// runs after everything submitted before it. Outcomes for one session
    /// are delivered in strict submission order.
    ///
    /// # Errors
    /// - [`Error::TransactionRolledBack`] (message `Transaction is rolled
    ///   back`) if the surrounding transaction has failed — returned without
    ///   contacting the session.
    /// - [`Error::Backend`] if the backend rejects the query. Inside an
    ///   active transaction this also moves the transaction to the failed
    ///   state, before this error is delivered.
    /// - [`Error::Disconnected`] on transport failure.
    /// - [`Error::InvalidState`] if the connection was already released or
    ///   its transaction completed.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let rx = self.inner.submit(CommandKind::Query, sql)?;
        await_reply(rx).await
    }

    /// Start a transaction.
    ///
    /// Legal only when no transaction is open on this connection. The
    /// returned [`Transaction`] is bound to this connection: queries inside
    /// the transaction keep going through [`query`](Connection::query).
    ///
    /// # Errors
    /// [`Error::InvalidState`] if a transaction is already in progress, or
    /// the backend's error if BEGIN itself fails (the connection then stays
    /// outside a transaction).
    pub async fn begin(&self) -> Result<Transaction> {
        let rx = self.inner.submit(CommandKind::Begin, "BEGIN")?;
        await_reply(rx).await?;
        Ok(Transaction::new(Arc::clone(&self.inner)))
    }

    /// Return the connection to its pool.
    ///
    /// If a transaction was left open (active or failed), the pool forces a
    /// rollback before the session re-enters the idle set, so transactional
    /// state never leaks into the next lease. A session whose transport has
    /// failed is discarded instead of pooled.
    pub async fn release(self) {
        self.inner.release().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.handle.lock();
        match guard.as_ref() {
            Some(handle) => f
                .debug_struct("Connection")
                .field("session", &handle.id())
                .field("status", &handle.status())
                .finish(),
            None => f.debug_struct("Connection").field("released", &true).finish(),
        }
    }
}

/// Shared state between a `Connection` and the `Transaction` bound to it.
pub(crate) struct ConnInner {
    pool: Arc<PoolInner>,
    /// `None` once the session went back to the pool; the handle is then
    /// unusable for further operations.
    handle: Mutex<Option<SessionHandle>>,
}

impl ConnInner {
    pub(crate) fn submit(
        &self,
        kind: CommandKind,
        sql: &str,
    ) -> Result<tokio::sync::oneshot::Receiver<Result<QueryResult>>> {
        let guard = self.handle.lock();
        let handle = guard
            .as_ref()
            .ok_or_else(|| Error::invalid_state("connection has been released"))?;
        handle.submit(kind, sql)
    }

    /// Detach the session and hand it back to the pool. Idempotent.
    pub(crate) async fn release(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            self.pool.reclaim(handle).await;
        }
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        // Dropping without release: the session may carry transaction state
        // and we cannot roll it back here, so it is discarded, not pooled.
        if let Some(handle) = self.handle.get_mut().take() {
            tracing::warn!(
                session = handle.id(),
                "connection dropped without release; discarding session"
            );
            self.pool.discard(handle);
        }
    }
}
