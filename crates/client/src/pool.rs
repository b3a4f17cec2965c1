//! Connection pool
//!
//! Owns a set of sessions and leases them to callers. The pool is an
//! explicitly constructed, explicitly owned object — no process-wide
//! singleton. Lease state is mutated under the pool's own lock, never while
//! a leased handle has an operation in flight: release paths go through the
//! session's queue and await the forced rollback before the session is
//! pooled again.
//!
//! Invariants:
//! - A session is never in the idle set with a transaction status other
//!   than `None`.
//! - A session whose transport failed is discarded, never pooled.
//! - Session creation failures surface to the acquire request that
//!   triggered them; they are never fatal to the pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aqueduct_core::{Error, QueryResult, Result, SessionFactory, TxStatus};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::connection::Connection;
use crate::queue::{CommandKind, SessionHandle};
use crate::transaction::Transaction;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of physical sessions
    pub max_sessions: usize,
    /// Maximum time an acquire request waits under backpressure
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_sessions: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given session capacity.
    pub fn new(max_sessions: usize) -> Self {
        PoolConfig {
            max_sessions,
            ..Default::default()
        }
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions alive (leased + idle)
    pub total_sessions: usize,
    /// Sessions in the idle set
    pub idle_sessions: usize,
    /// Acquire requests waiting for capacity
    pub pending_acquires: usize,
}

/// A pool of database sessions.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool over the given session factory.
    pub fn new(factory: impl SessionFactory, config: PoolConfig) -> Self {
        Pool {
            inner: Arc::new(PoolInner {
                factory: Box::new(factory),
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                    waiters: VecDeque::new(),
                    closed: false,
                }),
                next_session_id: AtomicU64::new(0),
            }),
        }
    }

    /// Lease a connection.
    ///
    /// Uses an idle session when one exists, creates a new session while
    /// under capacity, and otherwise waits for a session to be released.
    ///
    /// # Errors
    /// - [`Error::AcquireTimeout`] if the configured acquire timeout elapses
    ///   under backpressure.
    /// - [`Error::SessionCreate`] if opening a new session fails — scoped to
    ///   this request, the pool itself stays healthy.
    /// - [`Error::PoolClosed`] after [`close`](Pool::close).
    pub async fn acquire(&self) -> Result<Connection> {
        let handle = self.inner.lease().await?;
        Ok(Connection::new(Arc::clone(&self.inner), handle))
    }

    /// Return a connection to the pool. Equivalent to
    /// [`Connection::release`].
    pub async fn release(&self, conn: Connection) {
        conn.release().await;
    }

    /// Convenience: acquire, run one query, release.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.acquire().await?;
        let result = conn.query(sql).await;
        conn.release().await;
        result
    }

    /// Convenience: acquire a connection and start a transaction on it.
    ///
    /// On BEGIN failure the connection is released before the error is
    /// returned.
    pub async fn begin(&self) -> Result<(Connection, Transaction)> {
        let conn = self.acquire().await?;
        match conn.begin().await {
            Ok(tx) => Ok((conn, tx)),
            Err(err) => {
                conn.release().await;
                Err(err)
            }
        }
    }

    /// Shut the pool down.
    ///
    /// Drains the idle set (each session is closed by its worker), fails
    /// waiting acquires with [`Error::PoolClosed`], and makes subsequent
    /// acquires fail the same way. Sessions currently leased are closed
    /// when released.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Current pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            total_sessions: state.total,
            idle_sessions: state.idle.len(),
            pending_acquires: state.waiters.len(),
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("max_sessions", &self.inner.config.max_sessions)
            .field("total", &stats.total_sessions)
            .field("idle", &stats.idle_sessions)
            .field("pending", &stats.pending_acquires)
            .finish()
    }
}

pub(crate) struct PoolInner {
    factory: Box<dyn SessionFactory>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    next_session_id: AtomicU64,
}

struct PoolState {
    idle: Vec<SessionHandle>,
    /// Sessions alive: leased + idle + being created
    total: usize,
    waiters: VecDeque<oneshot::Sender<Result<SessionHandle>>>,
    closed: bool,
}

/// How an acquire request will be satisfied, decided under the state lock.
enum LeasePlan {
    Ready(SessionHandle),
    Create,
    Wait(oneshot::Receiver<Result<SessionHandle>>),
}

impl PoolInner {
    async fn lease(self: &Arc<Self>) -> Result<SessionHandle> {
        let plan = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(handle) = state.idle.pop() {
                LeasePlan::Ready(handle)
            } else if state.total < self.config.max_sessions {
                state.total += 1;
                LeasePlan::Create
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                LeasePlan::Wait(rx)
            }
        };

        match plan {
            LeasePlan::Ready(handle) => Ok(handle),
            LeasePlan::Create => match self.create_session().await {
                Ok(handle) => Ok(handle),
                Err(err) => {
                    self.state.lock().total -= 1;
                    Err(err)
                }
            },
            LeasePlan::Wait(rx) => {
                match tokio::time::timeout(self.config.acquire_timeout, rx).await {
                    Ok(Ok(result)) => result,
                    // The pool dropped our waiter while shutting down.
                    Ok(Err(_)) => Err(Error::PoolClosed),
                    // Timed out; our abandoned waiter is skipped at release
                    // time because its receiver is gone.
                    Err(_) => Err(Error::AcquireTimeout),
                }
            }
        }
    }

    async fn create_session(&self) -> Result<SessionHandle> {
        let session = match self.factory.create().await {
            Ok(session) => session,
            Err(err) => {
                return Err(Error::SessionCreate {
                    message: err.to_string(),
                })
            }
        };
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, "session created");
        Ok(SessionHandle::spawn(id, session))
    }

    /// Take a session back from a released or resolved connection.
    ///
    /// A session re-enters the idle set only with status `None`: terminal
    /// statuses are reset, and a transaction left active or failed is
    /// rolled back first. Dead sessions are discarded.
    pub(crate) async fn reclaim(self: &Arc<Self>, handle: SessionHandle) {
        if !handle.is_alive() {
            self.discard(handle);
            return;
        }
        let status = handle.status();
        match status {
            TxStatus::None => self.repool(handle),
            status if status.is_terminal() => {
                handle.reset_status();
                self.repool(handle);
            }
            _ => {
                // Active or Failed at release time.
                tracing::warn!(
                    session = handle.id(),
                    status = ?status,
                    "open transaction at release; forcing rollback"
                );
                match handle.submit(CommandKind::Rollback, "ROLLBACK") {
                    Ok(rx) => match rx.await {
                        Ok(Ok(_)) => {
                            handle.reset_status();
                            self.repool(handle);
                        }
                        _ => self.discard(handle),
                    },
                    Err(_) => self.discard(handle),
                }
            }
        }
    }

    /// Put a clean session back, preferring a waiting acquire over the idle
    /// set.
    fn repool(self: &Arc<Self>, handle: SessionHandle) {
        let mut handle = handle;
        let mut state = self.state.lock();
        if state.closed {
            state.total -= 1;
            // Dropping the handle stops its worker, which closes the session.
            return;
        }
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(Ok(handle)) {
                Ok(()) => return,
                // That acquire gave up (timeout); recover the session and
                // try the next waiter.
                Err(rejected) => {
                    let Ok(recovered) = rejected else { return };
                    handle = recovered;
                }
            }
        }
        state.idle.push(handle);
    }

    /// Drop a session for good, freeing its capacity slot.
    pub(crate) fn discard(self: &Arc<Self>, handle: SessionHandle) {
        tracing::debug!(session = handle.id(), "discarding session");
        drop(handle);
        let mut state = self.state.lock();
        state.total -= 1;
        self.refill_locked(&mut state);
    }

    /// A capacity slot just freed while acquires are waiting: start a
    /// replacement session for the first of them.
    fn refill_locked(self: &Arc<Self>, state: &mut PoolState) {
        if state.closed || state.waiters.is_empty() || state.total >= self.config.max_sessions {
            return;
        }
        // Discard can run from a sync Drop outside the runtime; skip the
        // refill there — the waiter still has its acquire timeout.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        state.total += 1;
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            match inner.create_session().await {
                Ok(handle) => inner.repool(handle),
                Err(err) => {
                    let waiter = {
                        let mut state = inner.state.lock();
                        state.total -= 1;
                        state.waiters.pop_front()
                    };
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(Err(err));
                    }
                }
            }
        });
    }

    fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.state.lock();
            state.closed = true;
            state.total -= state.idle.len();
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };
        for waiter in waiters {
            let _ = waiter.send(Err(Error::PoolClosed));
        }
        // Dropping the handles stops their workers, closing the sessions.
        drop(idle);
        tracing::debug!("pool closed");
    }
}
