//! Per-session operation queue and completion dispatch
//!
//! Each leased session is owned by exactly one worker task. Submissions go
//! through an unbounded channel, so `submit` never blocks and never executes
//! an operation synchronously. The worker processes operations strictly in
//! submission order with at most one command in flight: most wire protocols
//! are request/response per connection, so reordering or overlapping sends
//! would corrupt the stream.
//!
//! Completion delivery is a `oneshot` per operation, completed exactly once,
//! after the outcome has been fully processed — including the transaction
//! status transition it triggers. That ordering is what lets a caller racing
//! against an error outcome already observe the failed status.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use aqueduct_core::{Error, QueryResult, Result, Session, TxStatus};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// What a queued command means to the transaction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Query,
    Begin,
    Commit,
    Rollback,
}

/// A pending operation: command text plus its single-use completion channel
struct Operation {
    kind: CommandKind,
    command: String,
    seq: u64,
    reply: oneshot::Sender<Result<QueryResult>>,
}

/// Handle to one session worker.
///
/// Owned by the pool while the session is idle and by a connection while it
/// is leased. Dropping the handle closes the queue; the worker drains what
/// was already submitted, then closes the physical session.
pub(crate) struct SessionHandle {
    id: u64,
    ops: mpsc::UnboundedSender<Operation>,
    status: Arc<Mutex<TxStatus>>,
    alive: Arc<AtomicBool>,
    next_seq: AtomicU64,
}

impl SessionHandle {
    /// Wrap a physical session in a worker task and return its handle.
    pub(crate) fn spawn(id: u64, session: Box<dyn Session>) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(TxStatus::None));
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_session(
            id,
            session,
            rx,
            Arc::clone(&status),
            Arc::clone(&alive),
        ));
        SessionHandle {
            id,
            ops,
            status,
            alive,
            next_seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn status(&self) -> TxStatus {
        *self.status.lock()
    }

    /// Reset a terminal transaction status before the session re-enters the
    /// idle set.
    pub(crate) fn reset_status(&self) {
        self.status.lock().reset();
    }

    /// Enqueue a command and return the receiver its outcome will arrive on.
    ///
    /// The transaction-status guard runs synchronously here: a rejected
    /// command never reaches the session. In particular, a query submitted
    /// while the transaction is failed fails immediately with the fixed
    /// `Transaction is rolled back` error, without any session I/O.
    pub(crate) fn submit(
        &self,
        kind: CommandKind,
        command: impl Into<String>,
    ) -> Result<oneshot::Receiver<Result<QueryResult>>> {
        if !self.is_alive() {
            return Err(Error::disconnected("session is no longer usable"));
        }
        // The lock is held across the enqueue so that guard order matches
        // queue order.
        let status = self.status.lock();
        check_dispatch(&status, kind)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(Operation {
                kind,
                command: command.into(),
                seq,
                reply,
            })
            .map_err(|_| Error::disconnected("session worker has stopped"))?;
        Ok(rx)
    }
}

/// May `kind` go to the session while the transaction is in this status?
///
/// Runs twice per operation: synchronously at submission time, and again in
/// the worker just before dispatch. The second check matters because the
/// status can change while the operation sits in the queue — an earlier
/// outcome may have failed the transaction or acknowledged a BEGIN — and a
/// command that is no longer legal must not reach the session.
fn check_dispatch(status: &TxStatus, kind: CommandKind) -> Result<()> {
    match kind {
        CommandKind::Query => status.check_query(),
        CommandKind::Begin => status.check_begin(),
        CommandKind::Commit => status.check_commit(),
        CommandKind::Rollback => status.check_rollback(),
    }
}

/// Await an operation's outcome.
pub(crate) async fn await_reply(rx: oneshot::Receiver<Result<QueryResult>>) -> Result<QueryResult> {
    match rx.await {
        Ok(outcome) => outcome,
        // Worker gone before delivery; treat as a transport failure.
        Err(_) => Err(Error::disconnected("session worker dropped the operation")),
    }
}

/// The session worker: single-flight dispatch in strict submission order.
async fn run_session(
    id: u64,
    mut session: Box<dyn Session>,
    mut ops: mpsc::UnboundedReceiver<Operation>,
    status: Arc<Mutex<TxStatus>>,
    alive: Arc<AtomicBool>,
) {
    while let Some(op) = ops.recv().await {
        if !alive.load(Ordering::Acquire) {
            // A previous operation hit a transport failure; everything
            // behind it is answered without touching the dead session.
            let _ = op.reply.send(Err(Error::disconnected("session is no longer usable")));
            continue;
        }
        // Re-validate against the current status: the submission guard saw
        // an older one. A query queued behind the command that failed the
        // transaction gets the fixed rolled-back error; a commit queued
        // behind it is rejected; a second queued BEGIN is rejected once the
        // first is acknowledged. None of these reach the session.
        if let Err(err) = check_dispatch(&status.lock(), op.kind) {
            let _ = op.reply.send(Err(err));
            continue;
        }

        tracing::trace!(session = id, seq = op.seq, kind = ?op.kind, "dispatching operation");
        let outcome = session.send(&op.command).await;

        match &outcome {
            Ok(_) => {
                let mut st = status.lock();
                match op.kind {
                    CommandKind::Begin => st.begin_acknowledged(),
                    CommandKind::Commit => st.commit_acknowledged(),
                    CommandKind::Rollback => st.rollback_acknowledged(),
                    CommandKind::Query => {}
                }
            }
            Err(err) if err.is_disconnect() => {
                tracing::warn!(session = id, error = %err, "transport failure; session marked dead");
                alive.store(false, Ordering::Release);
            }
            Err(err) => {
                tracing::debug!(session = id, seq = op.seq, error = %err, "backend error");
                status.lock().backend_error();
            }
        }

        // The status transition above happens before delivery, so a caller
        // racing this outcome already observes the updated status.
        let _ = op.reply.send(outcome);
    }
    session.close().await;
    tracing::debug!(session = id, "session worker stopped");
}
