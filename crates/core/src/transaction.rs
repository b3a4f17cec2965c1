//! Transaction status state machine
//!
//! Tracks whether a leased session is outside a transaction, inside an
//! active transaction, or inside a failed (must-rollback) transaction.
//!
//! State transitions:
//! - `None` → `Active` (BEGIN acknowledged)
//! - `Active` → `Committed` (COMMIT acknowledged)
//! - `Active` → `Failed` (backend error reported while active)
//! - `Active` → `RolledBack` (ROLLBACK acknowledged)
//! - `Failed` → `RolledBack` (ROLLBACK acknowledged)
//!
//! `Committed` and `RolledBack` are terminal for the connection handle; only
//! the pool resets a terminal status back to `None` when it reclaims the
//! session. A `Failed` status is never auto-recovered: the only legal caller
//! action from `Failed` is rollback, and any query submitted while `Failed`
//! fails immediately with the fixed rolled-back error, without session I/O.

use crate::error::{Error, Result};

/// Transaction status of a leased session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// No transaction is open; plain queries run in autocommit mode
    None,
    /// A transaction is open and usable
    Active,
    /// A backend error occurred inside the transaction; only rollback is legal
    Failed,
    /// The transaction committed; the handle is spent
    Committed,
    /// The transaction rolled back; the handle is spent
    RolledBack,
}

impl TxStatus {
    /// True once the transaction reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::RolledBack)
    }

    /// True while the transaction is failed and awaiting rollback
    pub fn is_failed(&self) -> bool {
        matches!(self, TxStatus::Failed)
    }

    // === Submission guards ===
    //
    // Checked synchronously at submission time; a rejected command never
    // reaches the session.

    /// May a query be submitted in this status?
    pub fn check_query(&self) -> Result<()> {
        match self {
            TxStatus::None | TxStatus::Active => Ok(()),
            TxStatus::Failed => Err(Error::TransactionRolledBack),
            TxStatus::Committed | TxStatus::RolledBack => Err(Error::invalid_state(
                "transaction has completed; release the connection",
            )),
        }
    }

    /// May BEGIN be submitted in this status?
    pub fn check_begin(&self) -> Result<()> {
        match self {
            TxStatus::None => Ok(()),
            TxStatus::Active | TxStatus::Failed => {
                Err(Error::invalid_state("transaction already in progress"))
            }
            TxStatus::Committed | TxStatus::RolledBack => Err(Error::invalid_state(
                "transaction has completed; release the connection",
            )),
        }
    }

    /// May COMMIT be submitted in this status?
    ///
    /// Policy: commit of a failed transaction is rejected rather than
    /// silently treated as rollback; the caller must roll back explicitly.
    pub fn check_commit(&self) -> Result<()> {
        match self {
            TxStatus::Active => Ok(()),
            TxStatus::Failed => Err(Error::invalid_state(
                "transaction has failed and cannot be committed; call rollback",
            )),
            TxStatus::None => Err(Error::invalid_state("no transaction in progress")),
            TxStatus::Committed | TxStatus::RolledBack => {
                Err(Error::invalid_state("transaction already completed"))
            }
        }
    }

    /// May ROLLBACK be submitted in this status?
    pub fn check_rollback(&self) -> Result<()> {
        match self {
            TxStatus::Active | TxStatus::Failed => Ok(()),
            TxStatus::None => Err(Error::invalid_state("no transaction in progress")),
            TxStatus::Committed | TxStatus::RolledBack => {
                Err(Error::invalid_state("transaction already completed"))
            }
        }
    }

    // === Outcome transitions ===
    //
    // Applied by the session worker after the backend's acknowledgment,
    // before the outcome is delivered to the caller.

    /// BEGIN acknowledged: `None` → `Active`
    pub fn begin_acknowledged(&mut self) {
        if matches!(self, TxStatus::None) {
            *self = TxStatus::Active;
        }
    }

    /// COMMIT acknowledged: `Active` → `Committed`
    pub fn commit_acknowledged(&mut self) {
        if matches!(self, TxStatus::Active) {
            *self = TxStatus::Committed;
        }
    }

    /// ROLLBACK acknowledged: `Active`/`Failed` → `RolledBack`
    pub fn rollback_acknowledged(&mut self) {
        if matches!(self, TxStatus::Active | TxStatus::Failed) {
            *self = TxStatus::RolledBack;
        }
    }

    /// Backend error reported: `Active` → `Failed`, otherwise unchanged
    pub fn backend_error(&mut self) {
        if matches!(self, TxStatus::Active) {
            *self = TxStatus::Failed;
        }
    }

    /// Pool reclaim: reset a terminal status back to `None`.
    ///
    /// Invariant: a session re-enters the idle set only with status `None`.
    pub fn reset(&mut self) {
        if self.is_terminal() {
            *self = TxStatus::None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_queries_allowed_outside_transaction() {
        assert!(TxStatus::None.check_query().is_ok());
        assert!(TxStatus::Active.check_query().is_ok());
    }

    #[test]
    fn failed_rejects_queries_with_fixed_error() {
        let err = TxStatus::Failed.check_query().unwrap_err();
        assert_eq!(err, Error::TransactionRolledBack);
        assert_eq!(err.to_string(), "Transaction is rolled back");
    }

    #[test]
    fn begin_requires_no_open_transaction() {
        assert!(TxStatus::None.check_begin().is_ok());
        assert!(TxStatus::Active.check_begin().is_err());
        assert!(TxStatus::Failed.check_begin().is_err());
        assert!(TxStatus::Committed.check_begin().is_err());
    }

    #[test]
    fn commit_from_failed_is_rejected() {
        let err = TxStatus::Failed.check_commit().unwrap_err();
        assert!(err.to_string().contains("call rollback"));
        // rollback is still legal from Failed
        assert!(TxStatus::Failed.check_rollback().is_ok());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in [TxStatus::Committed, TxStatus::RolledBack] {
            assert!(status.check_query().is_err());
            assert!(status.check_begin().is_err());
            assert!(status.check_commit().is_err());
            assert!(status.check_rollback().is_err());
        }
    }

    #[test]
    fn full_commit_lifecycle() {
        let mut status = TxStatus::None;
        status.begin_acknowledged();
        assert_eq!(status, TxStatus::Active);
        status.commit_acknowledged();
        assert_eq!(status, TxStatus::Committed);
        assert!(status.is_terminal());
        status.reset();
        assert_eq!(status, TxStatus::None);
    }

    #[test]
    fn backend_error_forces_failed_only_while_active() {
        let mut status = TxStatus::Active;
        status.backend_error();
        assert_eq!(status, TxStatus::Failed);

        // Outside a transaction a backend error does not change state.
        let mut status = TxStatus::None;
        status.backend_error();
        assert_eq!(status, TxStatus::None);

        // A second error leaves Failed as-is.
        let mut status = TxStatus::Failed;
        status.backend_error();
        assert_eq!(status, TxStatus::Failed);
    }

    #[test]
    fn failed_is_only_resolved_by_rollback() {
        let mut status = TxStatus::Failed;
        status.begin_acknowledged();
        status.commit_acknowledged();
        assert_eq!(status, TxStatus::Failed);
        status.rollback_acknowledged();
        assert_eq!(status, TxStatus::RolledBack);
    }

    #[derive(Debug, Clone, Copy)]
    enum Event {
        BeginAck,
        CommitAck,
        RollbackAck,
        BackendError,
        Reset,
    }

    fn apply(status: &mut TxStatus, event: Event) {
        match event {
            Event::BeginAck => status.begin_acknowledged(),
            Event::CommitAck => status.commit_acknowledged(),
            Event::RollbackAck => status.rollback_acknowledged(),
            Event::BackendError => status.backend_error(),
            Event::Reset => status.reset(),
        }
    }

    fn event_strategy() -> impl Strategy<Value = Event> {
        prop_oneof![
            Just(Event::BeginAck),
            Just(Event::CommitAck),
            Just(Event::RollbackAck),
            Just(Event::BackendError),
            Just(Event::Reset),
        ]
    }

    proptest! {
        /// Under any event sequence, the machine never invents a state that
        /// would let a query slip past a failed transaction: whenever the
        /// status is Failed, queries are rejected with the fixed error and
        /// only rollback (or nothing) may change the status.
        #[test]
        fn failed_state_is_sticky(events in proptest::collection::vec(event_strategy(), 0..64)) {
            let mut status = TxStatus::None;
            for event in events {
                let before = status;
                apply(&mut status, event);
                if before == TxStatus::Failed {
                    // Only RollbackAck moves a failed transaction.
                    match event {
                        Event::RollbackAck => prop_assert_eq!(status, TxStatus::RolledBack),
                        _ => prop_assert_eq!(status, TxStatus::Failed),
                    }
                }
                if status == TxStatus::Failed {
                    prop_assert_eq!(status.check_query().unwrap_err(), Error::TransactionRolledBack);
                    prop_assert!(status.check_commit().is_err());
                    prop_assert!(status.check_rollback().is_ok());
                }
            }
        }

        /// Terminal states only ever transition via reset, and reset always
        /// lands on None.
        #[test]
        fn terminal_states_only_leave_via_reset(events in proptest::collection::vec(event_strategy(), 0..64)) {
            let mut status = TxStatus::None;
            for event in events {
                let before = status;
                apply(&mut status, event);
                if before.is_terminal() {
                    match event {
                        Event::Reset => prop_assert_eq!(status, TxStatus::None),
                        _ => prop_assert_eq!(status, before),
                    }
                }
            }
        }
    }
}
