//! In-memory backend with transaction semantics
//!
//! Understands just enough SQL for the integration tests: CREATE/DROP TABLE,
//! single-value INSERT, point SELECT, and the transaction control commands.
//! Writes inside a transaction are staged and only reach the shared tables on
//! COMMIT, so tests can observe real visibility behavior across sessions.

use aqueduct_core::{Error, QueryResult, Result, Row, Session, SessionFactory, SessionFuture, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Tables = BTreeMap<String, BTreeSet<i64>>;

/// Shared in-memory database. Cheap to clone; all clones see the same tables.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    log: Arc<Mutex<Vec<String>>>,
    sessions_created: Arc<AtomicUsize>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that opens sessions against this backend.
    pub fn factory(&self) -> MemoryFactory {
        MemoryFactory {
            backend: self.clone(),
        }
    }

    /// Every command any session has executed, in execution order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of sessions the factory has opened.
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Committed ids in `table`, or `None` if the table does not exist.
    pub fn table_ids(&self, table: &str) -> Option<Vec<i64>> {
        self.tables
            .lock()
            .get(table)
            .map(|ids| ids.iter().copied().collect())
    }
}

/// Opens [`MemorySession`]s against a shared [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryFactory {
    backend: MemoryBackend,
}

impl SessionFactory for MemoryFactory {
    fn create(&self) -> SessionFuture<'_, Result<Box<dyn Session>>> {
        self.backend.sessions_created.fetch_add(1, Ordering::SeqCst);
        let session = MemorySession {
            backend: self.backend.clone(),
            in_tx: false,
            staged: Vec::new(),
            closed: false,
        };
        Box::pin(async move { Ok(Box::new(session) as Box<dyn Session>) })
    }
}

/// Wraps a factory and fails the first `fail_first` creations.
pub struct FailingFactory {
    inner: MemoryFactory,
    remaining_failures: AtomicUsize,
}

impl FailingFactory {
    /// Fail the first `fail_first` creations, then delegate to `inner`.
    pub fn new(fail_first: usize, inner: MemoryFactory) -> Self {
        FailingFactory {
            inner,
            remaining_failures: AtomicUsize::new(fail_first),
        }
    }
}

impl SessionFactory for FailingFactory {
    fn create(&self) -> SessionFuture<'_, Result<Box<dyn Session>>> {
        let fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Box::pin(async move { Err(Error::disconnected("connection refused")) })
        } else {
            self.inner.create()
        }
    }
}

struct MemorySession {
    backend: MemoryBackend,
    in_tx: bool,
    staged: Vec<(String, i64)>,
    closed: bool,
}

impl MemorySession {
    fn execute(&mut self, command: &str) -> Result<QueryResult> {
        if self.closed {
            return Err(Error::disconnected("session is closed"));
        }
        self.backend.log.lock().push(command.to_string());

        let trimmed = command.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper == "BEGIN" {
            self.in_tx = true;
            return Ok(QueryResult::empty());
        }
        if upper == "COMMIT" {
            let mut tables = self.backend.tables.lock();
            for (table, id) in self.staged.drain(..) {
                tables.entry(table).or_default().insert(id);
            }
            self.in_tx = false;
            return Ok(QueryResult::empty());
        }
        if upper == "ROLLBACK" {
            self.staged.clear();
            self.in_tx = false;
            return Ok(QueryResult::empty());
        }
        if let Some(rest) = upper.strip_prefix("CREATE TABLE ") {
            let table = first_word(rest);
            self.backend.tables.lock().entry(table).or_default();
            return Ok(QueryResult::empty());
        }
        if let Some(rest) = upper.strip_prefix("DROP TABLE ") {
            let rest = rest.strip_prefix("IF EXISTS ").unwrap_or(rest);
            let table = first_word(rest);
            self.backend.tables.lock().remove(&table);
            return Ok(QueryResult::empty());
        }
        if let Some(rest) = upper.strip_prefix("INSERT INTO ") {
            return self.insert(rest);
        }
        if upper == "SELECT 1" {
            return Ok(QueryResult::with_rows(vec![Row::new(vec![Value::Int(1)])]));
        }
        if let Some(rest) = upper.strip_prefix("SELECT ID FROM ") {
            return self.select(rest);
        }

        Err(Error::backend("42601", format!("syntax error: {trimmed}")))
    }

    // "T(ID) VALUES(n)"
    fn insert(&mut self, rest: &str) -> Result<QueryResult> {
        let table = rest
            .split(['(', ' '])
            .next()
            .unwrap_or_default()
            .to_string();
        let id = digits(rest.split("VALUES").nth(1).unwrap_or_default())
            .ok_or_else(|| Error::backend("42601", "malformed insert"))?;

        let tables = self.backend.tables.lock();
        let committed = tables.get(&table).is_some_and(|ids| ids.contains(&id));
        let staged = self.staged.iter().any(|(t, i)| *t == table && *i == id);
        if committed || staged {
            return Err(Error::backend(
                "23505",
                "duplicate key value violates unique constraint",
            ));
        }
        drop(tables);

        if self.in_tx {
            self.staged.push((table, id));
        } else {
            self.backend
                .tables
                .lock()
                .entry(table)
                .or_default()
                .insert(id);
        }
        Ok(QueryResult::updated(1))
    }

    // "T WHERE ID = n"
    fn select(&self, rest: &str) -> Result<QueryResult> {
        let table = first_word(rest);
        let id = digits(rest.split('=').nth(1).unwrap_or_default())
            .ok_or_else(|| Error::backend("42601", "malformed select"))?;

        let committed = self
            .backend
            .tables
            .lock()
            .get(&table)
            .is_some_and(|ids| ids.contains(&id));
        let staged = self.staged.iter().any(|(t, i)| *t == table && *i == id);

        let rows = if committed || staged {
            vec![Row::new(vec![Value::Int(id)])]
        } else {
            Vec::new()
        };
        Ok(QueryResult::with_rows(rows))
    }
}

impl Session for MemorySession {
    fn send(&mut self, command: &str) -> SessionFuture<'_, Result<QueryResult>> {
        let outcome = self.execute(command);
        Box::pin(async move { outcome })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        self.closed = true;
        self.staged.clear();
        Box::pin(async move {})
    }
}

fn first_word(s: &str) -> String {
    s.split([' ', '(', ';']).next().unwrap_or_default().to_string()
}

fn digits(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
