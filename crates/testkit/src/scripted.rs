//! Scripted session for dispatch and ordering tests
//!
//! A [`ScriptedSession`] replays a pre-programmed sequence of outcomes and
//! records every command it is asked to execute. The paired [`ScriptedProbe`]
//! lets a test inspect the command log after the fact and detect whether two
//! commands were ever in flight at the same time.

use aqueduct_core::{QueryResult, Result, Session, SessionFactory, SessionFuture};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observation side of a [`ScriptedSession`].
#[derive(Clone)]
pub struct ScriptedProbe {
    log: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicBool>,
    overlap: Arc<AtomicBool>,
}

impl ScriptedProbe {
    /// Commands the session executed, in execution order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// True if a command was ever issued while another was still in flight.
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

/// Session that replays scripted outcomes.
///
/// Outcomes are consumed in push order; once the script is exhausted every
/// command succeeds with an empty result. An optional per-command delay keeps
/// each command in flight long enough for overlap detection to be meaningful.
pub struct ScriptedSession {
    script: VecDeque<Result<QueryResult>>,
    delay: Option<Duration>,
    probe: ScriptedProbe,
}

impl ScriptedSession {
    /// Create a session and the probe observing it.
    pub fn new() -> (Self, ScriptedProbe) {
        let probe = ScriptedProbe {
            log: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            overlap: Arc::new(AtomicBool::new(false)),
        };
        let session = ScriptedSession {
            script: VecDeque::new(),
            delay: None,
            probe: probe.clone(),
        };
        (session, probe)
    }

    /// Queue a successful outcome.
    pub fn push_ok(&mut self, result: QueryResult) {
        self.script.push_back(Ok(result));
    }

    /// Queue an error outcome.
    pub fn push_err(&mut self, err: aqueduct_core::Error) {
        self.script.push_back(Err(err));
    }

    /// Hold every command in flight for `delay` before resolving it.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = Some(delay);
    }
}

impl Session for ScriptedSession {
    fn send(&mut self, command: &str) -> SessionFuture<'_, Result<QueryResult>> {
        self.probe.log.lock().push(command.to_string());
        if self.probe.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlap.store(true, Ordering::SeqCst);
        }
        let outcome = self
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::empty()));
        let delay = self.delay;
        let in_flight = Arc::clone(&self.probe.in_flight);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            in_flight.store(false, Ordering::SeqCst);
            outcome
        })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        self.probe.log.lock().push("<close>".to_string());
        Box::pin(async move {})
    }
}

/// Factory that hands out pre-built sessions, one per `create` call.
pub struct ScriptedFactory {
    sessions: Mutex<VecDeque<ScriptedSession>>,
}

impl ScriptedFactory {
    /// Factory serving the given sessions in order.
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        ScriptedFactory {
            sessions: Mutex::new(sessions.into_iter().collect()),
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn create(&self) -> SessionFuture<'_, Result<Box<dyn Session>>> {
        let session = self.sessions.lock().pop_front();
        Box::pin(async move {
            match session {
                Some(s) => Ok(Box::new(s) as Box<dyn Session>),
                None => Err(aqueduct_core::Error::disconnected(
                    "no scripted session remaining",
                )),
            }
        })
    }
}
