//! Pool behavior tests: reuse, backpressure, failure isolation, shutdown.

use std::time::Duration;

use aqueduct_client::{Pool, PoolConfig};
use aqueduct_core::Error;
use aqueduct_testkit::{FailingFactory, MemoryBackend, ScriptedFactory, ScriptedSession};

// ============================================================
// Reuse and capacity
// ============================================================

#[tokio::test]
async fn idle_sessions_are_reused() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.factory(), PoolConfig::new(4));

    for _ in 0..5 {
        pool.query("SELECT 1").await.unwrap();
    }

    assert_eq!(backend.sessions_created(), 1);
    let stats = pool.stats();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.idle_sessions, 1);
}

#[tokio::test]
async fn acquire_waits_for_release_at_capacity() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.factory(), PoolConfig::new(1));

    let conn = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            conn.query("SELECT 1").await.unwrap();
            conn.release().await;
        })
    };
    // Let the second acquire register as a waiter.
    while pool.stats().pending_acquires == 0 {
        tokio::task::yield_now().await;
    }

    conn.release().await;
    waiter.await.unwrap();

    // The waiter was served by handoff, not by a new session.
    assert_eq!(backend.sessions_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_times_out_under_backpressure() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(
        backend.factory(),
        PoolConfig::new(1).acquire_timeout(Duration::from_millis(50)),
    );

    let held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert_eq!(err, Error::AcquireTimeout);

    // The timed-out waiter does not leak: the released session goes idle.
    held.release().await;
    let stats = pool.stats();
    assert_eq!(stats.idle_sessions, 1);
    assert_eq!(stats.pending_acquires, 0);
}

// ============================================================
// Failure isolation
// ============================================================

#[tokio::test]
async fn session_creation_failure_is_scoped_to_one_acquire() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(
        FailingFactory::new(1, backend.factory()),
        PoolConfig::new(2),
    );

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::SessionCreate { .. }));
    // The failed creation released its capacity slot.
    assert_eq!(pool.stats().total_sessions, 0);

    // The pool is still healthy.
    pool.query("SELECT 1").await.unwrap();
}

#[tokio::test]
async fn dead_session_is_replaced_on_next_acquire() {
    let (mut broken, _probe) = ScriptedSession::new();
    broken.push_err(Error::disconnected("connection reset by peer"));
    let (healthy, probe) = ScriptedSession::new();
    let pool = Pool::new(
        ScriptedFactory::new(vec![broken, healthy]),
        PoolConfig::new(1),
    );

    let conn = pool.acquire().await.unwrap();
    conn.query("SELECT 1").await.unwrap_err();
    conn.release().await;
    assert_eq!(pool.stats().total_sessions, 0);

    // Next acquire opens a fresh session.
    let conn = pool.acquire().await.unwrap();
    conn.query("SELECT 1").await.unwrap();
    conn.release().await;
    assert_eq!(probe.log(), vec!["SELECT 1"]);
}

// ============================================================
// Shutdown
// ============================================================

#[tokio::test]
async fn close_fails_waiters_and_future_acquires() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.factory(), PoolConfig::new(1));

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    while pool.stats().pending_acquires == 0 {
        tokio::task::yield_now().await;
    }

    pool.close();
    assert_eq!(waiter.await.unwrap().unwrap_err(), Error::PoolClosed);
    assert_eq!(pool.acquire().await.unwrap_err(), Error::PoolClosed);

    // A session released after close is dropped, not pooled.
    held.release().await;
    assert_eq!(pool.stats().total_sessions, 0);
    assert_eq!(pool.stats().idle_sessions, 0);
}

#[tokio::test]
async fn close_drains_the_idle_set() {
    let backend = MemoryBackend::new();
    let pool = Pool::new(backend.factory(), PoolConfig::new(2));
    pool.query("SELECT 1").await.unwrap();
    assert_eq!(pool.stats().idle_sessions, 1);

    pool.close();
    let stats = pool.stats();
    assert_eq!(stats.total_sessions, 0);
    assert_eq!(stats.idle_sessions, 0);
}
