//! Deadline-bounded query execution against a scripted connection.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Call, FakeConnection, FakeError};
use shed::deadline::{Deadline, ManualClock, Timeout};
use shed::query::executor::{self, Outcome};
use shed::query::{Connection, DeadlineConnection, Query, QueryError};

fn deadline_in(ms: u64) -> (Arc<ManualClock>, Deadline) {
    let clock = Arc::new(ManualClock::new(0));
    let deadline = Deadline::with_clock(clock.clone());
    deadline.set(ms);
    (clock, deadline)
}

fn select() -> Query {
    Query::simple("SELECT pg_sleep(10)")
}

#[tokio::test(start_paused = true)]
async fn completes_within_budget() {
    let (_clock, deadline) = deadline_in(500);
    let mut conn = FakeConnection::new().on_fetch(Ok("42"));

    let outcome = executor::execute(&mut conn, &select(), &deadline).await.unwrap();

    assert_eq!(outcome, Outcome::Completed("42".to_string()));
    assert_eq!(
        conn.calls,
        vec![
            Call::Send(select()),
            Call::Poll(Duration::from_millis(500)),
            Call::Fetch,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_query_is_cancelled_and_drained() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::slow_query();

    let outcome = executor::execute(&mut conn, &select(), &deadline).await.unwrap();

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(
        conn.calls,
        vec![
            Call::Send(select()),
            Call::Poll(Duration::from_millis(50)),
            Call::Cancel,
            Call::Fetch,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unrelated_drain_error_is_not_a_timeout() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::new()
        .on_poll(Ok(false))
        .on_fetch(Err(FakeError::Io("broken pipe")));

    let err = executor::execute(&mut conn, &select(), &deadline).await.unwrap_err();

    assert!(matches!(err, QueryError::Connection(FakeError::Io("broken pipe"))));
    assert_eq!(conn.sends(), 1);
    assert_eq!(conn.cancels(), 1);
    assert_eq!(conn.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_cancel_propagates() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::new()
        .on_poll(Ok(false))
        .on_cancel(Err(FakeError::Io("cancel refused")));

    let err = executor::execute(&mut conn, &select(), &deadline).await.unwrap_err();

    assert!(!err.is_timeout());
    assert!(matches!(err, QueryError::Connection(FakeError::Io("cancel refused"))));
    assert_eq!(conn.cancels(), 1);
    assert_eq!(conn.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_cancel_wins_over_drain_result() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::new()
        .on_poll(Ok(false))
        .on_cancel(Err(FakeError::Io("cancel refused")))
        .on_fetch(Err(FakeError::QueryCanceled));

    let err = executor::execute(&mut conn, &select(), &deadline).await.unwrap_err();

    assert!(matches!(err, QueryError::Connection(FakeError::Io("cancel refused"))));
    assert_eq!(conn.fetches(), 1);

    let outcome = executor::execute(&mut conn, &Query::simple("SELECT 1"), &deadline).await;
    assert_eq!(outcome.unwrap(), Outcome::Completed("row".to_string()));
}

#[tokio::test(start_paused = true)]
async fn query_finishing_before_cancel_is_completed() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::new().on_poll(Ok(false)).on_fetch(Ok("late"));

    let outcome = executor::execute(&mut conn, &select(), &deadline).await.unwrap();

    assert_eq!(outcome, Outcome::Completed("late".to_string()));
    assert_eq!(conn.cancels(), 1);
}

#[tokio::test]
async fn expired_deadline_sends_nothing() {
    let (clock, deadline) = deadline_in(100);
    clock.advance(150);
    let mut conn = FakeConnection::new();

    let err = executor::execute(&mut conn, &select(), &deadline).await.unwrap_err();

    assert!(matches!(err, QueryError::Timeout(Timeout)));
    assert!(conn.calls.is_empty());
}

#[tokio::test]
async fn unset_deadline_takes_blocking_path() {
    let mut conn = FakeConnection::new().on_execute(Ok("plain"));

    let outcome = executor::execute(&mut conn, &select(), &Deadline::new()).await.unwrap();

    assert_eq!(outcome, Outcome::Completed("plain".to_string()));
    assert_eq!(conn.calls, vec![Call::Execute(select())]);
}

#[tokio::test(start_paused = true)]
async fn transform_runs_only_on_completion() {
    let (_clock, deadline) = deadline_in(50);
    let called = AtomicBool::new(false);
    let mut conn = FakeConnection::slow_query();

    let outcome = executor::execute_with(&mut conn, &select(), &deadline, |row| {
        called.store(true, Ordering::SeqCst);
        row.len()
    })
    .await
    .unwrap();

    assert!(outcome.is_cancelled());
    assert!(!called.load(Ordering::SeqCst));

    let mut conn = FakeConnection::new().on_fetch(Ok("abc"));
    let outcome = executor::execute_with(&mut conn, &select(), &deadline, |row| row.len())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed(3));
}

#[tokio::test(start_paused = true)]
async fn poll_budget_shrinks_as_time_passes() {
    let deadline = Deadline::new();
    deadline.set(100);
    tokio::time::advance(Duration::from_millis(60)).await;
    let mut conn = FakeConnection::new();

    executor::execute(&mut conn, &select(), &deadline).await.unwrap();

    assert_eq!(conn.calls[1], Call::Poll(Duration::from_millis(40)));
}

#[tokio::test(start_paused = true)]
async fn cancelled_query_leaves_connection_reusable() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = FakeConnection::slow_query();

    assert!(executor::execute(&mut conn, &select(), &deadline)
        .await
        .unwrap()
        .is_cancelled());
    let outcome = executor::execute(&mut conn, &Query::simple("SELECT 1"), &deadline).await;

    assert_eq!(outcome.unwrap(), Outcome::Completed("row".to_string()));
}

#[tokio::test(start_paused = true)]
async fn decorated_connection_uses_task_deadline() {
    let deadline = Deadline::new();
    deadline.set(50);
    let mut conn = DeadlineConnection::new(FakeConnection::slow_query());

    let err = deadline
        .scope(async { conn.execute(&select()).await })
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(conn.inner().cancels(), 1);
}

#[tokio::test]
async fn decorated_connection_outside_scope_blocks() {
    let mut conn = DeadlineConnection::new(FakeConnection::new().on_execute(Ok("plain")));

    assert_eq!(conn.execute(&select()).await.unwrap(), "plain");
    assert_eq!(conn.inner().calls, vec![Call::Execute(select())]);
}

#[tokio::test(start_paused = true)]
async fn execute_map_surfaces_cancellation_as_timeout() {
    let (_clock, deadline) = deadline_in(50);
    let mut conn = DeadlineConnection::new(FakeConnection::slow_query());

    let err = conn
        .execute_map(&select(), &deadline, |row| row.to_uppercase())
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let mut conn = DeadlineConnection::new(FakeConnection::new().on_fetch(Ok("abc")));
    let value = conn
        .execute_map(&select(), &deadline, |row| row.to_uppercase())
        .await
        .unwrap();
    assert_eq!(value, "ABC");
}
