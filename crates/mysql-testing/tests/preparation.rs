//! Preparation sub-path tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use mysql_command::{Command, CommandKind, Session, SessionState};
use mysql_testing::MockSession;

fn bound_command(session: &Arc<MockSession>, text: &str) -> Command {
    Command::with_session(text, Arc::clone(session) as Arc<dyn Session>)
}

#[tokio::test]
async fn test_prepare_caches_by_exact_text() {
    let session = Arc::new(MockSession::open());
    let command = bound_command(&session, "SELECT name FROM users WHERE id = ?");

    command.prepare().await.unwrap();

    assert_eq!(session.prepare_calls(), 1);
    assert!(session.cached_handle("SELECT name FROM users WHERE id = ?").is_some());
    // A whitespace variant is a different statement.
    assert!(session.cached_handle("SELECT name FROM users WHERE id = ? ").is_none());
}

#[tokio::test]
async fn test_repeated_prepare_is_noop() {
    let session = Arc::new(MockSession::open());
    let command = bound_command(&session, "SELECT ?");

    command.prepare().await.unwrap();
    command.prepare().await.unwrap();

    assert_eq!(session.prepare_calls(), 1);
}

#[tokio::test]
async fn test_prepare_skipped_when_connection_ignores_it() {
    let session = Arc::new(MockSession::open());
    session.set_ignore_prepare(true);
    let command = bound_command(&session, "SELECT ?");

    command.prepare().await.unwrap();
    assert_eq!(session.prepare_calls(), 0);
}

#[tokio::test]
async fn test_stored_procedure_kind_not_preparable() {
    let session = Arc::new(MockSession::open());
    let mut command = bound_command(&session, "get_users");
    command.set_kind(CommandKind::StoredProcedure);

    let err = command.prepare().await.unwrap_err();
    assert!(err.is_state());
    assert_eq!(session.prepare_calls(), 0);
}

#[tokio::test]
async fn test_prepare_allowed_while_connecting() {
    let session = Arc::new(MockSession::open());
    session.set_state(SessionState::Connecting);
    let command = bound_command(&session, "SELECT ?");

    command.prepare().await.unwrap();
    assert_eq!(session.prepare_calls(), 1);
}

#[tokio::test]
async fn test_prepare_rejected_on_closed_connection() {
    let session = Arc::new(MockSession::open());
    session.set_state(SessionState::Closed);
    let command = bound_command(&session, "SELECT ?");

    assert!(command.prepare().await.unwrap_err().is_state());
    assert_eq!(session.prepare_calls(), 0);
}

#[tokio::test]
async fn test_prepare_rejects_empty_text() {
    let session = Arc::new(MockSession::open());
    let command = bound_command(&session, "  ");

    assert!(command.prepare().await.unwrap_err().is_state());
}

#[tokio::test]
async fn test_execution_carries_prepared_handle() {
    let session = Arc::new(MockSession::open());
    let mut command = bound_command(&session, "SELECT name FROM users WHERE id = ?");
    command.params_mut().push_value(1i64);

    command.prepare().await.unwrap();
    let handle = session.cached_handle("SELECT name FROM users WHERE id = ?");
    assert!(handle.is_some());

    session.queue_rows(vec![]);
    command.execute_scalar(None).await.unwrap();

    assert_eq!(session.dispatches()[0].prepared, handle);
}

#[tokio::test]
async fn test_unprepared_execution_carries_no_handle() {
    let session = Arc::new(MockSession::open());
    session.queue_ok(1, None);

    let mut command = bound_command(&session, "UPDATE t SET x = 1");
    command.execute_non_query(None).await.unwrap();

    assert_eq!(session.dispatches()[0].prepared, None);
}

#[test]
fn test_prepare_blocking() {
    let session = Arc::new(MockSession::open());
    let command = bound_command(&session, "SELECT ?");

    command.prepare_blocking().unwrap();
    assert_eq!(session.prepare_calls(), 1);
}
