//! Timeout arming, firing, classification, and disarm-balance tests.
//!
//! The manual timer service stands in for the process-wide tokio timer,
//! so tests decide exactly when a timeout fires and can assert that
//! every execution attempt arms and disarms exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use mysql_command::{Command, Session, SessionState, TimerService};
use mysql_testing::{ManualTimerService, MockSession};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn timed_command(
    session: &Arc<MockSession>,
    timer: &Arc<ManualTimerService>,
    text: &str,
) -> Command {
    Command::with_session(text, Arc::clone(session) as Arc<dyn Session>)
        .with_timer_service(Arc::clone(timer) as Arc<dyn TimerService>)
}

#[tokio::test]
async fn test_timer_fire_classifies_as_timeout() {
    init_tracing();
    let session = Arc::new(MockSession::open());
    session.queue_hang();
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT SLEEP(100)");
    command.set_timeout(Some(5));

    let firer = {
        let timer = Arc::clone(&timer);
        tokio::spawn(async move {
            while timer.armed_len() == 0 {
                tokio::task::yield_now().await;
            }
            assert!(timer.fire_next());
        })
    };

    let err = command.execute_non_query(None).await.unwrap_err();
    firer.await.unwrap();

    assert!(err.is_timeout());
    assert!(!err.is_cancelled());
    assert!(command.timed_out());

    // The timeout travelled the same interrupt path as a cancellation.
    let interrupts = session.interrupts();
    assert_eq!(interrupts.len(), 1);
    assert!(interrupts[0].first_attempt);
}

#[tokio::test]
async fn test_token_fire_is_not_classified_as_timeout() {
    let session = Arc::new(MockSession::open());
    session.queue_hang();
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT SLEEP(100)");
    command.set_timeout(Some(5));
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while session.active_command().is_none() {
                tokio::task::yield_now().await;
            }
            token.cancel();
        })
    };

    let err = command.execute_non_query(Some(&token)).await.unwrap_err();
    canceller.await.unwrap();

    // The armed timer never fired, so this is a plain cancellation.
    assert!(err.is_cancelled());
    assert!(!command.timed_out());
    assert_eq!(timer.arm_calls(), 1);
    assert_eq!(timer.disarm_calls(), 1);
}

#[tokio::test]
async fn test_disarm_balance_on_success() {
    let session = Arc::new(MockSession::open());
    session.queue_ok(1, None);
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "UPDATE t SET x = 1");
    command.set_timeout(Some(5));
    command.execute_non_query(None).await.unwrap();

    assert_eq!(timer.arm_calls(), 1);
    assert_eq!(timer.disarm_calls(), 1);
    assert_eq!(timer.armed_len(), 0);
}

#[tokio::test]
async fn test_disarm_balance_on_gate_failure() {
    let session = Arc::new(MockSession::open());
    session.set_state(SessionState::Closed);
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT 1");
    command.set_timeout(Some(5));
    command.execute_non_query(None).await.unwrap_err();

    // The scope armed before the gate ran and still unwound exactly once.
    assert_eq!(timer.arm_calls(), 1);
    assert_eq!(timer.disarm_calls(), 1);
    assert_eq!(timer.armed_len(), 0);
    assert_eq!(session.dispatch_count(), 0);
}

#[tokio::test]
async fn test_disarm_balance_on_dispatch_failure() {
    let session = Arc::new(MockSession::open());
    session.queue_failure("syntax error near 'FORM'");
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT * FORM t");
    command.set_timeout(Some(5));
    let err = command.execute_non_query(None).await.unwrap_err();

    assert!(matches!(err, mysql_command::Error::Execution(_)));
    assert_eq!(timer.arm_calls(), 1);
    assert_eq!(timer.disarm_calls(), 1);
    assert_eq!(timer.armed_len(), 0);
    // The failed dispatch released the active slot.
    assert_eq!(session.active_command(), None);
}

#[tokio::test]
async fn test_infinite_timeout_never_arms() {
    let session = Arc::new(MockSession::open());
    session.queue_ok(1, None);
    let timer = Arc::new(ManualTimerService::new());

    // Command and connection both say "no timeout".
    let mut command = timed_command(&session, &timer, "SELECT 1");
    command.execute_non_query(None).await.unwrap();

    assert_eq!(timer.arm_calls(), 0);
    assert_eq!(timer.disarm_calls(), 0);
}

#[tokio::test]
async fn test_connection_default_timeout_used() {
    let session = Arc::new(MockSession::open());
    session.set_default_timeout(12);
    session.queue_ok(1, None);
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT 1");
    command.execute_non_query(None).await.unwrap();

    assert_eq!(timer.last_armed_after(), Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn test_command_timeout_overrides_default() {
    let session = Arc::new(MockSession::open());
    session.set_default_timeout(30);
    session.queue_ok(1, None);
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT 1");
    command.set_timeout(Some(3));
    command.execute_non_query(None).await.unwrap();

    assert_eq!(timer.last_armed_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_timed_out_flag_resets_on_next_execution() {
    let session = Arc::new(MockSession::open());
    session.queue_hang();
    let timer = Arc::new(ManualTimerService::new());

    let mut command = timed_command(&session, &timer, "SELECT SLEEP(100)");
    command.set_timeout(Some(5));

    let firer = {
        let timer = Arc::clone(&timer);
        tokio::spawn(async move {
            while timer.armed_len() == 0 {
                tokio::task::yield_now().await;
            }
            timer.fire_next();
        })
    };
    command.execute_non_query(None).await.unwrap_err();
    firer.await.unwrap();
    assert!(command.timed_out());

    // A fresh attempt starts with a clean flag.
    session.clear_interrupt();
    session.queue_ok(1, None);
    command.execute_non_query(None).await.unwrap();
    assert!(!command.timed_out());
}

#[tokio::test]
async fn test_dispose_removes_pending_timer() {
    let session = Arc::new(MockSession::open());
    let timer = Arc::new(ManualTimerService::new());

    // Arm a timer through the service on the command's behalf, then
    // dispose mid-flight: the command must not leave it dangling.
    let mut command = timed_command(&session, &timer, "SELECT SLEEP(100)");
    command.set_timeout(Some(5));
    session.queue_hang();

    let mut command_for_task = command;
    let session_for_task = Arc::clone(&session);
    let runner = tokio::spawn(async move {
        let _ = command_for_task.execute_non_query(None).await;
        command_for_task
    });

    while session_for_task.active_command().is_none() {
        tokio::task::yield_now().await;
    }
    assert_eq!(timer.armed_len(), 1);

    // Interrupt the hang so the runner finishes and disarms.
    session.interrupt(0, true);
    let command = runner.await.unwrap();
    drop(command);

    assert_eq!(timer.armed_len(), 0);
    assert_eq!(timer.arm_calls(), timer.disarm_calls());
}
