//! Execution preconditions.
//!
//! The gate validates a command before any network activity is allowed.
//! Checks run in a fixed order and short-circuit on the first failure;
//! the gate performs no I/O and has no side effects.

use std::sync::Arc;

use crate::behavior::CommandKind;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::session::{Session, SessionState};

/// Outcome of the preparation-specific validation.
pub(crate) enum PrepareDecision {
    /// Preparation is unnecessary: the statement is already prepared, or
    /// the connection is configured to skip preparation. The call is a
    /// no-op success.
    Skip,
    /// Preparation should proceed against this session.
    Proceed(Arc<dyn Session>),
}

/// Validate that `command` may execute.
///
/// Check order: disposed, bound connection, connection state (`Open`, or
/// also `Connecting` when `allow_connecting`), transaction match, then
/// non-empty text.
pub(crate) fn validate_executable(
    command: &Command,
    allow_connecting: bool,
) -> Result<Arc<dyn Session>> {
    if command.is_disposed() {
        return Err(Error::Disposed);
    }

    let session = command
        .session()
        .cloned()
        .ok_or_else(|| Error::state("command has no bound connection"))?;

    let state = session.state();
    let state_ok = match state {
        SessionState::Open => true,
        SessionState::Connecting => allow_connecting,
        SessionState::Closed | SessionState::Failed => false,
    };
    if !state_ok {
        return Err(Error::state(format!(
            "connection is not open (state: {state:?})"
        )));
    }

    if !session.ignore_transaction_scope()
        && command.transaction() != session.current_transaction()
    {
        return Err(Error::state(
            "the command's transaction does not match the connection's active transaction",
        ));
    }

    if command.text().trim().is_empty() {
        return Err(Error::state("command text must not be empty"));
    }

    Ok(session)
}

/// Validate that `command` may be prepared.
///
/// Runs the executable checks (allowing the `Connecting` state), then
/// rejects non-text command kinds, and short-circuits to a no-op when the
/// connection skips preparation or an identical statement is already
/// cached.
pub(crate) fn validate_preparable(command: &Command) -> Result<PrepareDecision> {
    let session = validate_executable(command, true)?;

    if command.kind() != CommandKind::Text {
        return Err(Error::state("only text commands can be prepared"));
    }

    if session.ignore_prepare() {
        return Ok(PrepareDecision::Skip);
    }

    if session.try_get_prepared(command.text()).is_some() {
        return Ok(PrepareDecision::Skip);
    }

    Ok(PrepareDecision::Proceed(session))
}
