//! The dual-mode execution engine.
//!
//! One algorithm serves both execution strategies: every suspension point
//! (dispatch, row reads, result-set advances) receives the [`ExecMode`]
//! flag, so the blocking and suspending paths share identical state
//! transitions and error semantics. The blocking entry points drive the
//! same future to completion on a dedicated current-thread runtime.
//!
//! Algorithm, shared by every entry point:
//!
//! 1. Resolve the effective timeout from the command and the connection
//!    default.
//! 2. Enter the cancellation scope: register the caller's token, arm the
//!    timeout timer.
//! 3. Run the execution gate; a failure skips dispatch entirely.
//! 4. Claim the connection's active-command slot and dispatch, obtaining
//!    a result reader.
//! 5. Shape-dependent: hand the reader to the caller unread, drain it
//!    for an affected-row count, or read the first value and drain the
//!    rest.
//! 6. On every path the scope disarms before control returns.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::behavior::CommandBehavior;
use crate::cancel::CancelScope;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::gate;
use crate::reader::ResultReader;
use crate::session::CommandPayload;
use crate::value::Value;

/// Execution strategy selector.
///
/// Passed through every step of the algorithm so there is exactly one
/// implementation, not two. Session implementations perform blocking
/// socket waits under [`Blocking`](Self::Blocking) and suspend under
/// [`Async`](Self::Async); the logical operation is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Block the calling thread at each network wait point.
    Blocking,
    /// Suspend at each network wait point without occupying a thread.
    Async,
}

impl ExecMode {
    /// Check if this is the blocking strategy.
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// Requested result shape of one execution entry point.
#[derive(Debug, Clone, Copy)]
enum ResultShape {
    Reader,
    NonQuery,
    Scalar,
}

/// Shape-tagged execution result.
enum ExecOutcome {
    Reader(Box<dyn ResultReader>),
    NonQuery(u64),
    Scalar(Option<Value>),
}

impl ExecOutcome {
    fn into_non_query(self) -> Result<u64> {
        match self {
            Self::NonQuery(count) => Ok(count),
            _ => Err(Error::Protocol("unexpected result shape".into())),
        }
    }

    fn into_scalar(self) -> Result<Option<Value>> {
        match self {
            Self::Scalar(value) => Ok(value),
            _ => Err(Error::Protocol("unexpected result shape".into())),
        }
    }

    fn into_reader(self) -> Result<Box<dyn ResultReader>> {
        match self {
            Self::Reader(reader) => Ok(reader),
            _ => Err(Error::Protocol("unexpected result shape".into())),
        }
    }
}

/// Resolve the effective timeout.
///
/// A command timeout of `None` or `0` defers to the connection default;
/// a resolved value of `0` is the infinite sentinel (no timer armed).
/// Seconds are capped so the armed millisecond value fits a signed
/// 32-bit platform timer.
pub(crate) fn resolve_timeout(command_timeout: Option<u32>, default_timeout: u32) -> Option<Duration> {
    let secs = command_timeout.filter(|t| *t != 0).unwrap_or(default_timeout);
    if secs == 0 {
        None
    } else {
        let capped = secs.min(i32::MAX as u32 / 1000);
        Some(Duration::from_millis(u64::from(capped) * 1000))
    }
}

impl Command {
    /// Execute the command and return the number of affected rows.
    ///
    /// All rows of all result sets are read and discarded. The returned
    /// count is the sum of the affected-row counts reported by each
    /// result set over the full drain; row-returning result sets
    /// contribute zero.
    pub async fn execute_non_query(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<u64> {
        self.execute_shape(ResultShape::NonQuery, self.behavior(), ExecMode::Async, token)
            .await?
            .into_non_query()
    }

    /// Blocking form of [`execute_non_query`](Self::execute_non_query).
    ///
    /// # Errors
    ///
    /// Fails with a state error when called from inside an async runtime.
    pub fn execute_non_query_blocking(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<u64> {
        let behavior = self.behavior();
        crate::blocking::run(self.execute_shape(
            ResultShape::NonQuery,
            behavior,
            ExecMode::Blocking,
            token,
        ))??
        .into_non_query()
    }

    /// Execute the command and return the first column of the first row
    /// of the first result set.
    ///
    /// Returns `None` when the first result set has no rows. Any
    /// remaining rows and result sets are drained so the protocol
    /// session returns to an idle state.
    pub async fn execute_scalar(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<Option<Value>> {
        self.execute_shape(ResultShape::Scalar, self.behavior(), ExecMode::Async, token)
            .await?
            .into_scalar()
    }

    /// Blocking form of [`execute_scalar`](Self::execute_scalar).
    pub fn execute_scalar_blocking(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<Option<Value>> {
        let behavior = self.behavior();
        crate::blocking::run(self.execute_shape(
            ResultShape::Scalar,
            behavior,
            ExecMode::Blocking,
            token,
        ))??
        .into_scalar()
    }

    /// Execute the command and return its result reader without reading
    /// any rows.
    ///
    /// The reader is caller-owned: the connection cannot dispatch
    /// another command until the reader has been closed, which drains
    /// remaining data and releases the connection's active-command slot.
    pub async fn execute_reader(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<Box<dyn ResultReader>> {
        self.execute_reader_with_behavior(self.behavior(), token).await
    }

    /// Execute with explicit result-shape behavior flags.
    pub async fn execute_reader_with_behavior(
        &mut self,
        behavior: CommandBehavior,
        token: Option<&CancellationToken>,
    ) -> Result<Box<dyn ResultReader>> {
        self.execute_shape(ResultShape::Reader, behavior, ExecMode::Async, token)
            .await?
            .into_reader()
    }

    /// Blocking form of [`execute_reader`](Self::execute_reader).
    ///
    /// The returned reader must still be driven with
    /// [`ExecMode::Blocking`] through a blocking context.
    pub fn execute_reader_blocking(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<Box<dyn ResultReader>> {
        let behavior = self.behavior();
        crate::blocking::run(self.execute_shape(
            ResultShape::Reader,
            behavior,
            ExecMode::Blocking,
            token,
        ))??
        .into_reader()
    }

    /// The single execution algorithm, shared by all shapes and both
    /// execution strategies.
    async fn execute_shape(
        &mut self,
        shape: ResultShape,
        behavior: CommandBehavior,
        mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<ExecOutcome> {
        let timeout = self
            .session()
            .and_then(|session| resolve_timeout(self.timeout(), session.default_timeout()));

        let mut scope = CancelScope::enter(self.cancel_state(), self.timer_service(), token, timeout);
        let result = self.dispatch_and_read(shape, behavior, mode, token).await;
        scope.disarm();

        result.map_err(|err| self.cancel_state().classify(err))
    }

    async fn dispatch_and_read(
        &mut self,
        shape: ResultShape,
        behavior: CommandBehavior,
        mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<ExecOutcome> {
        let session = gate::validate_executable(self, false)?;

        if !session.claim_active_command(self.id()) {
            return Err(Error::state(
                "another command is already executing on this connection",
            ));
        }

        tracing::debug!(
            command_id = self.id(),
            text = self.text(),
            mode = ?mode,
            shape = ?shape,
            "dispatching command"
        );

        let prepared = session
            .try_get_prepared(self.text())
            .map(|statement| statement.handle());
        let payload = CommandPayload {
            command_id: self.id(),
            text: self.text(),
            kind: self.kind(),
            params: self.params().as_slice(),
            prepared,
        };

        let mut reader = match session.dispatch(payload, behavior, mode, token.cloned()).await {
            Ok(reader) => reader,
            Err(err) => {
                session.release_active_command(self.id());
                return Err(err);
            }
        };

        match shape {
            ResultShape::Reader => Ok(ExecOutcome::Reader(reader)),
            ResultShape::NonQuery => {
                let drained = drain_all(reader.as_mut(), mode, token).await;
                let closed = reader.close(mode).await;
                let affected = drained?;
                closed?;
                self.set_last_insert_id(reader.last_insert_id());
                Ok(ExecOutcome::NonQuery(affected))
            }
            ResultShape::Scalar => {
                let first = read_first_value(reader.as_mut(), mode, token).await;
                let closed = reader.close(mode).await;
                let value = first?;
                closed?;
                self.set_last_insert_id(reader.last_insert_id());
                Ok(ExecOutcome::Scalar(value))
            }
        }
    }
}

/// Drain all rows of all result sets, summing affected-row counts.
async fn drain_all(
    reader: &mut dyn ResultReader,
    mode: ExecMode,
    token: Option<&CancellationToken>,
) -> Result<u64> {
    let mut total = 0u64;
    loop {
        while reader.read_next_row(mode, token).await? {}
        total = total.saturating_add(reader.records_affected().unwrap_or(0));
        if !reader.advance_to_next_result(mode, token).await? {
            break;
        }
    }
    Ok(total)
}

/// Read the first column of the first row, if one exists.
///
/// The caller drains the remainder through `close`.
async fn read_first_value(
    reader: &mut dyn ResultReader,
    mode: ExecMode,
    token: Option<&CancellationToken>,
) -> Result<Option<Value>> {
    if reader.read_next_row(mode, token).await? {
        Ok(Some(reader.get_value(0)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_timeout_command_wins() {
        assert_eq!(
            resolve_timeout(Some(10), 30),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_resolve_timeout_defers_to_default() {
        assert_eq!(resolve_timeout(None, 30), Some(Duration::from_secs(30)));
        assert_eq!(resolve_timeout(Some(0), 30), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_resolve_timeout_infinite_sentinel() {
        assert_eq!(resolve_timeout(None, 0), None);
        assert_eq!(resolve_timeout(Some(0), 0), None);
    }

    #[test]
    fn test_resolve_timeout_caps_milliseconds() {
        let capped = resolve_timeout(Some(u32::MAX), 0);
        assert_eq!(
            capped,
            Some(Duration::from_millis(u64::from(i32::MAX as u32 / 1000) * 1000))
        );
    }

    #[test]
    fn test_exec_mode_flags() {
        assert!(ExecMode::Blocking.is_blocking());
        assert!(!ExecMode::Async.is_blocking());
    }
}
