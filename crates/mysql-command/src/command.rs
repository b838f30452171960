//! The command entity: a bound, parameterized unit of work.
//!
//! A [`Command`] holds statement text, parameters, a timeout, and the
//! session it is bound to. Execution entry points live in the execution
//! engine module; preparation in the prepare module. The command itself
//! enforces the lifecycle rules: text and session cannot change while the
//! command is the connection's active command, and a disposed command
//! rejects everything.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::behavior::{CommandBehavior, CommandKind};
use crate::cancel::{CancelHandle, CancelState};
use crate::error::{Error, Result};
use crate::param::Params;
use crate::session::{CommandId, Session, TransactionId};
use crate::timer::TimerService;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

fn next_command_id() -> CommandId {
    NEXT_COMMAND_ID.fetch_add(1, Ordering::AcqRel)
}

/// A parameterized unit of work bound to at most one logical connection.
///
/// # Example
///
/// ```rust,ignore
/// use mysql_command::{Command, Param};
///
/// let mut command = Command::with_session("SELECT name FROM users WHERE id = ?", session);
/// command.params_mut().push_value(42i64);
/// command.set_timeout(Some(30));
///
/// let value = command.execute_scalar(None).await?;
/// ```
pub struct Command {
    id: CommandId,
    text: String,
    kind: CommandKind,
    /// Timeout in whole seconds. `None` or `Some(0)` defers to the
    /// connection default; a resolved value of zero means no timeout.
    timeout: Option<u32>,
    params: Params,
    behavior: CommandBehavior,
    session: Option<Arc<dyn Session>>,
    transaction: Option<TransactionId>,
    last_insert_id: Option<u64>,
    timer: Arc<dyn TimerService>,
    cancel: Arc<CancelState>,
}

impl Command {
    /// Create a command with the given text and no bound session.
    pub fn new(text: impl Into<String>) -> Self {
        let id = next_command_id();
        Self {
            id,
            text: text.into(),
            kind: CommandKind::Text,
            timeout: None,
            params: Params::new(),
            behavior: CommandBehavior::DEFAULT,
            session: None,
            transaction: None,
            last_insert_id: None,
            timer: crate::timer::default_service(),
            cancel: Arc::new(CancelState::new(id)),
        }
    }

    /// Create a command bound to a session.
    pub fn with_session(text: impl Into<String>, session: Arc<dyn Session>) -> Self {
        let mut command = Self::new(text);
        command.cancel.bind_session(Some(&session));
        command.session = Some(session);
        command
    }

    /// Substitute the timer service used for command timeouts.
    ///
    /// The process-wide tokio timer is used by default; tests inject a
    /// manual timer here.
    #[must_use]
    pub fn with_timer_service(mut self, timer: Arc<dyn TimerService>) -> Self {
        self.timer = timer;
        self
    }

    /// Process-unique id of this command.
    #[must_use]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// The command text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the command text.
    ///
    /// # Errors
    ///
    /// Fails with a state error if the command is disposed or is
    /// currently the connection's active command.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.text = text.into();
        Ok(())
    }

    /// The command kind.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Set the command kind.
    pub fn set_kind(&mut self, kind: CommandKind) {
        self.kind = kind;
    }

    /// The command timeout in whole seconds.
    ///
    /// `None` (or an explicit `0`) defers to the connection default.
    #[must_use]
    pub fn timeout(&self) -> Option<u32> {
        self.timeout
    }

    /// Set the command timeout in whole seconds.
    pub fn set_timeout(&mut self, timeout: Option<u32>) {
        self.timeout = timeout;
    }

    /// The requested result-shape behavior.
    #[must_use]
    pub fn behavior(&self) -> CommandBehavior {
        self.behavior
    }

    /// Set the requested result-shape behavior.
    pub fn set_behavior(&mut self, behavior: CommandBehavior) {
        self.behavior = behavior;
    }

    /// The command's parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mutable access to the command's parameters.
    ///
    /// Parameters stay mutable until execution begins.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// The bound session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Bind or unbind the session.
    ///
    /// # Errors
    ///
    /// Fails with a state error if the command is disposed or is
    /// currently the connection's active command.
    pub fn set_session(&mut self, session: Option<Arc<dyn Session>>) -> Result<()> {
        self.ensure_mutable()?;
        self.cancel.bind_session(session.as_ref());
        self.session = session;
        Ok(())
    }

    /// The transaction this command is associated with, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Associate the command with a transaction.
    pub fn set_transaction(&mut self, transaction: Option<TransactionId>) {
        self.transaction = transaction;
    }

    /// Last-inserted row id from the most recent successful execution.
    #[must_use]
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    pub(crate) fn set_last_insert_id(&mut self, id: Option<u64>) {
        self.last_insert_id = id;
    }

    /// Request cancellation of the in-flight execution.
    ///
    /// Safe to call from any context, any number of times, before,
    /// during, or after execution. Signals for a command that is not
    /// currently active are counted but otherwise ignored.
    pub fn cancel(&self) {
        self.cancel.cancel(false);
    }

    /// Get a clonable handle for cancelling this command from another
    /// task or thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.cancel))
    }

    /// Whether the most recent execution failed because the command
    /// timeout elapsed.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.cancel.timed_out()
    }

    /// Number of cancellation signals sent since the last execution
    /// attempt began.
    #[must_use]
    pub fn cancel_attempts(&self) -> u32 {
        self.cancel.attempts()
    }

    /// Check if the command has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_disposed()
    }

    /// Dispose the command.
    ///
    /// Idempotent. An in-flight execution is interrupted rather than
    /// orphaned, and any armed timeout timer is removed; all further
    /// operations fail with [`Error::Disposed`].
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Some(session) = &self.session {
            if session.active_command() == Some(self.id) {
                self.cancel.cancel(false);
            }
        }
        if self.cancel.mark_disposed() {
            if let Some(handle) = self.cancel.take_timer() {
                self.timer.disarm(handle);
            }
            tracing::trace!(command_id = self.id, "command disposed");
        }
    }

    pub(crate) fn cancel_state(&self) -> &Arc<CancelState> {
        &self.cancel
    }

    pub(crate) fn timer_service(&self) -> &Arc<dyn TimerService> {
        &self.timer
    }

    /// Check that text/session mutation is currently allowed.
    fn ensure_mutable(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if let Some(session) = &self.session {
            if session.active_command() == Some(self.id) {
                return Err(Error::state(
                    "command cannot be modified while it is executing",
                ));
            }
        }
        Ok(())
    }
}

impl Clone for Command {
    /// Copy text, session, transaction, timeout, behavior, and a deep
    /// copy of the parameters. The clone gets a fresh id and fresh
    /// cancellation state: it never shares the source's timed-out flag,
    /// attempt counter, or active-execution state.
    fn clone(&self) -> Self {
        let id = next_command_id();
        let cancel = Arc::new(CancelState::new(id));
        cancel.bind_session(self.session.as_ref());
        Self {
            id,
            text: self.text.clone(),
            kind: self.kind,
            timeout: self.timeout,
            params: self.params.clone(),
            behavior: self.behavior,
            session: self.session.clone(),
            transaction: self.transaction,
            last_insert_id: None,
            timer: Arc::clone(&self.timer),
            cancel,
        }
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        // Disposal on drop keeps a forgotten command from leaking its
        // armed timer.
        self.dispose();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("params", &self.params.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Command::new("SELECT 1");
        let b = Command::new("SELECT 1");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clone_gets_fresh_id_and_state() {
        let mut original = Command::new("SELECT ?");
        original.params_mut().push_value(1i64);
        original.set_timeout(Some(15));

        let clone = original.clone();
        assert_ne!(clone.id(), original.id());
        assert_eq!(clone.text(), original.text());
        assert_eq!(clone.timeout(), Some(15));
        assert_eq!(clone.params().len(), 1);
        assert_eq!(clone.cancel_attempts(), 0);
        assert!(!clone.is_disposed());
    }

    #[test]
    fn test_clone_params_do_not_alias() {
        let mut original = Command::new("SELECT ?");
        original.params_mut().push_value("before");

        let mut clone = original.clone();
        clone.params_mut().clear();
        clone.params_mut().push_value("after");

        assert_eq!(
            original.params().get(0).and_then(|p| p.value().as_str()),
            Some("before")
        );
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut command = Command::new("SELECT 1");
        command.dispose();
        command.dispose();
        assert!(command.is_disposed());
        assert!(matches!(command.set_text("SELECT 2"), Err(Error::Disposed)));
        assert!(matches!(command.set_session(None), Err(Error::Disposed)));
    }

    #[test]
    fn test_cancel_before_execution_is_noop() {
        let command = Command::new("SELECT 1");
        command.cancel();
        command.cancel();
        assert_eq!(command.cancel_attempts(), 2);
        assert!(!command.timed_out());
    }

    #[test]
    fn test_defaults() {
        let command = Command::new("");
        assert_eq!(command.kind(), CommandKind::Text);
        assert_eq!(command.timeout(), None);
        assert_eq!(command.behavior(), CommandBehavior::DEFAULT);
        assert!(command.session().is_none());
        assert!(command.transaction().is_none());
        assert!(command.last_insert_id().is_none());
    }
}
