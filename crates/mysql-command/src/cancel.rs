//! Cooperative cancellation and timeout coordination.
//!
//! Every execution attempt can be stopped for three reasons: the caller's
//! cancellation token fired, the command timeout elapsed, or `cancel()`
//! was called explicitly. All three converge on one path,
//! [`CancelState::cancel`], which forwards at most one *relevant*
//! interrupt per signal to the session and counts every attempt, so the
//! session can decide when its side-channel `KILL QUERY` connection needs
//! to be established versus reused.
//!
//! The [`CancelScope`] guard wraps one dispatch-and-read sequence: it
//! arms the timeout timer and registers the token watcher on entry, and
//! its `Drop` unconditionally disarms both, so no timer or registration
//! can outlive the execution that created it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::session::{CommandId, Session};
use crate::timer::{TimerHandle, TimerService};

/// Shared cancellation state for one command.
///
/// Created once per command and shared (via `Arc`) with the timer
/// callback, the token watcher, and any [`CancelHandle`]s, it is the
/// stable cancellation delegate: registering the token repeatedly never
/// allocates a new one.
pub(crate) struct CancelState {
    command_id: CommandId,
    /// Set only by the timeout path, read after a failure surfaces to
    /// distinguish "timed out" from "cancelled by caller".
    timed_out: AtomicBool,
    disposed: AtomicBool,
    /// Number of cancellation signals forwarded for this command.
    attempts: AtomicU32,
    /// The command's currently bound session, if any. Weak: the cancel
    /// paths must never keep a closed session alive.
    session: Mutex<Option<Weak<dyn Session>>>,
    /// Handle of the armed timeout timer, while one is armed.
    timer_slot: Mutex<Option<TimerHandle>>,
}

impl CancelState {
    pub(crate) fn new(command_id: CommandId) -> Self {
        Self {
            command_id,
            timed_out: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            session: Mutex::new(None),
            timer_slot: Mutex::new(None),
        }
    }

    pub(crate) fn bind_session(&self, session: Option<&Arc<dyn Session>>) {
        *self.session.lock() = session.map(Arc::downgrade);
    }

    pub(crate) fn command_id(&self) -> CommandId {
        self.command_id
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Start a fresh execution attempt: the counter and the timed-out
    /// flag describe one execution, not the command's whole life.
    pub(crate) fn reset_for_execution(&self) {
        self.timed_out.store(false, Ordering::Release);
        self.attempts.store(0, Ordering::Release);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark disposed; returns `true` on the first call only.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn store_timer(&self, handle: TimerHandle) {
        *self.timer_slot.lock() = Some(handle);
    }

    pub(crate) fn take_timer(&self) -> Option<TimerHandle> {
        self.timer_slot.lock().take()
    }

    /// The single cancellation path.
    ///
    /// Counts the attempt, then forwards an interrupt to the session
    /// only if this command is still the connection's active
    /// command. A late signal for a completed or superseded command is a
    /// no-op. Never panics and never errors, no matter how often or from
    /// which thread it is called.
    pub(crate) fn cancel(&self, via_timeout: bool) {
        if self.is_disposed() {
            return;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;

        let session = match self.session.lock().as_ref().and_then(Weak::upgrade) {
            Some(session) => session,
            None => return,
        };

        if session.active_command() != Some(self.command_id) {
            tracing::trace!(
                command_id = self.command_id,
                via_timeout,
                "ignoring cancellation for inactive command"
            );
            return;
        }

        if via_timeout {
            // Must be visible before the interrupt can surface an error,
            // so classification sees the flag.
            self.timed_out.store(true, Ordering::Release);
        }

        tracing::debug!(
            command_id = self.command_id,
            attempt,
            via_timeout,
            "forwarding interrupt to session"
        );
        session.interrupt(self.command_id, attempt == 1);
    }

    /// Reclassify a surfaced failure after cancellation.
    ///
    /// A cancellation delivered because the timer fired surfaces as
    /// [`Error::CommandTimeout`]; one delivered by the caller's token or
    /// an explicit `cancel()` stays [`Error::Cancelled`]. All other
    /// errors propagate unchanged.
    pub(crate) fn classify(&self, err: Error) -> Error {
        match err {
            Error::Cancelled if self.timed_out() => Error::CommandTimeout,
            err => err,
        }
    }
}

/// Clonable handle for cancelling a command from another task or thread.
///
/// Obtained from [`Command::cancel_handle`](crate::command::Command::cancel_handle).
/// Calling [`cancel`](Self::cancel) is idempotent: repeated calls are
/// counted and coalesced into at most one observable cancellation outcome
/// per execution.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub(crate) fn new(state: Arc<CancelState>) -> Self {
        Self { state }
    }

    /// Request cancellation of the command's in-flight execution.
    ///
    /// Safe to call before, during, or after execution; a cancellation
    /// for a command that is not currently active is a no-op.
    pub fn cancel(&self) {
        self.state.cancel(false);
    }

    /// Number of cancellation signals sent so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state.attempts()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("command_id", &self.state.command_id())
            .field("attempts", &self.state.attempts())
            .finish()
    }
}

/// Revocable registration of a caller's cancellation token.
///
/// `None` watcher means the registration is inert: no token was supplied,
/// so nothing was allocated or spawned.
struct TokenRegistration {
    watcher: Option<tokio::task::AbortHandle>,
}

impl TokenRegistration {
    fn register(state: &Arc<CancelState>, token: Option<&CancellationToken>) -> Self {
        let Some(token) = token else {
            return Self { watcher: None };
        };

        if token.is_cancelled() {
            // Already fired: take the cancel path now, nothing to watch.
            state.cancel(false);
            return Self { watcher: None };
        }

        let state = Arc::clone(state);
        let token = token.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            state.cancel(false);
        });
        Self {
            watcher: Some(task.abort_handle()),
        }
    }

    /// Revoke the registration. Safe to call multiple times.
    fn revoke(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for TokenRegistration {
    fn drop(&mut self) {
        self.revoke();
    }
}

/// Scope guard wrapping one execution attempt.
///
/// Entering the scope resets the timed-out flag, registers the caller's
/// token, and arms the timeout timer (replacing any previously armed
/// timer for this command). [`disarm`](Self::disarm), run at the latest
/// by `Drop`, removes the timer and revokes the token registration on
/// every exit path, before control returns to the caller.
pub(crate) struct CancelScope {
    state: Arc<CancelState>,
    timer: Arc<dyn TimerService>,
    registration: TokenRegistration,
    disarmed: bool,
}

impl CancelScope {
    pub(crate) fn enter(
        state: &Arc<CancelState>,
        timer: &Arc<dyn TimerService>,
        token: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Self {
        state.reset_for_execution();
        let registration = TokenRegistration::register(state, token);

        if let Some(after) = timeout {
            if let Some(previous) = state.take_timer() {
                timer.disarm(previous);
            }
            let delegate = Arc::clone(state);
            let handle = timer.arm(after, Box::new(move || delegate.cancel(true)));
            if let Some(handle) = handle {
                state.store_timer(handle);
            }
            tracing::trace!(
                command_id = state.command_id(),
                timeout_ms = after.as_millis() as u64,
                "armed command timeout"
            );
        }

        Self {
            state: Arc::clone(state),
            timer: Arc::clone(timer),
            registration,
            disarmed: false,
        }
    }

    /// Remove the armed timer and revoke the token registration.
    ///
    /// Idempotent; also run by `Drop`, so early returns and unwinds
    /// cannot leak a timer.
    pub(crate) fn disarm(&mut self) {
        if self.disarmed {
            return;
        }
        self.disarmed = true;
        if let Some(handle) = self.state.take_timer() {
            self.timer.disarm(handle);
        }
        self.registration.revoke();
    }
}

impl Drop for CancelScope {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_without_session_is_noop() {
        let state = CancelState::new(1);
        state.cancel(false);
        state.cancel(false);
        assert_eq!(state.attempts(), 2);
        assert!(!state.timed_out());
    }

    #[test]
    fn test_cancel_after_dispose_does_not_count() {
        let state = CancelState::new(1);
        assert!(state.mark_disposed());
        assert!(!state.mark_disposed());
        state.cancel(false);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn test_classify_requires_timed_out_flag() {
        let state = CancelState::new(1);
        assert!(matches!(state.classify(Error::Cancelled), Error::Cancelled));
        state.timed_out.store(true, Ordering::Release);
        assert!(matches!(state.classify(Error::Cancelled), Error::CommandTimeout));
        // Non-cancellation errors propagate unchanged even when timed out.
        assert!(matches!(
            state.classify(Error::Execution("boom".into())),
            Error::Execution(_)
        ));
    }

    #[test]
    fn test_timer_slot_take_is_single_use() {
        let state = CancelState::new(1);
        assert!(state.take_timer().is_none());
    }
}
