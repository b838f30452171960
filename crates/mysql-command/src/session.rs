//! Session interface and connection state.
//!
//! A session owns the network connection and protocol state for exactly
//! one logical connection. The execution core drives it through this
//! trait and never touches the wire itself.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::behavior::{CommandBehavior, CommandKind};
use crate::error::Result;
use crate::execute::ExecMode;
use crate::param::Param;
use crate::reader::ResultReader;
use crate::statement_cache::PreparedStatement;

/// Process-unique command identifier.
pub type CommandId = u64;

/// Opaque transaction identifier assigned by the connection layer.
pub type TransactionId = u64;

/// Connection state as seen by the execution gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection is established and ready for commands.
    Open,
    /// Connection handshake is in progress.
    Connecting,
    /// Connection has been closed.
    Closed,
    /// Connection is in a broken state and must be discarded.
    Failed,
}

impl SessionState {
    /// Check if commands may execute in this state.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if preparation paths may run in this state.
    ///
    /// Preparation is also allowed while the handshake is still in
    /// flight, so drivers can pre-prepare statements during connect.
    #[must_use]
    pub fn accepts_prepare(&self) -> bool {
        matches!(self, Self::Open | Self::Connecting)
    }
}

/// The payload handed to [`Session::dispatch`] for one execution.
#[derive(Debug, Clone, Copy)]
pub struct CommandPayload<'a> {
    /// Id of the dispatching command.
    pub command_id: CommandId,
    /// Statement text or stored-procedure name.
    pub text: &'a str,
    /// Command kind.
    pub kind: CommandKind,
    /// Ordered parameters.
    pub params: &'a [Param],
    /// Server-side prepared-statement handle, when one is cached for this
    /// exact text.
    pub prepared: Option<u32>,
}

/// Protocol/connection-state owner for one logical connection.
///
/// `#[async_trait]` is used for object safety: commands hold the session
/// as `Arc<dyn Session>`.
///
/// # Exclusivity
///
/// A session permits at most one active command at a time, recorded in
/// its active-command slot. Claiming the slot before dispatch substitutes
/// for a lock around the wire: the core performs no locking of its own.
#[async_trait]
pub trait Session: Send + Sync {
    /// Current connection state.
    fn state(&self) -> SessionState;

    /// Default command timeout in whole seconds; `0` means no timeout.
    fn default_timeout(&self) -> u32;

    /// The connection's currently active transaction, if any.
    fn current_transaction(&self) -> Option<TransactionId>;

    /// Whether this connection is configured to ignore command/connection
    /// transaction mismatches.
    fn ignore_transaction_scope(&self) -> bool {
        false
    }

    /// Whether this connection is configured to skip server-side
    /// preparation entirely.
    fn ignore_prepare(&self) -> bool {
        false
    }

    /// Id of the command currently permitted to execute, if any.
    fn active_command(&self) -> Option<CommandId>;

    /// Record `id` as the active command.
    ///
    /// Returns `false` if another command already holds the slot.
    fn claim_active_command(&self, id: CommandId) -> bool;

    /// Release the active-command slot if `id` holds it.
    fn release_active_command(&self, id: CommandId);

    /// Look up a cached prepared statement by exact text.
    fn try_get_prepared(&self, text: &str) -> Option<PreparedStatement>;

    /// Cache a prepared statement keyed by its exact text.
    fn cache_prepared(&self, statement: PreparedStatement);

    /// Send the command payload to the server and produce a reader over
    /// its results.
    async fn dispatch(
        &self,
        payload: CommandPayload<'_>,
        behavior: CommandBehavior,
        mode: ExecMode,
        token: Option<CancellationToken>,
    ) -> Result<Box<dyn ResultReader>>;

    /// Perform the prepare round-trip for `text` and return the
    /// server-assigned statement handle.
    async fn prepare_statement(
        &self,
        text: &str,
        kind: CommandKind,
        mode: ExecMode,
    ) -> Result<PreparedStatement>;

    /// Physically interrupt the in-flight operation of command `id`.
    ///
    /// The first attempt may require the session to establish its
    /// side-channel cancellation connection (`KILL QUERY` travels on a
    /// second connection); subsequent attempts reuse it. Must be safe to
    /// call from any thread, any number of times, including for commands
    /// that already completed.
    fn interrupt(&self, id: CommandId, first_attempt: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_open() {
        assert!(SessionState::Open.is_open());
        assert!(!SessionState::Connecting.is_open());
        assert!(!SessionState::Closed.is_open());
    }

    #[test]
    fn test_session_state_accepts_prepare() {
        assert!(SessionState::Open.accepts_prepare());
        assert!(SessionState::Connecting.accepts_prepare());
        assert!(!SessionState::Closed.accepts_prepare());
        assert!(!SessionState::Failed.accepts_prepare());
    }
}
