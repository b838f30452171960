//! Result reader interface.
//!
//! A [`ResultReader`] is the cursor over one or more result sets produced
//! by a dispatched command. The session implementation produces readers;
//! the execution engine drives their read loop for the non-query and
//! scalar entry points, and hands them to the caller unread for the
//! reader entry point.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::execute::ExecMode;
use crate::value::Value;

/// Cursor over the result sets of an executed command.
///
/// Every network suspension point takes the [`ExecMode`] flag so one
/// reader implementation serves both the blocking and suspending
/// execution strategies.
///
/// A reader returned by `execute_reader` is caller-owned: the connection
/// cannot dispatch another command until [`close`](Self::close) has run,
/// which drains any remaining protocol data and releases the connection's
/// active-command slot.
#[async_trait]
pub trait ResultReader: Send {
    /// Advance to the next row of the current result set.
    ///
    /// Returns `false` when the current result set has no more rows.
    async fn read_next_row(
        &mut self,
        mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<bool>;

    /// Advance to the next result set.
    ///
    /// Returns `false` when there are no more result sets.
    async fn advance_to_next_result(
        &mut self,
        mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<bool>;

    /// Get a column value from the current row.
    ///
    /// # Errors
    ///
    /// Fails if there is no current row or the column index is out of
    /// range.
    fn get_value(&self, column: usize) -> Result<Value>;

    /// Rows affected by the current result set, if it reported a count.
    ///
    /// Row-returning result sets report `None`.
    fn records_affected(&self) -> Option<u64>;

    /// Last-inserted row id reported by the server for this command, if
    /// any.
    fn last_insert_id(&self) -> Option<u64>;

    /// Drain any unread rows and result sets and release the connection's
    /// active-command slot.
    ///
    /// Closing is idempotent. The connection stays unusable for new
    /// commands until this has run.
    async fn close(&mut self, mode: ExecMode) -> Result<()>;
}
