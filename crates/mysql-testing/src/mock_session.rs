//! Scriptable in-memory session.
//!
//! [`MockSession`] implements the command core's `Session` trait without
//! a server. Tests queue scripted dispatch outcomes (result sets, a
//! failure, or a hang that lasts until interrupted), then assert on the
//! recorded dispatches and interrupts afterwards.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use mysql_command::{
    CommandBehavior, CommandId, CommandKind, CommandPayload, Error, ExecMode, PreparedStatement,
    Result, ResultReader, Session, SessionState, StatementCache, TransactionId, Value,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One scripted result set.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResultSet {
    /// Rows of this result set, outermost first.
    pub rows: Vec<Vec<Value>>,
    /// Affected-row count this result set reports, if any.
    pub records_affected: Option<u64>,
}

impl ScriptedResultSet {
    /// A row-returning result set (reports no affected count).
    #[must_use]
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            records_affected: None,
        }
    }

    /// A rowless result set reporting an affected count.
    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self {
            rows: Vec::new(),
            records_affected: Some(count),
        }
    }
}

/// A scripted outcome for one dispatch.
enum ScriptedDispatch {
    /// Produce a reader over the given result sets.
    Results {
        sets: Vec<ScriptedResultSet>,
        last_insert_id: Option<u64>,
    },
    /// Fail the dispatch.
    Fail(String),
    /// Pend until the session is interrupted or the token fires.
    Hang,
}

impl Default for ScriptedDispatch {
    fn default() -> Self {
        Self::Results {
            sets: vec![ScriptedResultSet::affected(0)],
            last_insert_id: None,
        }
    }
}

/// Record of one dispatch observed by the session.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    /// Statement text that was dispatched.
    pub text: String,
    /// Prepared-statement handle carried by the payload, if any.
    pub prepared: Option<u32>,
    /// Execution mode of the dispatch.
    pub mode: ExecMode,
    /// Behavior flags of the dispatch.
    pub behavior: CommandBehavior,
}

/// Record of one interrupt observed by the session.
#[derive(Debug, Clone, Copy)]
pub struct InterruptRecord {
    /// Id of the command the interrupt targeted.
    pub command_id: CommandId,
    /// Whether this was the first cancellation attempt for the command.
    pub first_attempt: bool,
}

/// A scriptable session for driving the command core in tests.
pub struct MockSession {
    state: Mutex<SessionState>,
    default_timeout: AtomicU32,
    current_transaction: Mutex<Option<TransactionId>>,
    ignore_transaction_scope: AtomicBool,
    ignore_prepare: AtomicBool,
    active: Arc<Mutex<Option<CommandId>>>,
    cache: Mutex<StatementCache>,
    scripts: Mutex<VecDeque<ScriptedDispatch>>,
    dispatches: Mutex<Vec<DispatchRecord>>,
    interrupts: Mutex<Vec<InterruptRecord>>,
    interrupted: Arc<AtomicBool>,
    interrupt_notify: Arc<Notify>,
    prepare_calls: AtomicU32,
    next_statement_handle: AtomicU32,
}

impl MockSession {
    /// Create an open session with no default timeout.
    #[must_use]
    pub fn open() -> Self {
        Self {
            state: Mutex::new(SessionState::Open),
            default_timeout: AtomicU32::new(0),
            current_transaction: Mutex::new(None),
            ignore_transaction_scope: AtomicBool::new(false),
            ignore_prepare: AtomicBool::new(false),
            active: Arc::new(Mutex::new(None)),
            cache: Mutex::new(StatementCache::with_default_size()),
            scripts: Mutex::new(VecDeque::new()),
            dispatches: Mutex::new(Vec::new()),
            interrupts: Mutex::new(Vec::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            interrupt_notify: Arc::new(Notify::new()),
            prepare_calls: AtomicU32::new(0),
            next_statement_handle: AtomicU32::new(1),
        }
    }

    /// Set the connection state reported to the gate.
    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Set the default command timeout in seconds.
    pub fn set_default_timeout(&self, seconds: u32) {
        self.default_timeout.store(seconds, Ordering::Release);
    }

    /// Set the connection's current transaction.
    pub fn set_current_transaction(&self, transaction: Option<TransactionId>) {
        *self.current_transaction.lock() = transaction;
    }

    /// Configure the session to ignore transaction mismatches.
    pub fn set_ignore_transaction_scope(&self, ignore: bool) {
        self.ignore_transaction_scope.store(ignore, Ordering::Release);
    }

    /// Configure the session to skip server-side preparation.
    pub fn set_ignore_prepare(&self, ignore: bool) {
        self.ignore_prepare.store(ignore, Ordering::Release);
    }

    /// Queue a dispatch producing the given result sets.
    pub fn queue_result_sets(&self, sets: Vec<ScriptedResultSet>) {
        self.scripts.lock().push_back(ScriptedDispatch::Results {
            sets,
            last_insert_id: None,
        });
    }

    /// Queue a dispatch producing rows in a single result set.
    pub fn queue_rows(&self, rows: Vec<Vec<Value>>) {
        self.queue_result_sets(vec![ScriptedResultSet::rows(rows)]);
    }

    /// Queue a rowless OK dispatch with an affected count and optional
    /// last-insert id.
    pub fn queue_ok(&self, affected: u64, last_insert_id: Option<u64>) {
        self.scripts.lock().push_back(ScriptedDispatch::Results {
            sets: vec![ScriptedResultSet::affected(affected)],
            last_insert_id,
        });
    }

    /// Queue a failing dispatch.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.scripts
            .lock()
            .push_back(ScriptedDispatch::Fail(message.into()));
    }

    /// Queue a dispatch that pends until interrupted or cancelled.
    pub fn queue_hang(&self) {
        self.scripts.lock().push_back(ScriptedDispatch::Hang);
    }

    /// Number of dispatches observed.
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().len()
    }

    /// All observed dispatches.
    #[must_use]
    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.dispatches.lock().clone()
    }

    /// All observed interrupts, in order.
    #[must_use]
    pub fn interrupts(&self) -> Vec<InterruptRecord> {
        self.interrupts.lock().clone()
    }

    /// Clear the interrupted flag so the session can serve another
    /// dispatch after a cancelled one.
    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    /// Number of prepare round-trips observed.
    #[must_use]
    pub fn prepare_calls(&self) -> u32 {
        self.prepare_calls.load(Ordering::Acquire)
    }

    /// Handle cached for `text`, without touching LRU order.
    #[must_use]
    pub fn cached_handle(&self, text: &str) -> Option<u32> {
        self.cache.lock().peek(text).map(PreparedStatement::handle)
    }

    async fn hang(&self, token: Option<&CancellationToken>) -> Error {
        loop {
            let notified = self.interrupt_notify.notified();
            if self.interrupted.load(Ordering::Acquire) {
                return Error::Cancelled;
            }
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Error::Cancelled;
            }
            match token {
                Some(token) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = token.cancelled() => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[async_trait]
impl Session for MockSession {
    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn default_timeout(&self) -> u32 {
        self.default_timeout.load(Ordering::Acquire)
    }

    fn current_transaction(&self) -> Option<TransactionId> {
        *self.current_transaction.lock()
    }

    fn ignore_transaction_scope(&self) -> bool {
        self.ignore_transaction_scope.load(Ordering::Acquire)
    }

    fn ignore_prepare(&self) -> bool {
        self.ignore_prepare.load(Ordering::Acquire)
    }

    fn active_command(&self) -> Option<CommandId> {
        *self.active.lock()
    }

    fn claim_active_command(&self, id: CommandId) -> bool {
        let mut slot = self.active.lock();
        match *slot {
            Some(existing) if existing != id => false,
            _ => {
                *slot = Some(id);
                true
            }
        }
    }

    fn release_active_command(&self, id: CommandId) {
        let mut slot = self.active.lock();
        if *slot == Some(id) {
            *slot = None;
        }
    }

    fn try_get_prepared(&self, text: &str) -> Option<PreparedStatement> {
        self.cache.lock().get(text)
    }

    fn cache_prepared(&self, statement: PreparedStatement) {
        self.cache.lock().insert(statement);
    }

    async fn dispatch(
        &self,
        payload: CommandPayload<'_>,
        behavior: CommandBehavior,
        mode: ExecMode,
        token: Option<CancellationToken>,
    ) -> Result<Box<dyn ResultReader>> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        tracing::debug!(
            command_id = payload.command_id,
            text = payload.text,
            mode = ?mode,
            "mock session dispatch"
        );
        self.dispatches.lock().push(DispatchRecord {
            text: payload.text.to_string(),
            prepared: payload.prepared,
            mode,
            behavior,
        });

        if token.as_ref().is_some_and(|token| token.is_cancelled()) {
            return Err(Error::Cancelled);
        }

        match script {
            ScriptedDispatch::Results {
                sets,
                last_insert_id,
            } => Ok(Box::new(MockReader {
                sets,
                set_index: 0,
                row_index: None,
                last_insert_id,
                command_id: payload.command_id,
                active: Arc::clone(&self.active),
                interrupted: Arc::clone(&self.interrupted),
                closed: false,
            })),
            ScriptedDispatch::Fail(message) => Err(Error::Execution(message)),
            ScriptedDispatch::Hang => Err(self.hang(token.as_ref()).await),
        }
    }

    async fn prepare_statement(
        &self,
        text: &str,
        _kind: CommandKind,
        _mode: ExecMode,
    ) -> Result<PreparedStatement> {
        self.prepare_calls.fetch_add(1, Ordering::AcqRel);
        let handle = self.next_statement_handle.fetch_add(1, Ordering::AcqRel);
        let parameter_count = text.matches('?').count().min(usize::from(u16::MAX)) as u16;
        Ok(PreparedStatement::new(handle, text, parameter_count))
    }

    fn interrupt(&self, id: CommandId, first_attempt: bool) {
        tracing::debug!(command_id = id, first_attempt, "mock session interrupted");
        self.interrupts.lock().push(InterruptRecord {
            command_id: id,
            first_attempt,
        });
        self.interrupted.store(true, Ordering::Release);
        self.interrupt_notify.notify_waiters();
    }
}

/// Reader over scripted result sets.
struct MockReader {
    sets: Vec<ScriptedResultSet>,
    set_index: usize,
    /// Index of the current row; `None` before the first read of a set.
    row_index: Option<usize>,
    last_insert_id: Option<u64>,
    command_id: CommandId,
    active: Arc<Mutex<Option<CommandId>>>,
    interrupted: Arc<AtomicBool>,
    closed: bool,
}

impl MockReader {
    fn check_interrupt(&self, token: Option<&CancellationToken>) -> Result<()> {
        if self.interrupted.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl ResultReader for MockReader {
    async fn read_next_row(
        &mut self,
        _mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<bool> {
        self.check_interrupt(token)?;
        let Some(set) = self.sets.get(self.set_index) else {
            return Ok(false);
        };
        let next = self.row_index.map_or(0, |index| index + 1);
        self.row_index = Some(next);
        Ok(next < set.rows.len())
    }

    async fn advance_to_next_result(
        &mut self,
        _mode: ExecMode,
        token: Option<&CancellationToken>,
    ) -> Result<bool> {
        self.check_interrupt(token)?;
        self.set_index += 1;
        self.row_index = None;
        Ok(self.set_index < self.sets.len())
    }

    fn get_value(&self, column: usize) -> Result<Value> {
        let row = self
            .sets
            .get(self.set_index)
            .and_then(|set| self.row_index.and_then(|index| set.rows.get(index)))
            .ok_or_else(|| Error::Execution("no current row".into()))?;
        row.get(column)
            .cloned()
            .ok_or_else(|| Error::Execution(format!("column index {column} out of range")))
    }

    fn records_affected(&self) -> Option<u64> {
        self.sets.get(self.set_index)?.records_affected
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    async fn close(&mut self, _mode: ExecMode) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut slot = self.active.lock();
        if *slot == Some(self.command_id) {
            *slot = None;
        }
        Ok(())
    }
}
