//! # mysql-command
//!
//! Command lifecycle and cooperative cancellation core for the
//! rust-mysql-driver project.
//!
//! This crate owns the part of the driver between the user-facing
//! connection API and the wire: the [`Command`] entity, the execution
//! gate that validates preconditions before any network activity, the
//! cancellation/timeout coordinator, and the dual-mode execution engine
//! that serves blocking and suspending callers with a single algorithm.
//! Wire-level encoding, transport, pooling, and type conversion are
//! external collaborators reached through the [`Session`] and
//! [`ResultReader`] traits.
//!
//! ## Features
//!
//! - **One algorithm, two strategies**: every entry point is available
//!   in async and blocking form, parameterized by [`ExecMode`] rather
//!   than duplicated
//! - **Cooperative cancellation**: caller tokens, explicit `cancel()`,
//!   and command timeouts converge on one idempotent interrupt path
//! - **Leak-free timers**: the cancellation scope disarms its timer and
//!   revokes its token registration on every exit path
//! - **Prepared statements**: exact-text LRU caching with a no-op
//!   fast path when a statement is already prepared
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_command::{Command, CommandBehavior};
//! use std::sync::Arc;
//!
//! let mut command = Command::with_session(
//!     "INSERT INTO users (name) VALUES (?)",
//!     Arc::clone(&session),
//! );
//! command.params_mut().push_value("Alice");
//! command.set_timeout(Some(30));
//!
//! // Cancellable from elsewhere while the execution is in flight:
//! let cancel = command.cancel_handle();
//!
//! let affected = command.execute_non_query(None).await?;
//! let id = command.last_insert_id();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod behavior;
mod blocking;
pub mod cancel;
pub mod command;
pub mod error;
pub mod execute;
mod gate;
pub mod param;
mod prepare;
pub mod reader;
pub mod session;
pub mod statement_cache;
pub mod timer;
pub mod value;

// Re-export commonly used types
pub use behavior::{CommandBehavior, CommandKind};
pub use cancel::CancelHandle;
pub use command::Command;
pub use error::{Error, Result};
pub use execute::ExecMode;
pub use param::{Param, Params};
pub use reader::ResultReader;
pub use session::{CommandId, CommandPayload, Session, SessionState, TransactionId};
pub use statement_cache::{PreparedStatement, StatementCache};
pub use timer::{TimerCallback, TimerHandle, TimerService, TokioTimerService};
pub use value::Value;
