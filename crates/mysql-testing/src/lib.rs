//! # mysql-testing
//!
//! Test infrastructure for command-core development.
//!
//! This crate provides a scriptable in-memory [`MockSession`], a
//! [`ManualTimerService`] with test-controlled firing, and scripted
//! result readers: everything needed to exercise the command lifecycle,
//! cancellation, and timeout behavior without a server. The integration
//! suites for the command core live in this crate's `tests/` directory
//! to avoid a circular dev-dependency on `mysql-command`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mysql_command::{Command, Session};
//! use mysql_testing::{MockSession, ScriptedResultSet};
//!
//! #[tokio::test]
//! async fn test_sums_affected_rows() {
//!     let session = Arc::new(MockSession::open());
//!     session.queue_result_sets(vec![
//!         ScriptedResultSet::affected(3),
//!         ScriptedResultSet::affected(5),
//!     ]);
//!
//!     let mut command =
//!         Command::with_session("UPDATE t SET x = 1; UPDATE u SET y = 2", session.clone());
//!     assert_eq!(command.execute_non_query(None).await.unwrap(), 8);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod manual_timer;
pub mod mock_session;

pub use manual_timer::ManualTimerService;
pub use mock_session::{DispatchRecord, InterruptRecord, MockSession, ScriptedResultSet};
