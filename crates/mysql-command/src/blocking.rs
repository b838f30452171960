//! Driving the execution algorithm under the blocking strategy.
//!
//! The engine is written once as async code; the blocking entry points
//! run that same future to completion on a per-thread current-thread
//! runtime. Timer tasks and token watchers spawned by the cancellation
//! coordinator make progress whenever the main future yields at a
//! suspension point, which is exactly where the blocking strategy
//! performs its waits.

use std::cell::OnceCell;
use std::future::Future;

use crate::error::{Error, Result};

thread_local! {
    static BLOCKING_RUNTIME: OnceCell<tokio::runtime::Runtime> = const { OnceCell::new() };
}

/// Run `future` to completion on this thread.
///
/// # Errors
///
/// Fails with a state error when called from inside an async runtime:
/// blocking a runtime worker thread would dead-lock the very tasks the
/// coordinator relies on. Callers inside a runtime use the async entry
/// points instead.
pub(crate) fn run<F: Future>(future: F) -> Result<F::Output> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::state(
            "blocking entry points cannot be used inside an async runtime; use the async variants",
        ));
    }

    BLOCKING_RUNTIME.with(|cell| {
        if cell.get().is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let _ = cell.set(runtime);
        }
        match cell.get() {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(Error::state("failed to initialize the blocking runtime")),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outside_runtime() {
        let value = run(async { 41 + 1 });
        assert!(matches!(value, Ok(42)));
    }

    #[test]
    fn test_run_reuses_thread_runtime() {
        assert!(run(async { 1 }).is_ok());
        assert!(run(async { 2 }).is_ok());
    }

    #[tokio::test]
    async fn test_run_inside_runtime_is_rejected() {
        let result = run(async { 0 });
        assert!(matches!(result, Err(err) if err.is_state()));
    }
}
