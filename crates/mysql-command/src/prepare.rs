//! Server-side statement preparation.
//!
//! Preparation reuses the execution gate's preparation variant. When the
//! gate decides preparation is unnecessary (an identical statement is
//! already cached, or the connection skips preparation) the call is a
//! no-op success. Otherwise the session performs the prepare round-trip
//! under the requested execution mode and the resulting handle is cached
//! keyed by the exact command text.

use crate::command::Command;
use crate::error::Result;
use crate::execute::ExecMode;
use crate::gate::{self, PrepareDecision};

impl Command {
    /// Prepare the command's text on the server.
    pub async fn prepare(&self) -> Result<()> {
        self.prepare_inner(ExecMode::Async).await
    }

    /// Blocking form of [`prepare`](Self::prepare).
    pub fn prepare_blocking(&self) -> Result<()> {
        crate::blocking::run(self.prepare_inner(ExecMode::Blocking))?
    }

    async fn prepare_inner(&self, mode: ExecMode) -> Result<()> {
        let session = match gate::validate_preparable(self)? {
            PrepareDecision::Skip => {
                tracing::trace!(command_id = self.id(), "preparation unnecessary, skipping");
                return Ok(());
            }
            PrepareDecision::Proceed(session) => session,
        };

        tracing::debug!(
            command_id = self.id(),
            text = self.text(),
            mode = ?mode,
            "preparing statement"
        );

        let statement = session.prepare_statement(self.text(), self.kind(), mode).await?;
        session.cache_prepared(statement);
        Ok(())
    }
}
