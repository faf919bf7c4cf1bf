use anyhow::Result;
use std::process::ExitCode;

use super::{build_orchestrator, exit_code, print_json_line, Command, RecordStore};
use crate::config::RiderStateConfig;
use crate::lifecycle::RawTransitionRequest;

/// Runs one request through the workflow and prints the outcome JSON
pub struct TransitionCommand {
    pub rider: String,
    pub next_state: String,
    pub config: RiderStateConfig,
}

impl TransitionCommand {
    pub fn new(rider: String, next_state: String, config: RiderStateConfig) -> Self {
        Self {
            rider,
            next_state,
            config,
        }
    }
}

impl Command for TransitionCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let store = RecordStore::open(&self.config.storage).await?;
        let orchestrator = build_orchestrator(&self.config, &store)?;

        let outcome = orchestrator
            .run(RawTransitionRequest::new(&self.rider, &self.next_state))
            .await;
        store.close().await;
        print_json_line(&outcome)?;

        if self.config.observability.metrics_enabled {
            orchestrator.metrics().log_stats();
        }
        Ok(exit_code(outcome.is_success()))
    }
}
