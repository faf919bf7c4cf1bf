use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{build_orchestrator, exit_code, print_json_line, Command, RecordStore};
use crate::config::RiderStateConfig;
use crate::lifecycle::{Orchestrator, TransitionOutcome};
use crate::shutdown::ShutdownSignal;

/// One entry of a batch file; unparseable lines become invalid-input outcomes
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Request(Value),
    Unparseable(String),
}

/// Parse a JSON array of requests, or one request per line
pub fn parse_batch(content: &str) -> Result<Vec<BatchEntry>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let requests: Vec<Value> =
            serde_json::from_str(trimmed).context("batch file is not a valid JSON array")?;
        return Ok(requests.into_iter().map(BatchEntry::Request).collect());
    }

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match serde_json::from_str(line) {
            Ok(value) => BatchEntry::Request(value),
            Err(e) => BatchEntry::Unparseable(format!("malformed request: {e}")),
        })
        .collect())
}

/// Runs many requests concurrently, bounded by `workflow.max_concurrency`
pub struct BatchCommand {
    pub input: PathBuf,
    pub config: RiderStateConfig,
    pub shutdown: ShutdownSignal,
}

impl BatchCommand {
    pub fn new(input: PathBuf, config: RiderStateConfig) -> Self {
        Self {
            input,
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Outcomes in input order; requests not dispatched before shutdown are omitted
    pub async fn run_entries(
        &self,
        orchestrator: &Orchestrator,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<TransitionOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.workflow.max_concurrency));
        let mut tasks = JoinSet::new();
        let total = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            // Shutdown wins over a permit that frees up at the same time
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    warn!(
                        dispatched = index,
                        skipped = total - index,
                        "Shutdown requested, not dispatching remaining requests"
                    );
                    break;
                }
                permit = semaphore.clone().acquire_owned() => permit?,
            };
            let orchestrator = orchestrator.clone();
            tasks.spawn(async move {
                let outcome = match entry {
                    BatchEntry::Request(value) => orchestrator.run_value(value).await,
                    BatchEntry::Unparseable(reason) => {
                        TransitionOutcome::RejectedInvalidInput {
                            entity_id: None,
                            reason,
                        }
                    }
                };
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined?);
        }
        outcomes.sort_by_key(|(index, _)| *index);

        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

impl Command for BatchCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let content = tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Failed to read {}", self.input.display()))?;
        let entries = parse_batch(&content)?;
        let total = entries.len();

        let store = RecordStore::open(&self.config.storage).await?;
        let orchestrator = build_orchestrator(&self.config, &store)?;
        let outcomes = self.run_entries(&orchestrator, entries).await;
        store.close().await;
        let outcomes = outcomes?;

        for outcome in &outcomes {
            print_json_line(outcome)?;
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            total,
            processed = outcomes.len(),
            succeeded,
            "Batch finished"
        );
        if self.config.observability.metrics_enabled {
            orchestrator.metrics().log_stats();
        }

        Ok(exit_code(outcomes.len() == total && succeeded == total))
    }
}
