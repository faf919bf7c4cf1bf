use anyhow::{anyhow, Context, Result};
use std::process::ExitCode;

use super::{print_json_line, Command, RecordStore};
use crate::config::RiderStateConfig;
use crate::gateways::JsonLinesDeadLetterSink;
use crate::lifecycle::{EntityStateRecord, Stage, StateName};

/// Writes a rider record without going through the workflow
pub struct SeedCommand {
    pub rider: String,
    pub state: String,
    pub location: Option<(f64, f64)>,
    pub config: RiderStateConfig,
}

impl SeedCommand {
    pub fn new(rider: String, state: String, config: RiderStateConfig) -> Self {
        Self {
            rider,
            state,
            location: None,
            config,
        }
    }

    pub fn with_location(mut self, location: Option<(f64, f64)>) -> Self {
        self.location = location;
        self
    }
}

impl Command for SeedCommand {
    async fn execute(&self) -> Result<ExitCode> {
        if self.rider.trim().is_empty() {
            return Err(anyhow!("--rider must not be empty"));
        }
        let state: StateName = self.state.parse()?;

        let mut record = EntityStateRecord::new(&self.rider, state);
        if let Some((latitude, longitude)) = self.location {
            record = record.with_location(latitude, longitude);
        }

        let store = RecordStore::open(&self.config.storage).await?;
        store.put(record.clone()).await?;
        store.close().await;
        print_json_line(&record)?;
        Ok(ExitCode::SUCCESS)
    }
}

/// Prints the stored record of one rider
pub struct ShowCommand {
    pub rider: String,
    pub config: RiderStateConfig,
}

impl ShowCommand {
    pub fn new(rider: String, config: RiderStateConfig) -> Self {
        Self { rider, config }
    }
}

impl Command for ShowCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let store = RecordStore::open(&self.config.storage).await?;
        let record = store.get(&self.rider).await;
        store.close().await;

        match record? {
            Some(record) => {
                print_json_line(&record)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("No record for rider '{}'", self.rider);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Lists envelopes from the dead-letter file
pub struct DeadLettersCommand {
    pub stage: Option<String>,
    pub config: RiderStateConfig,
}

impl DeadLettersCommand {
    pub fn new(stage: Option<String>, config: RiderStateConfig) -> Self {
        Self { stage, config }
    }

    fn stage_filter(&self) -> Result<Option<Stage>> {
        self.stage
            .as_deref()
            .map(|name| {
                serde_json::from_value(serde_json::Value::String(name.to_string()))
                    .with_context(|| format!("unknown stage '{name}'"))
            })
            .transpose()
    }
}

impl Command for DeadLettersCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let stage = self.stage_filter()?;
        let sink = JsonLinesDeadLetterSink::new(&self.config.storage.dead_letter_file);

        let envelopes = sink.read_all().await?;
        for envelope in envelopes
            .iter()
            .filter(|envelope| stage.map_or(true, |stage| envelope.stage == stage))
        {
            print_json_line(envelope)?;
        }
        Ok(ExitCode::SUCCESS)
    }
}
